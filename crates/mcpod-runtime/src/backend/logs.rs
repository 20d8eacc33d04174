//! Ring buffer of workload output.
//!
//! MCP servers and the tooling around them can emit non-UTF8 bytes on stderr.
//! `BufReader::lines()` would end the reader task on the first invalid byte,
//! so lines are read as bytes and decoded lossily.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Maximum number of log lines kept per workload
pub const MAX_LOG_LINES: usize = 5000;

/// Recent output lines of one workload, oldest first.
#[derive(Debug, Default)]
pub struct LogBuffer {
    lines: Mutex<VecDeque<String>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(256)),
        }
    }

    /// Add a line, dropping the oldest at capacity
    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() >= MAX_LOG_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// The last `count` lines joined with newlines.
    pub fn tail(&self, count: usize) -> String {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = lines.len().saturating_sub(count);
        lines
            .iter()
            .skip(skip)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Copy `stream` line by line into `buffer` until EOF.
pub fn spawn_log_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    pod_name: String,
    buffer: Arc<LogBuffer>,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    buffer.push(String::from_utf8_lossy(&buf).into_owned());
                }
                Err(e) => {
                    debug!(pod_name = %pod_name, error = %e, "log reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(pod_name = %pod_name, "log reader task exiting");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_tail_returns_last_lines_in_order() {
        let buffer = LogBuffer::new();
        for i in 0..5 {
            buffer.push(format!("line {i}"));
        }

        assert_eq!(buffer.tail(2), "line 3\nline 4");
        assert_eq!(buffer.tail(100).lines().count(), 5);
        assert_eq!(buffer.tail(0), "");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let buffer = LogBuffer::new();
        for i in 0..=MAX_LOG_LINES {
            buffer.push(i.to_string());
        }

        assert_eq!(buffer.len(), MAX_LOG_LINES);
        assert_eq!(buffer.tail(MAX_LOG_LINES).lines().next(), Some("1"));
    }

    #[tokio::test]
    async fn test_reader_decodes_invalid_utf8_lossily() {
        let buffer = Arc::new(LogBuffer::new());
        let (mut tx, rx) = tokio::io::duplex(256);
        spawn_log_reader(rx, "pod".into(), Arc::clone(&buffer));

        tx.write_all(b"ok\r\nbad \xff byte\nlast").await.unwrap();
        drop(tx);

        for _ in 0..50 {
            if buffer.len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(buffer.tail(3), "ok\nbad \u{fffd} byte\nlast");
    }
}
