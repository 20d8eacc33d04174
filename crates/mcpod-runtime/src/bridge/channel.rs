//! Client-facing side of a proxied exchange.
//!
//! A [`ClientChannel`] is a half-open response: the head is written once,
//! then any number of frames. Until the first frame is flushed the channel
//! can still be turned into an error response; afterwards it can only be
//! aborted.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Content type announced for proxied streams: one JSON document per line.
pub const STREAM_CONTENT_TYPE: &str = "application/x-ndjson";

/// Response header name carrying the MCP session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Headers of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub content_type: &'static str,
    pub session_id: Option<String>,
}

impl ResponseHead {
    pub const fn stream(session_id: Option<String>) -> Self {
        Self {
            content_type: STREAM_CONTENT_TYPE,
            session_id,
        }
    }
}

/// The client went away or the channel was used out of order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("client disconnected")]
    Closed,

    #[error("response already started; cannot send an error body")]
    AlreadyFlushed,
}

/// Duplex response channel to one HTTP client.
#[async_trait]
pub trait ClientChannel: Send + Sync {
    /// Announce a streamed JSON payload. Called at most once.
    async fn write_head(&mut self, head: ResponseHead) -> Result<(), ChannelError>;

    /// Send one complete frame (a newline is appended by the channel).
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError>;

    /// Replace the response with an error status and JSON body.
    ///
    /// # Errors
    ///
    /// - `AlreadyFlushed` once a frame has been written
    async fn write_error(&mut self, status: u16, body: Value) -> Result<(), ChannelError>;

    /// Terminate the stream without further framing.
    async fn abort(&mut self);

    /// Whether any frame reached the client.
    fn has_flushed(&self) -> bool;

    /// Resolves once the client has gone away.
    async fn closed(&self) {
        std::future::pending::<()>().await;
    }
}

/// A channel that keeps everything in memory.
///
/// Used by tool discovery, which proxies through the bridge without an HTTP
/// client, and by tests.
#[derive(Debug, Default)]
pub struct CollectingChannel {
    pub head: Option<ResponseHead>,
    pub frames: Vec<Value>,
    pub error: Option<(u16, Value)>,
    pub aborted: bool,
}

impl CollectingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The frame carrying `id`, if the pod answered it.
    pub fn response_for(&self, id: &Value) -> Option<&Value> {
        self.frames
            .iter()
            .find(|frame| frame.get("id") == Some(id) && frame.get("method").is_none())
    }
}

#[async_trait]
impl ClientChannel for CollectingChannel {
    async fn write_head(&mut self, head: ResponseHead) -> Result<(), ChannelError> {
        self.head = Some(head);
        Ok(())
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        // Frames from the bridge are always valid JSON.
        let value = serde_json::from_slice(frame).unwrap_or(Value::Null);
        self.frames.push(value);
        Ok(())
    }

    async fn write_error(&mut self, status: u16, body: Value) -> Result<(), ChannelError> {
        if self.has_flushed() {
            return Err(ChannelError::AlreadyFlushed);
        }
        self.error = Some((status, body));
        Ok(())
    }

    async fn abort(&mut self) {
        self.aborted = true;
    }

    fn has_flushed(&self) -> bool {
        !self.frames.is_empty()
    }
}
