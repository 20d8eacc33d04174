//! [`ClientChannel`] over an axum streaming response.
//!
//! The bridge runs on its own task while the handler waits for the response
//! to be committed. Nothing reaches the client until the first frame or an
//! error envelope, so a failure before any output still becomes a proper
//! error status.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use mcpod_runtime::bridge::SESSION_HEADER;
use mcpod_runtime::{ChannelError, ClientChannel, ResponseHead};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

/// Frames buffered between the bridge and a slow client.
const FRAME_BUFFER: usize = 32;

/// How long an abort waits for buffer space to fail the body stream.
const ABORT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

type Frame = Result<Bytes, io::Error>;

/// How the exchange decided to answer.
#[derive(Debug)]
pub enum Commit {
    /// Stream frames under this head.
    Stream(ResponseHead),
    /// Answer with a status and JSON body instead.
    Error { status: u16, body: Value },
}

/// Bridge side of a proxied HTTP exchange.
pub struct AxumChannel {
    head: Option<ResponseHead>,
    commit: Option<oneshot::Sender<Commit>>,
    frames: mpsc::Sender<Frame>,
    flushed: bool,
}

/// Handler side of a proxied HTTP exchange.
pub struct PendingResponse {
    pub commit: oneshot::Receiver<Commit>,
    frames: mpsc::Receiver<Frame>,
}

impl AxumChannel {
    pub fn pair() -> (Self, PendingResponse) {
        let (commit_tx, commit_rx) = oneshot::channel();
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
        (
            Self {
                head: None,
                commit: Some(commit_tx),
                frames: frames_tx,
                flushed: false,
            },
            PendingResponse {
                commit: commit_rx,
                frames: frames_rx,
            },
        )
    }

    /// Drop the channel, keeping the head if the response was never
    /// committed.
    pub fn into_uncommitted_head(self) -> Option<ResponseHead> {
        if self.commit.is_some() { self.head } else { None }
    }
}

#[async_trait]
impl ClientChannel for AxumChannel {
    async fn write_head(&mut self, head: ResponseHead) -> Result<(), ChannelError> {
        if self.frames.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.head = Some(head);
        Ok(())
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        if let Some(commit) = self.commit.take() {
            let head = self
                .head
                .take()
                .unwrap_or_else(|| ResponseHead::stream(None));
            commit
                .send(Commit::Stream(head))
                .map_err(|_| ChannelError::Closed)?;
        }

        let mut line = Vec::with_capacity(frame.len() + 1);
        line.extend_from_slice(frame);
        line.push(b'\n');
        self.frames
            .send(Ok(Bytes::from(line)))
            .await
            .map_err(|_| ChannelError::Closed)?;
        self.flushed = true;
        Ok(())
    }

    async fn write_error(&mut self, status: u16, body: Value) -> Result<(), ChannelError> {
        let commit = self.commit.take().ok_or(ChannelError::AlreadyFlushed)?;
        commit
            .send(Commit::Error { status, body })
            .map_err(|_| ChannelError::Closed)
    }

    async fn abort(&mut self) {
        if self.commit.take().is_some() {
            return;
        }
        // Fails the body stream so the connection is cut mid-response
        let failure = Err(io::Error::other("proxied exchange aborted"));
        match tokio::time::timeout(ABORT_SEND_TIMEOUT, self.frames.send(failure)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::debug!("Client gone before abort"),
            Err(_) => tracing::warn!("Client stopped reading; aborted stream ends without error"),
        }
    }

    fn has_flushed(&self) -> bool {
        self.flushed
    }

    async fn closed(&self) {
        self.frames.closed().await;
    }
}

impl PendingResponse {
    /// A `200` streaming every frame the bridge writes.
    pub fn stream(self, head: ResponseHead) -> Response {
        let mut response = Body::from_stream(ReceiverStream::new(self.frames)).into_response();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(head.content_type));
        insert_session(&mut response, head.session_id.as_deref());
        response
    }
}

/// `202 Accepted` for exchanges that ended without output.
pub fn accepted(head: Option<ResponseHead>) -> Response {
    let mut response = StatusCode::ACCEPTED.into_response();
    insert_session(
        &mut response,
        head.as_ref().and_then(|h| h.session_id.as_deref()),
    );
    response
}

/// Error status and envelope written by the bridge.
pub fn error_response(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(body)).into_response()
}

fn insert_session(response: &mut Response, session_id: Option<&str>) {
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_error_before_first_frame_commits_error() {
        let (mut channel, pending) = AxumChannel::pair();

        channel
            .write_head(ResponseHead::stream(Some("sess".into())))
            .await
            .unwrap();
        channel
            .write_error(500, json!({"error": {"type": "api_error"}}))
            .await
            .unwrap();

        match pending.commit.await.unwrap() {
            Commit::Error { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body["error"]["type"], "api_error");
            }
            Commit::Stream(_) => panic!("expected an error commit"),
        }
    }

    #[tokio::test]
    async fn test_first_frame_commits_stream() {
        let (mut channel, mut pending) = AxumChannel::pair();
        channel
            .write_head(ResponseHead::stream(Some("sess".into())))
            .await
            .unwrap();

        channel.write_frame(br#"{"id":1}"#).await.unwrap();
        assert!(channel.has_flushed());
        assert_eq!(
            channel.write_error(500, json!({})).await,
            Err(ChannelError::AlreadyFlushed)
        );

        let head = match (&mut pending.commit).await.unwrap() {
            Commit::Stream(head) => head,
            Commit::Error { .. } => panic!("expected a stream commit"),
        };
        assert_eq!(head.session_id.as_deref(), Some("sess"));

        drop(channel);
        let mut frames = ReceiverStream::new(pending.frames);
        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"{\"id\":1}\n");
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_abort_with_full_buffer_fails_body() {
        let (mut channel, mut pending) = AxumChannel::pair();
        for n in 0..FRAME_BUFFER {
            channel
                .write_frame(format!("{{\"n\":{n}}}").as_bytes())
                .await
                .unwrap();
        }
        assert!(matches!(
            (&mut pending.commit).await.unwrap(),
            Commit::Stream(_)
        ));

        let abort = tokio::spawn(async move { channel.abort().await });
        let items: Vec<Frame> = ReceiverStream::new(pending.frames).collect().await;
        abort.await.unwrap();

        assert_eq!(items.len(), FRAME_BUFFER + 1);
        assert!(items[..FRAME_BUFFER].iter().all(Result::is_ok));
        assert!(items[FRAME_BUFFER].is_err());
    }

    #[tokio::test]
    async fn test_abort_before_commit_drops_commit() {
        let (mut channel, pending) = AxumChannel::pair();

        channel.abort().await;

        assert!(pending.commit.await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_handler_closes_channel() {
        let (mut channel, pending) = AxumChannel::pair();
        drop(pending);

        channel.closed().await;
        assert_eq!(
            channel.write_frame(b"{}").await,
            Err(ChannelError::Closed)
        );
    }

    #[tokio::test]
    async fn test_uncommitted_head_is_returned() {
        let (mut channel, _pending) = AxumChannel::pair();
        channel
            .write_head(ResponseHead::stream(Some("sess".into())))
            .await
            .unwrap();

        let head = channel.into_uncommitted_head().unwrap();
        assert_eq!(head.session_id.as_deref(), Some("sess"));
    }
}
