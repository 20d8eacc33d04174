//! Stream bridge: one JSON-RPC exchange between a client and a pod's stdio.
//!
//! # Exchange
//!
//! 1. Resolve the pod (`NotFound` without touching the channel).
//! 2. Write the response head announcing a streamed JSON payload.
//! 3. Under the pod's stdio lock, write the message as one newline-delimited
//!    frame. Requests get a pod-unique id from the pod's sequence counter so
//!    that responses to abandoned exchanges can never be mistaken for ours.
//! 4. Relay frames until the correlated response (requests), or until the pod
//!    closes stdout or goes quiet (notifications).
//! 5. On failure, answer with an `api_error` envelope if nothing has been
//!    flushed yet, otherwise abort the stream.
//!
//! There are no retries here; callers that want them wrap the bridge.

mod channel;
mod envelope;

use std::sync::Arc;
use std::time::Duration;

use mcpod_core::RuntimeError;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::registry::{PodHandle, PodRegistry};

pub use channel::{
    ChannelError, ClientChannel, CollectingChannel, ResponseHead, SESSION_HEADER,
    STREAM_CONTENT_TYPE,
};
pub use envelope::{
    JSONRPC_VERSION, JsonRpcEnvelope, JsonRpcError, JsonRpcResponse, error_envelope,
};

/// How a successful exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeEnd {
    /// The correlated response was relayed.
    Responded,
    /// A notification exchange saw no more frames within the idle window.
    Quiet,
    /// The pod closed stdout; it has been evicted.
    PodClosed,
}

enum ExchangeError {
    /// Writing to the client failed.
    Client,
    /// Pod I/O failed; `dead` when the pod can no longer be used.
    Pod { message: String, dead: bool },
}

impl ExchangeError {
    fn pod(message: impl Into<String>, dead: bool) -> Self {
        Self::Pod {
            message: message.into(),
            dead,
        }
    }
}

/// Relays JSON-RPC traffic between clients and registered pods.
pub struct StreamBridge {
    registry: Arc<dyn PodRegistry>,
    idle_timeout: Duration,
    notification_idle: Duration,
}

impl StreamBridge {
    pub fn new(
        registry: Arc<dyn PodRegistry>,
        idle_timeout: Duration,
        notification_idle: Duration,
    ) -> Self {
        Self {
            registry,
            idle_timeout,
            notification_idle,
        }
    }

    /// Proxy one message to the pod of `server_id` and stream its output.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no pod is registered; the channel is untouched
    /// - `ProtocolIo` on pod or client I/O failure; the channel has already
    ///   been answered or aborted
    pub async fn proxy<C>(
        &self,
        server_id: &str,
        message: JsonRpcEnvelope,
        channel: &mut C,
    ) -> Result<ExchangeEnd, RuntimeError>
    where
        C: ClientChannel + ?Sized,
    {
        let pod = self
            .registry
            .get(server_id)
            .ok_or_else(|| RuntimeError::pod_not_found(server_id))?;

        let session = message.session().map(str::to_string);
        if channel
            .write_head(ResponseHead::stream(session))
            .await
            .is_err()
        {
            return Err(RuntimeError::ProtocolIo("client disconnected".to_string()));
        }

        match self.exchange(&pod, &message, channel).await {
            Ok(ExchangeEnd::PodClosed) => {
                self.evict(&pod, "pod closed stdout");
                Ok(ExchangeEnd::PodClosed)
            }
            Ok(end) => Ok(end),
            Err(ExchangeError::Client) => {
                debug!(server_id = %server_id, "Client went away mid-exchange");
                channel.abort().await;
                Err(RuntimeError::ProtocolIo("client disconnected".to_string()))
            }
            Err(ExchangeError::Pod { message, dead }) => {
                warn!(server_id = %server_id, error = %message, "Proxy exchange failed");
                if dead {
                    self.evict(&pod, &message);
                }
                Self::fail(channel, &message).await;
                Err(RuntimeError::ProtocolIo(message))
            }
        }
    }

    async fn exchange<C>(
        &self,
        pod: &PodHandle,
        message: &JsonRpcEnvelope,
        channel: &mut C,
    ) -> Result<ExchangeEnd, ExchangeError>
    where
        C: ClientChannel + ?Sized,
    {
        let mut stdio = pod.lock_stdio().await;

        let pod_id = (!message.is_notification()).then(|| pod.next_sequence());
        let frame = message
            .to_pod_frame(pod_id)
            .map_err(|e| ExchangeError::pod(format!("failed to encode message: {e}"), false))?;

        debug!(
            server_id = %pod.server_id(),
            pod_id = ?pod_id,
            method = message.method.as_deref().unwrap_or(""),
            "Writing frame to pod"
        );

        let written = async {
            stdio.writer.write_all(&frame).await?;
            stdio.writer.flush().await
        };
        written
            .await
            .map_err(|e| ExchangeError::pod(format!("failed to write to pod: {e}"), true))?;

        let idle = if pod_id.is_some() {
            self.idle_timeout
        } else {
            self.notification_idle
        };
        let mut line: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line.clear();
            let read = tokio::select! {
                biased;
                () = channel.closed() => return Err(ExchangeError::Client),
                read = tokio::time::timeout(idle, stdio.reader.read_until(b'\n', &mut line)) => read,
            };

            match read {
                Err(_elapsed) if pod_id.is_none() => return Ok(ExchangeEnd::Quiet),
                Err(_elapsed) => {
                    return Err(ExchangeError::pod(
                        format!("no response from pod within {idle:?}"),
                        false,
                    ));
                }
                Ok(Err(e)) => {
                    return Err(ExchangeError::pod(
                        format!("failed to read from pod: {e}"),
                        true,
                    ));
                }
                Ok(Ok(0)) if pod_id.is_none() => return Ok(ExchangeEnd::PodClosed),
                Ok(Ok(0)) => {
                    return Err(ExchangeError::pod(
                        "pod closed its output before responding",
                        true,
                    ));
                }
                Ok(Ok(_)) => {}
            }

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(mut value) = serde_json::from_slice::<Value>(trimmed) else {
                debug!(
                    server_id = %pod.server_id(),
                    line = %String::from_utf8_lossy(trimmed),
                    "Skipping non-JSON output"
                );
                continue;
            };

            // Requests and notifications initiated by the pod pass through.
            if value.get("method").is_some() {
                channel
                    .write_frame(trimmed)
                    .await
                    .map_err(|_| ExchangeError::Client)?;
                continue;
            }

            let correlated = pod_id.is_some_and(|id| {
                value
                    .get("id")
                    .and_then(Value::as_u64)
                    .is_some_and(|got| got == id)
            });
            if !correlated {
                debug!(
                    server_id = %pod.server_id(),
                    id = ?value.get("id"),
                    "Dropping response of an abandoned exchange"
                );
                continue;
            }

            value["id"] = message.id.clone().unwrap_or(Value::Null);
            let restored = serde_json::to_vec(&value)
                .map_err(|e| ExchangeError::pod(format!("failed to encode response: {e}"), false))?;
            channel
                .write_frame(&restored)
                .await
                .map_err(|_| ExchangeError::Client)?;
            pod.mark_healthy();
            return Ok(ExchangeEnd::Responded);
        }
    }

    fn evict(&self, pod: &Arc<PodHandle>, reason: &str) {
        if self.registry.evict(pod) {
            warn!(
                server_id = %pod.server_id(),
                pod_name = %pod.pod_name(),
                reason = %reason,
                "Evicted dead pod"
            );
        }
    }

    async fn fail<C>(channel: &mut C, message: &str)
    where
        C: ClientChannel + ?Sized,
    {
        if channel.has_flushed() {
            channel.abort().await;
            return;
        }
        if channel
            .write_error(500, error_envelope(message, "api_error"))
            .await
            .is_err()
        {
            channel.abort().await;
        }
    }
}
