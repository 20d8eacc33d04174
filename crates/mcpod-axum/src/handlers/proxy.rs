//! JSON-RPC proxy handler - relays one message to a server's pod.
//!
//! The exchange runs on its own task so frames keep flowing after the
//! handler has returned the streaming response. When the client goes away
//! the task sees its channel close and releases the pod promptly.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use tracing::debug;

use mcpod_core::RuntimeError;
use mcpod_runtime::JsonRpcEnvelope;
use mcpod_runtime::bridge::SESSION_HEADER;

use crate::channel::{AxumChannel, Commit, accepted, error_response};
use crate::error::HttpError;
use crate::state::AppState;

/// Proxy one JSON-RPC message to the pod of `id`.
///
/// Answers `404 not_found` without touching the pod when none is running.
/// Otherwise streams every frame the pod produces for this exchange as
/// newline-delimited JSON.
pub async fn proxy(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<JsonRpcEnvelope>, JsonRejection>,
) -> Result<Response, HttpError> {
    let Json(mut message) = payload?;

    if state.mcp.get_pod(&id).is_none() {
        return Err(RuntimeError::pod_not_found(&id).into());
    }

    if message.session().is_none() {
        message.mcp_session_id = headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
    }

    let (mut channel, mut pending) = AxumChannel::pair();
    let mcp = Arc::clone(&state.mcp);
    let exchange = tokio::spawn(async move {
        let result = mcp.proxy(&id, message, &mut channel).await;
        if let Err(e) = &result {
            debug!(server_id = %id, error = %e, "Proxy exchange ended with error");
        }
        (result, channel.into_uncommitted_head())
    });

    match (&mut pending.commit).await {
        Ok(Commit::Stream(head)) => Ok(pending.stream(head)),
        Ok(Commit::Error { status, body }) => Ok(error_response(status, body)),
        // The exchange finished without writing anything to the client
        Err(_) => match exchange.await {
            Ok((Ok(_), head)) => Ok(accepted(head)),
            Ok((Err(e), _)) => Err(e.into()),
            Err(e) => Err(HttpError::Internal(format!("proxy task failed: {e}"))),
        },
    }
}
