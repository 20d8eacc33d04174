//! JSON-RPC 2.0 message shapes carried by the bridge.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Protocol version string of every frame written to a pod.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC-shaped message as received from a client.
///
/// `session_id` / `mcp_session_id` are transport-level and are never written
/// to the pod. Unknown fields are passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonRpcEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,

    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(default, skip_serializing)]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing)]
    pub mcp_session_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JsonRpcEnvelope {
    /// A request expecting a correlated response.
    pub fn request(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id.into()),
            method: Some(method.into()),
            params,
            ..Self::default()
        }
    }

    /// A notification; the pod sends no response.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            method: Some(method.into()),
            params,
            ..Self::default()
        }
    }

    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Session id supplied by the client, preferring the MCP-specific field.
    pub fn session(&self) -> Option<&str> {
        self.mcp_session_id
            .as_deref()
            .or(self.session_id.as_deref())
    }

    /// The frame written to the pod: `id` replaced by the pod-unique
    /// sequence number, version defaulted, transport fields dropped.
    pub fn to_pod_frame(&self, pod_id: Option<u64>) -> serde_json::Result<Vec<u8>> {
        let outbound = Self {
            jsonrpc: Some(
                self.jsonrpc
                    .clone()
                    .unwrap_or_else(|| JSONRPC_VERSION.to_string()),
            ),
            id: pod_id.map(Value::from),
            session_id: None,
            mcp_session_id: None,
            ..self.clone()
        };
        let mut frame = serde_json::to_vec(&outbound)?;
        frame.push(b'\n');
        Ok(frame)
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// The gateway's error body: `{"error": {"message": ..., "type": ...}}`.
pub fn error_envelope(message: impl Into<String>, kind: &str) -> Value {
    json!({
        "error": {
            "message": message.into(),
            "type": kind,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_fields_parse_with_passthrough() {
        let envelope: JsonRpcEnvelope = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "method": "tools/call",
            "params": {"name": "ping"},
            "mcpSessionId": "sess-1",
            "_meta": {"progressToken": 7}
        }))
        .unwrap();

        assert_eq!(envelope.id, Some(json!("abc")));
        assert_eq!(envelope.session(), Some("sess-1"));
        assert_eq!(envelope.extra["_meta"]["progressToken"], 7);
    }

    #[test]
    fn test_pod_frame_rewrites_id_and_drops_transport_fields() {
        let envelope: JsonRpcEnvelope = serde_json::from_value(json!({
            "id": "abc",
            "method": "tools/list",
            "sessionId": "s",
            "mcpSessionId": "m",
            "_meta": {"k": 1}
        }))
        .unwrap();

        let frame = envelope.to_pod_frame(Some(42)).unwrap();
        assert_eq!(frame.last(), Some(&b'\n'));

        let written: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(
            written,
            json!({"jsonrpc": "2.0", "id": 42, "method": "tools/list", "_meta": {"k": 1}})
        );
    }

    #[test]
    fn test_notification_frame_has_no_id() {
        let frame = JsonRpcEnvelope::notification("notifications/initialized", None)
            .to_pod_frame(None)
            .unwrap();
        let written: Value = serde_json::from_slice(&frame).unwrap();
        assert!(written.get("id").is_none());
    }

    #[test]
    fn test_error_envelope_shape() {
        assert_eq!(
            error_envelope("pod not found", "not_found"),
            json!({"error": {"message": "pod not found", "type": "not_found"}})
        );
    }
}
