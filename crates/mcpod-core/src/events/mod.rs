//! Canonical event union for all adapters.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "mcp_installation_changed", "serverId": "…", "status": "pending", "error": null }
//! ```

mod mcp;

use serde::{Deserialize, Serialize};

use crate::domain::LocalInstallationStatus;

pub use mcp::McpServerSummary;

/// Canonical event types for all adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    // ========== Server Records ==========
    /// A server record was created by an install request.
    McpServerInstalled {
        /// Summary of the installed server.
        server: McpServerSummary,
    },

    /// A server record was deleted (uninstall or rollback).
    McpServerRemoved {
        #[serde(rename = "serverId")]
        server_id: String,
    },

    // ========== Installation ==========
    /// The installation state machine moved a server to a new status.
    McpInstallationChanged {
        #[serde(rename = "serverId")]
        server_id: String,
        status: LocalInstallationStatus,
        /// Diagnostic message when `status` is `error`.
        error: Option<String>,
    },

    /// Tool discovery persisted the tools of a server.
    McpToolsDiscovered {
        #[serde(rename = "serverId")]
        server_id: String,
        #[serde(rename = "toolCount")]
        tool_count: usize,
    },

    // ========== Pods ==========
    /// A pod became addressable and was registered.
    McpPodStarted {
        #[serde(rename = "serverId")]
        server_id: String,
        #[serde(rename = "podName")]
        pod_name: String,
    },

    /// A pod was torn down or detected dead.
    McpPodStopped {
        #[serde(rename = "serverId")]
        server_id: String,
        reason: String,
    },
}

impl AppEvent {
    /// Stable event name, matching the serialized `type` tag.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::McpServerInstalled { .. } => "mcp_server_installed",
            Self::McpServerRemoved { .. } => "mcp_server_removed",
            Self::McpInstallationChanged { .. } => "mcp_installation_changed",
            Self::McpToolsDiscovered { .. } => "mcp_tools_discovered",
            Self::McpPodStarted { .. } => "mcp_pod_started",
            Self::McpPodStopped { .. } => "mcp_pod_stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_matches_tag() {
        let events = [
            AppEvent::mcp_server_installed(McpServerSummary::new("s1", "X", "local")),
            AppEvent::mcp_server_removed("s1"),
            AppEvent::mcp_installation_changed("s1", LocalInstallationStatus::Pending, None),
            AppEvent::mcp_tools_discovered("s1", 2),
            AppEvent::mcp_pod_started("s1", "x-s1"),
            AppEvent::mcp_pod_stopped("s1", "deleted"),
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_name());
        }
    }

    #[test]
    fn test_installation_changed_wire_format() {
        let event = AppEvent::mcp_installation_changed(
            "s1",
            LocalInstallationStatus::Error,
            Some("boom".to_string()),
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["serverId"], "s1");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
    }
}
