//! MCP server lifecycle events.

use serde::{Deserialize, Serialize};

use super::AppEvent;
use crate::domain::{LocalInstallationStatus, McpServer};

/// Summary of an MCP server for event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerSummary {
    pub id: String,
    pub name: String,
    /// `local` or `remote`.
    pub server_type: String,
}

impl McpServerSummary {
    /// Create a new MCP server summary.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        server_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            server_type: server_type.into(),
        }
    }
}

impl From<&McpServer> for McpServerSummary {
    fn from(server: &McpServer) -> Self {
        Self::new(&server.id, &server.name, server.server_type.as_str())
    }
}

impl AppEvent {
    /// Create a server installed event.
    pub const fn mcp_server_installed(server: McpServerSummary) -> Self {
        Self::McpServerInstalled { server }
    }

    /// Create a server removed event.
    pub fn mcp_server_removed(server_id: impl Into<String>) -> Self {
        Self::McpServerRemoved {
            server_id: server_id.into(),
        }
    }

    /// Create an installation status change event.
    pub fn mcp_installation_changed(
        server_id: impl Into<String>,
        status: LocalInstallationStatus,
        error: Option<String>,
    ) -> Self {
        Self::McpInstallationChanged {
            server_id: server_id.into(),
            status,
            error,
        }
    }

    /// Create a tools discovered event.
    pub fn mcp_tools_discovered(server_id: impl Into<String>, tool_count: usize) -> Self {
        Self::McpToolsDiscovered {
            server_id: server_id.into(),
            tool_count,
        }
    }

    /// Create a pod started event.
    pub fn mcp_pod_started(server_id: impl Into<String>, pod_name: impl Into<String>) -> Self {
        Self::McpPodStarted {
            server_id: server_id.into(),
            pod_name: pod_name.into(),
        }
    }

    /// Create a pod stopped event.
    pub fn mcp_pod_stopped(server_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::McpPodStopped {
            server_id: server_id.into(),
            reason: reason.into(),
        }
    }
}
