//! Installed MCP server records and their installation lifecycle.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an MCP server runs.
///
/// Only `Local` servers are provisioned as pods by this runtime. `Remote`
/// servers are reached over HTTP by an external collaborator and are merely
/// recorded here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpServerType {
    /// Runs as a pod managed by the lifecycle controller
    #[default]
    Local,
    /// Reached directly over the network, not managed here
    Remote,
}

impl McpServerType {
    /// Stable lowercase name used in storage and events.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for McpServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for McpServerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown server type: {other}")),
        }
    }
}

/// Progress of bringing a local server's pod and tool set online.
///
/// ```text
/// idle ──► pending ──► success
///             ▲   └──► error
///             └──── success | error   (re-install / restart cycle)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalInstallationStatus {
    /// Never attempted, or not a local server
    #[default]
    Idle,
    /// Pod start or tool discovery in flight
    Pending,
    /// Pod running and tools discovered
    Success,
    /// Pod start or tool discovery failed
    Error,
}

impl LocalInstallationStatus {
    /// Stable lowercase name used in storage and on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Every path into a terminal state passes through `pending`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Success | Self::Error, Self::Pending)
                | (Self::Pending, Self::Success | Self::Error)
        )
    }

    /// `success` and `error` end an attempt; clients stop polling on them.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for LocalInstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocalInstallationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown installation status: {other}")),
        }
    }
}

/// An installed MCP server instance.
///
/// `local_installation_status` is only meaningful when `server_type` is
/// [`McpServerType::Local`]; remote servers stay `idle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    /// Opaque identifier (UUID v4 text).
    pub id: String,

    /// Human-readable name, also the prefix of derived tool names.
    pub name: String,

    /// Catalog definition this server was installed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,

    /// Secret holding credentials created for this server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<String>,

    /// Local (pod) or remote.
    pub server_type: McpServerType,

    /// Non-secret configuration supplied at install time, passed to the
    /// workload as environment variables.
    #[serde(default)]
    pub user_config: BTreeMap<String, String>,

    /// Installation progress of the local pod.
    pub local_installation_status: LocalInstallationStatus,

    /// Diagnostic message for the last failed installation attempt.
    pub local_installation_error: Option<String>,

    /// When the server was installed.
    pub created_at: DateTime<Utc>,

    /// Last time the record changed (including status transitions).
    pub updated_at: DateTime<Utc>,
}

impl McpServer {
    pub const fn is_local(&self) -> bool {
        matches!(self.server_type, McpServerType::Local)
    }
}

/// An MCP server to be inserted (no ID yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMcpServer {
    pub name: String,
    pub catalog_id: Option<String>,
    pub secret_id: Option<String>,
    pub server_type: McpServerType,
    #[serde(default)]
    pub user_config: BTreeMap<String, String>,
}

impl NewMcpServer {
    /// Create a new local server installed from a catalog entry.
    #[must_use]
    pub fn local(name: impl Into<String>, catalog_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            catalog_id: Some(catalog_id.into()),
            secret_id: None,
            server_type: McpServerType::Local,
            user_config: BTreeMap::new(),
        }
    }

    /// Create a new remote server record.
    #[must_use]
    pub fn remote(name: impl Into<String>, catalog_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            catalog_id,
            secret_id: None,
            server_type: McpServerType::Remote,
            user_config: BTreeMap::new(),
        }
    }

    /// Attach the secret created for this install.
    #[must_use]
    pub fn with_secret(mut self, secret_id: impl Into<String>) -> Self {
        self.secret_id = Some(secret_id.into());
        self
    }

    /// Add one non-secret configuration value.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_config.insert(key.into(), value.into());
        self
    }

    /// Materialize into a stored record with a fresh id and `idle` status.
    #[must_use]
    pub fn into_server(self, now: DateTime<Utc>) -> McpServer {
        McpServer {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name,
            catalog_id: self.catalog_id,
            secret_id: self.secret_id,
            server_type: self.server_type,
            user_config: self.user_config,
            local_installation_status: LocalInstallationStatus::Idle,
            local_installation_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Recent output of a pod's primary container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodLogs {
    /// Newline-joined log lines, oldest first.
    pub logs: String,
    /// Name of the container the lines came from.
    pub container_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_must_pass_through_pending() {
        use LocalInstallationStatus::{Error, Idle, Pending, Success};

        assert!(Idle.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Success));
        assert!(Pending.can_transition_to(Error));
        assert!(Success.can_transition_to(Pending));
        assert!(Error.can_transition_to(Pending));

        assert!(!Idle.can_transition_to(Success));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Success.can_transition_to(Error));
        assert!(!Error.can_transition_to(Success));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Idle));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            LocalInstallationStatus::Idle,
            LocalInstallationStatus::Pending,
            LocalInstallationStatus::Success,
            LocalInstallationStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<LocalInstallationStatus>(), Ok(status));
        }
        assert!("running".parse::<LocalInstallationStatus>().is_err());
    }

    #[test]
    fn test_server_serializes_camel_case() {
        let server = NewMcpServer::local("X", "echo-mcp").into_server(Utc::now());
        let json = serde_json::to_value(&server).unwrap();

        assert_eq!(json["serverType"], "local");
        assert_eq!(json["localInstallationStatus"], "idle");
        assert!(json["localInstallationError"].is_null());
        assert_eq!(json["catalogId"], "echo-mcp");
        assert!(json.get("secretId").is_none());
    }

    #[test]
    fn test_new_server_builder() {
        let server = NewMcpServer::local("github", "gh")
            .with_secret("sec-1")
            .with_config("GITHUB_ORG", "acme")
            .into_server(Utc::now());

        assert!(server.is_local());
        assert_eq!(server.secret_id.as_deref(), Some("sec-1"));
        assert_eq!(server.user_config.get("GITHUB_ORG").map(String::as_str), Some("acme"));
        assert_eq!(server.local_installation_status, LocalInstallationStatus::Idle);
        assert!(!server.id.is_empty());
    }
}
