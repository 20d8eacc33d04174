//! Installation state machine.
//!
//! Every status change of a local server goes through [`InstallationTracker`],
//! which checks the transition, persists it and emits an event. The allowed
//! transitions live on [`LocalInstallationStatus::can_transition_to`].

use std::sync::Arc;

use mcpod_core::{
    AppEvent, AppEventEmitter, LocalInstallationStatus, McpServer, McpServerRepository,
    McpServiceError, RepositoryError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Pollable installation state of one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    pub local_installation_status: LocalInstallationStatus,
    pub local_installation_error: Option<String>,
}

impl From<&McpServer> for InstallationStatus {
    fn from(server: &McpServer) -> Self {
        Self {
            local_installation_status: server.local_installation_status,
            local_installation_error: server.local_installation_error.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InstallationError {
    #[error("server {server_id} is not local; installation status is not tracked")]
    NotLocal { server_id: String },

    #[error("server {server_id} cannot move from {from} to {to}")]
    InvalidTransition {
        server_id: String,
        from: LocalInstallationStatus,
        to: LocalInstallationStatus,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<InstallationError> for McpServiceError {
    fn from(err: InstallationError) -> Self {
        match err {
            InstallationError::Repository(e) => Self::Repository(e),
            other => Self::Installation(other.to_string()),
        }
    }
}

/// Persists installation transitions of local servers.
#[derive(Clone)]
pub struct InstallationTracker {
    servers: Arc<dyn McpServerRepository>,
    emitter: Arc<dyn AppEventEmitter>,
}

impl InstallationTracker {
    pub fn new(servers: Arc<dyn McpServerRepository>, emitter: Arc<dyn AppEventEmitter>) -> Self {
        Self { servers, emitter }
    }

    /// Start an attempt: `idle | success | error → pending`.
    pub async fn begin(&self, server_id: &str) -> Result<(), InstallationError> {
        self.transition(server_id, LocalInstallationStatus::Pending, None)
            .await
    }

    /// `pending → success`, clearing any previous error.
    pub async fn succeed(&self, server_id: &str) -> Result<(), InstallationError> {
        self.transition(server_id, LocalInstallationStatus::Success, None)
            .await
    }

    /// `pending → error` with a diagnostic message.
    pub async fn fail(&self, server_id: &str, message: &str) -> Result<(), InstallationError> {
        self.transition(server_id, LocalInstallationStatus::Error, Some(message))
            .await
    }

    pub async fn status(&self, server_id: &str) -> Result<InstallationStatus, InstallationError> {
        let server = self.servers.get(server_id).await?;
        Ok(InstallationStatus::from(&server))
    }

    async fn transition(
        &self,
        server_id: &str,
        to: LocalInstallationStatus,
        error: Option<&str>,
    ) -> Result<(), InstallationError> {
        let server = self.servers.get(server_id).await?;

        if !server.is_local() {
            warn!(server_id = %server_id, to = %to, "Rejected installation transition for non-local server");
            return Err(InstallationError::NotLocal {
                server_id: server_id.to_string(),
            });
        }

        let from = server.local_installation_status;
        if !from.can_transition_to(to) {
            warn!(
                server_id = %server_id,
                from = %from,
                to = %to,
                "Rejected installation transition"
            );
            return Err(InstallationError::InvalidTransition {
                server_id: server_id.to_string(),
                from,
                to,
            });
        }

        self.servers
            .set_installation_status(server_id, to, error)
            .await?;

        info!(
            server_id = %server_id,
            from = %from,
            to = %to,
            error = ?error,
            "Installation status changed"
        );
        self.emitter.emit(AppEvent::mcp_installation_changed(
            server_id,
            to,
            error.map(str::to_string),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpod_core::{NewMcpServer, NoopEmitter};
    use mcpod_runtime::testing::MemoryServerRepository;

    fn tracker() -> (InstallationTracker, Arc<MemoryServerRepository>) {
        let servers = Arc::new(MemoryServerRepository::default());
        let tracker = InstallationTracker::new(
            Arc::clone(&servers) as Arc<dyn McpServerRepository>,
            Arc::new(NoopEmitter::new()),
        );
        (tracker, servers)
    }

    #[tokio::test]
    async fn test_full_attempt_and_reentry() {
        let (tracker, servers) = tracker();
        let server = servers
            .insert(NewMcpServer::local("x", "cat-x"))
            .await
            .unwrap();

        tracker.begin(&server.id).await.unwrap();
        tracker.fail(&server.id, "boom").await.unwrap();
        let status = tracker.status(&server.id).await.unwrap();
        assert_eq!(status.local_installation_status, LocalInstallationStatus::Error);
        assert_eq!(status.local_installation_error.as_deref(), Some("boom"));

        tracker.begin(&server.id).await.unwrap();
        tracker.succeed(&server.id).await.unwrap();
        let status = tracker.status(&server.id).await.unwrap();
        assert_eq!(status.local_installation_status, LocalInstallationStatus::Success);
        assert!(status.local_installation_error.is_none());
    }

    #[tokio::test]
    async fn test_rejects_skipping_pending() {
        let (tracker, servers) = tracker();
        let server = servers
            .insert(NewMcpServer::local("x", "cat-x"))
            .await
            .unwrap();

        let err = tracker.succeed(&server.id).await.unwrap_err();
        assert!(matches!(err, InstallationError::InvalidTransition { .. }));

        tracker.begin(&server.id).await.unwrap();
        let err = tracker.begin(&server.id).await.unwrap_err();
        assert!(matches!(err, InstallationError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_remote_servers_stay_idle() {
        let (tracker, servers) = tracker();
        let server = servers
            .insert(NewMcpServer::remote("r", None))
            .await
            .unwrap();

        let err = tracker.begin(&server.id).await.unwrap_err();
        assert!(matches!(err, InstallationError::NotLocal { .. }));
        assert_eq!(
            servers.get(&server.id).await.unwrap().local_installation_status,
            LocalInstallationStatus::Idle
        );
    }

    #[test]
    fn test_status_serializes_two_fields() {
        let status = InstallationStatus {
            local_installation_status: LocalInstallationStatus::Error,
            local_installation_error: Some("boom".into()),
        };
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            serde_json::json!({"localInstallationStatus": "error", "localInstallationError": "boom"})
        );
    }
}
