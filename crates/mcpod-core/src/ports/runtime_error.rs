//! Errors raised by the pod runtime.

use thiserror::Error;

use super::RepositoryError;

/// Failures of the lifecycle controller, stream bridge and log retriever.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The workload could not be scheduled or never became addressable.
    /// Fatal to an install; the caller rolls back.
    #[error("Failed to provision pod: {0}")]
    Provision(String),

    /// No server, pod or container for the given id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Reading from or writing to a pod's stdio failed.
    #[error("Pod I/O error: {0}")]
    ProtocolIo(String),

    /// The workload backend failed outside of provisioning (logs, teardown).
    #[error("Workload backend error: {0}")]
    Backend(String),

    /// A pod is already registered for the server.
    #[error("Pod already running for server {0}")]
    AlreadyRunning(String),

    /// The server or its catalog entry cannot be run locally.
    #[error("Invalid workload configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RuntimeError {
    /// `NotFound` for a server id with no registered pod.
    pub fn pod_not_found(server_id: &str) -> Self {
        Self::NotFound(format!("pod not found or not running for server {server_id}"))
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Repository(RepositoryError::NotFound(_))
        )
    }
}
