//! MCP service error types.

use thiserror::Error;

use super::{RepositoryError, RuntimeError};

/// Errors surfaced by the install/uninstall service.
///
/// Wraps repository and runtime errors and adds service-level failure modes
/// without leaking infrastructure details.
#[derive(Debug, Error)]
pub enum McpServiceError {
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Lifecycle, bridge or log operation failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Install request or catalog entry is not usable.
    #[error("Invalid MCP configuration: {0}")]
    InvalidConfig(String),

    /// An installation status transition was rejected.
    #[error("Invalid installation transition: {0}")]
    Installation(String),
}

impl McpServiceError {
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::Repository(RepositoryError::NotFound(_)) => true,
            Self::Runtime(err) => err.is_not_found(),
            _ => false,
        }
    }
}
