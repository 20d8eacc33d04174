//! MCP server record store.

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::{LocalInstallationStatus, McpServer, NewMcpServer};

/// Repository trait for installed MCP server records.
///
/// # Design Rules
///
/// - Installation status is only written through `set_installation_status`
/// - `delete()` cascades to the server's tools and agent assignments
#[async_trait]
pub trait McpServerRepository: Send + Sync {
    /// Insert a new server with `idle` status.
    ///
    /// # Errors
    ///
    /// - `Conflict` if a server with the same name already exists
    /// - `Storage` for storage errors
    async fn insert(&self, server: NewMcpServer) -> Result<McpServer, RepositoryError>;

    /// Get a server by id.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no server with the given id exists
    async fn get(&self, id: &str) -> Result<McpServer, RepositoryError>;

    /// List all servers, oldest first.
    async fn list(&self) -> Result<Vec<McpServer>, RepositoryError>;

    /// Persist an installation status and its diagnostic message.
    ///
    /// Transition legality is checked by the caller; this only writes.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no server with the given id exists
    async fn set_installation_status(
        &self,
        id: &str,
        status: LocalInstallationStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// Delete a server together with its tools and agent assignments.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no server with the given id exists
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;
}
