//! Tool and agent assignment store.

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::{NewToolDefinition, ToolDefinition};

/// Persistence for discovered tools.
#[async_trait]
pub trait ToolRepository: Send + Sync {
    /// Insert a tool, or refresh the existing one with the same derived name
    /// on the same server.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the derived name already belongs to another server
    async fn upsert_tool(
        &self,
        tool: NewToolDefinition,
    ) -> Result<ToolDefinition, RepositoryError>;

    /// Tools of one server, ordered by name.
    async fn list_for_server(
        &self,
        server_id: &str,
    ) -> Result<Vec<ToolDefinition>, RepositoryError>;

    /// Assign a tool to an agent. Assigning twice is a no-op.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the tool does not exist
    async fn assign_tool_to_agent(
        &self,
        agent_id: &str,
        tool_id: &str,
    ) -> Result<(), RepositoryError>;

    /// Tool ids assigned to an agent.
    async fn list_agent_tools(&self, agent_id: &str) -> Result<Vec<String>, RepositoryError>;
}
