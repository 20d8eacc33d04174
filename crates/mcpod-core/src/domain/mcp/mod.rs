//! MCP server domain types.

mod catalog;
mod tool;
mod types;

pub use catalog::{CatalogEntry, WorkloadTemplate};
pub use tool::{
    NewToolDefinition, ToolDefinition, derive_tool_name, server_names_clash, slugify,
};
pub use types::{LocalInstallationStatus, McpServer, McpServerType, NewMcpServer, PodLogs};
