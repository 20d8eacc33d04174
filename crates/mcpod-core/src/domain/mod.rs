//! Domain types shared by every mcpod crate.

pub mod mcp;

pub use mcp::{
    CatalogEntry, LocalInstallationStatus, McpServer, McpServerType, NewMcpServer,
    NewToolDefinition, PodLogs, ToolDefinition, WorkloadTemplate, derive_tool_name,
    server_names_clash, slugify,
};
