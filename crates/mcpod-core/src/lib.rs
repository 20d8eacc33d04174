//! Core domain types and port definitions for mcpod.
//!
//! This crate has no knowledge of processes, containers, SQL or HTTP. It
//! describes installed MCP servers, their installation lifecycle, the tools
//! discovered on them, and the ports that adapters implement.
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod events;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    CatalogEntry, LocalInstallationStatus, McpServer, McpServerType, NewMcpServer,
    NewToolDefinition, PodLogs, ToolDefinition, WorkloadTemplate, derive_tool_name,
    server_names_clash, slugify,
};
pub use events::{AppEvent, McpServerSummary};
pub use ports::{
    AppEventEmitter, CatalogRepository, McpServerRepository, McpServiceError,
    NoopEmitter, RepositoryError, Repos, RuntimeError, SecretStore, ToolRepository,
};
pub use settings::{
    DEFAULT_GATEWAY_PORT, DEFAULT_LOG_LINES, RuntimeSettings, SettingsError, validate_settings,
};
