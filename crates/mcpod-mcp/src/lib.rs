//! MCP server installation for mcpod.
//!
//! - [`installation`]: the `idle → pending → success | error` state machine
//! - [`discovery`]: detached `tools/list` worker run after a pod starts
//! - [`service`]: install, uninstall, restart and crash recovery
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod discovery;
pub mod installation;
pub mod service;

// Re-export domain types from core for convenience
pub use mcpod_core::{LocalInstallationStatus, McpServer, McpServerType, ToolDefinition};

// Re-export this crate's public types
pub use discovery::{DiscoveryError, DiscoveryJob, DiscoveryReport, DiscoveryWorker};
pub use installation::{InstallationError, InstallationStatus, InstallationTracker};
pub use service::{INTERRUPTED_INSTALL_MESSAGE, InstallRequest, McpService};
