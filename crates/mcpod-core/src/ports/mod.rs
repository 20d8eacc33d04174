//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No `sqlx` types in any signature
//! - No process/container implementation details
//! - Repository traits are minimal and limited to what the runtime invokes

pub mod catalog_repository;
pub mod event_emitter;
pub mod mcp_error;
pub mod mcp_repository;
pub mod runtime_error;
pub mod secret_store;
pub mod tool_repository;

use std::sync::Arc;
use thiserror::Error;

pub use catalog_repository::CatalogRepository;
pub use event_emitter::{AppEventEmitter, NoopEmitter};
pub use mcp_error::McpServiceError;
pub use mcp_repository::McpServerRepository;
pub use runtime_error::RuntimeError;
pub use secret_store::SecretStore;
pub use tool_repository::ToolRepository;

/// Container for all repository trait objects.
///
/// Lets adapters wire storage without depending on concrete implementations.
///
/// ```ignore
/// let repos = mcpod_db::RepoFactory::build_repos(pool);
/// let service = McpService::new(repos, runtime, settings, emitter);
/// ```
#[derive(Clone)]
pub struct Repos {
    /// Installed server records.
    pub servers: Arc<dyn McpServerRepository>,
    /// Catalog definitions.
    pub catalog: Arc<dyn CatalogRepository>,
    /// Discovered tools and agent assignments.
    pub tools: Arc<dyn ToolRepository>,
    /// Credentials created at install time.
    pub secrets: Arc<dyn SecretStore>,
}

impl Repos {
    /// Create a new Repos container.
    pub fn new(
        servers: Arc<dyn McpServerRepository>,
        catalog: Arc<dyn CatalogRepository>,
        tools: Arc<dyn ToolRepository>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            servers,
            catalog,
            tools,
            secrets,
        }
    }
}

/// Domain-specific errors for repository operations.
///
/// This error type abstracts away storage implementation details (e.g., sqlx errors)
/// and provides a clean interface for services to handle storage failures.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("Already exists: {0}")]
    Conflict(String),

    /// Storage backend error (database, filesystem, etc.).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
