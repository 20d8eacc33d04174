//! Repository implementations using `SQLite`.
//!
//! These implementations encapsulate all SQL queries and database access.
//! The `SqlitePool` is confined to this module and never exposed through
//! the port trait signatures.

mod sqlite_catalog_repository;
mod sqlite_mcp_repository;
mod sqlite_secret_store;
mod sqlite_tool_repository;

pub use sqlite_catalog_repository::SqliteCatalogRepository;
pub use sqlite_mcp_repository::SqliteMcpRepository;
pub use sqlite_secret_store::SqliteSecretStore;
pub use sqlite_tool_repository::SqliteToolRepository;

use mcpod_core::RepositoryError;

/// Map `SQLx` errors to `RepositoryError`.
///
/// Unique constraint violations become `Conflict`; everything else is a
/// storage failure.
pub(crate) fn map_sqlx_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return RepositoryError::Conflict(db.message().to_string());
        }
    }
    RepositoryError::Storage(e.to_string())
}
