//! `SQLite` adapters for the mcpod storage ports.
//!
//! Server records, the catalog, discovered tools with their agent
//! assignments, and install-time secrets all live in one database file.
#![deny(unsafe_code)]

pub mod factory;
pub mod repositories;
pub mod setup;

// Re-export factory for convenient access
pub use factory::RepoFactory;

// Re-export repository implementations
pub use repositories::{
    SqliteCatalogRepository, SqliteMcpRepository, SqliteSecretStore, SqliteToolRepository,
};

// Re-export setup functions for convenient access
pub use setup::setup_database;
#[cfg(any(test, feature = "test-utils"))]
pub use setup::setup_test_database;
