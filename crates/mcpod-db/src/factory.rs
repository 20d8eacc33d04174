//! Composition utilities for wiring the storage ports with `SQLite` backends.
//!
//! Construction only; no domain logic lives here.

use sqlx::SqlitePool;
use std::sync::Arc;

use mcpod_core::Repos;

use crate::repositories::{
    SqliteCatalogRepository, SqliteMcpRepository, SqliteSecretStore, SqliteToolRepository,
};

/// Factory for creating repository instances with `SQLite` backends.
pub struct RepoFactory;

impl RepoFactory {
    /// Open the database at `db_path`, creating it and its schema if needed.
    pub async fn create_pool(db_path: &std::path::Path) -> anyhow::Result<SqlitePool> {
        crate::setup::setup_database(db_path).await
    }

    /// Build all `SQLite` repositories from a pool.
    ///
    /// Returns a `Repos` container of trait objects sharing the pool.
    pub fn build_repos(pool: SqlitePool) -> Repos {
        Repos::new(
            Arc::new(SqliteMcpRepository::new(pool.clone())),
            Arc::new(SqliteCatalogRepository::new(pool.clone())),
            Arc::new(SqliteToolRepository::new(pool.clone())),
            Arc::new(SqliteSecretStore::new(pool)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;
    use mcpod_core::{CatalogEntry, NewMcpServer};

    #[tokio::test]
    async fn test_build_repos_shares_one_database() {
        let repos = RepoFactory::build_repos(setup_test_database().await.unwrap());

        repos
            .catalog
            .upsert(&CatalogEntry::local("echo", "Echo", "echo-mcp"))
            .await
            .unwrap();
        let server = repos
            .servers
            .insert(NewMcpServer::local("echo", "echo"))
            .await
            .unwrap();

        assert_eq!(repos.catalog.list().await.unwrap().len(), 1);
        assert_eq!(repos.servers.get(&server.id).await.unwrap().name, "echo");
    }

    #[tokio::test]
    async fn test_create_pool_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let pool = RepoFactory::create_pool(&dir.path().join("mcpod.db"))
            .await
            .unwrap();

        let repos = RepoFactory::build_repos(pool);
        assert!(repos.servers.list().await.unwrap().is_empty());
    }
}
