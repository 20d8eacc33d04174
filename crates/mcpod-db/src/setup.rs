//! Database setup and initialization.
//!
//! This module provides the `setup_database()` function for initializing
//! the `SQLite` database with full schema. Entry points call this with the
//! resolved database path.

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::path::Path;
use tracing::debug;

/// Sets up the `SQLite` database connection and ensures the schema exists.
///
/// Creates the parent directory and the database file when missing. Foreign
/// keys are enforced on every connection so that deleting a server cascades
/// to its tools and agent assignments.
///
/// # Example
///
/// ```rust,no_run
/// use mcpod_db::setup_database;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let pool = setup_database(Path::new("/var/lib/mcpod/mcpod.db")).await?;
/// # Ok(())
/// # }
/// ```
pub async fn setup_database(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true),
    )
    .await?;

    create_schema(&pool).await?;
    debug!(path = %db_path.display(), "Database ready");

    Ok(pool)
}

/// Sets up an in-memory `SQLite` database for testing.
///
/// Creates a fresh in-memory database with the full production schema. The
/// pool holds a single connection that never expires, since the database
/// lives only as long as its connection.
#[cfg(any(test, feature = "test-utils"))]
pub async fn setup_test_database() -> Result<SqlitePool> {
    use sqlx::sqlite::SqlitePoolOptions;
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Creates the complete database schema.
///
/// Safe to call multiple times as all operations use IF NOT EXISTS.
async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Catalog definitions; `workload` is a JSON `WorkloadTemplate`
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS catalog_entries (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            type TEXT NOT NULL CHECK (type IN ('local', 'remote')),
            workload TEXT
        )
        ",
    )
    .execute(pool)
    .await?;

    // Install-time credentials
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS mcp_secrets (
            id TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS mcp_secret_values (
            secret_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            FOREIGN KEY (secret_id) REFERENCES mcp_secrets(id) ON DELETE CASCADE,
            UNIQUE(secret_id, key)
        )
        ",
    )
    .execute(pool)
    .await?;

    // Installed servers
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS mcp_servers (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL UNIQUE,
            catalog_id TEXT,
            secret_id TEXT,
            type TEXT NOT NULL CHECK (type IN ('local', 'remote')),
            user_config TEXT NOT NULL DEFAULT '{}',
            local_installation_status TEXT NOT NULL DEFAULT 'idle'
                CHECK (local_installation_status IN ('idle', 'pending', 'success', 'error')),
            local_installation_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    // Discovered tools; derived names are unique across all servers
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS mcp_tools (
            id TEXT PRIMARY KEY NOT NULL,
            server_id TEXT NOT NULL,
            name TEXT NOT NULL UNIQUE,
            raw_name TEXT NOT NULL,
            description TEXT,
            input_schema TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (server_id) REFERENCES mcp_servers(id) ON DELETE CASCADE
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mcp_tools_server ON mcp_tools(server_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS agent_tools (
            agent_id TEXT NOT NULL,
            tool_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (agent_id, tool_id),
            FOREIGN KEY (tool_id) REFERENCES mcp_tools(id) ON DELETE CASCADE
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setup_test_database() {
        let pool = setup_test_database().await.unwrap();

        for table in [
            "catalog_entries",
            "mcp_secrets",
            "mcp_secret_values",
            "mcp_servers",
            "mcp_tools",
            "agent_tools",
        ] {
            let _: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_setup_database_on_disk_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mcpod.db");

        let pool = setup_database(&path).await.unwrap();
        sqlx::query("INSERT INTO mcp_secrets (id, created_at) VALUES ('s1', '2024-01-01T00:00:00Z')")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let pool = setup_database(&path).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mcp_secrets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
