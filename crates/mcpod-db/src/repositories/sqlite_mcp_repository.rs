//! `SQLite` implementation of the MCP server repository.
//!
//! Non-secret user configuration is stored as a JSON object column.
//! Installation status and error are plain columns updated in place.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use mcpod_core::{
    LocalInstallationStatus, McpServer, McpServerRepository, NewMcpServer, RepositoryError,
};

use super::map_sqlx_error;

/// `SQLite` implementation of the MCP server repository.
pub struct SqliteMcpRepository {
    pool: SqlitePool,
}

impl SqliteMcpRepository {
    /// Create a new `SQLite` MCP repository.
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal row types for database queries
// ─────────────────────────────────────────────────────────────────────────────

const SELECT_SERVER: &str = r"
    SELECT id, name, catalog_id, secret_id, type, user_config,
           local_installation_status, local_installation_error, created_at, updated_at
    FROM mcp_servers
";

#[derive(sqlx::FromRow)]
struct McpServerRow {
    id: String,
    name: String,
    catalog_id: Option<String>,
    secret_id: Option<String>,
    #[sqlx(rename = "type")]
    server_type: String,
    user_config: String,
    local_installation_status: String,
    local_installation_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Convert a `McpServerRow` to domain `McpServer`.
fn row_to_server(row: McpServerRow) -> Result<McpServer, RepositoryError> {
    let user_config: BTreeMap<String, String> = serde_json::from_str(&row.user_config)
        .map_err(|e| RepositoryError::Serialization(format!("user_config of {}: {e}", row.id)))?;

    Ok(McpServer {
        server_type: row
            .server_type
            .parse()
            .map_err(RepositoryError::Serialization)?,
        local_installation_status: row
            .local_installation_status
            .parse()
            .map_err(RepositoryError::Serialization)?,
        id: row.id,
        name: row.name,
        catalog_id: row.catalog_id,
        secret_id: row.secret_id,
        user_config,
        local_installation_error: row.local_installation_error,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl McpServerRepository for SqliteMcpRepository {
    async fn insert(&self, server: NewMcpServer) -> Result<McpServer, RepositoryError> {
        let server = server.into_server(Utc::now());
        let user_config = serde_json::to_string(&server.user_config)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO mcp_servers (id, name, catalog_id, secret_id, type, user_config,
                                     local_installation_status, local_installation_error,
                                     created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&server.id)
        .bind(&server.name)
        .bind(&server.catalog_id)
        .bind(&server.secret_id)
        .bind(server.server_type.as_str())
        .bind(&user_config)
        .bind(server.local_installation_status.as_str())
        .bind(&server.local_installation_error)
        .bind(server.created_at)
        .bind(server.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match map_sqlx_error(e) {
            RepositoryError::Conflict(_) => {
                RepositoryError::Conflict(format!("MCP server name '{}' already exists", server.name))
            }
            other => other,
        })?;

        Ok(server)
    }

    async fn get(&self, id: &str) -> Result<McpServer, RepositoryError> {
        let row = sqlx::query_as::<_, McpServerRow>(&format!("{SELECT_SERVER} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| RepositoryError::NotFound(format!("MCP server {id}")))?;

        row_to_server(row)
    }

    async fn list(&self) -> Result<Vec<McpServer>, RepositoryError> {
        // Insertion order is creation order
        let rows = sqlx::query_as::<_, McpServerRow>(&format!("{SELECT_SERVER} ORDER BY rowid"))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(row_to_server).collect()
    }

    async fn set_installation_status(
        &self,
        id: &str,
        status: LocalInstallationStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE mcp_servers
            SET local_installation_status = ?, local_installation_error = ?, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("MCP server {id}")));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        // Tools and agent assignments are deleted via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM mcp_servers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("MCP server {id}")));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
