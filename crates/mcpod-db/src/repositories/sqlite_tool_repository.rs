//! `SQLite` implementation of the tool repository.
//!
//! Derived tool names are unique across the whole table. An upsert only
//! refreshes a row that belongs to the same server; a name owned by another
//! server is reported as a conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use mcpod_core::{NewToolDefinition, RepositoryError, ToolDefinition, ToolRepository};

use super::map_sqlx_error;

/// `SQLite` implementation of the tool repository.
pub struct SqliteToolRepository {
    pool: SqlitePool,
}

impl SqliteToolRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal row types for database queries
// ─────────────────────────────────────────────────────────────────────────────

const SELECT_TOOL: &str = r"
    SELECT id, server_id, name, raw_name, description, input_schema, created_at
    FROM mcp_tools
";

#[derive(sqlx::FromRow)]
struct ToolRow {
    id: String,
    server_id: String,
    name: String,
    raw_name: String,
    description: Option<String>,
    input_schema: Option<String>,
    created_at: DateTime<Utc>,
}

fn row_to_tool(row: ToolRow) -> Result<ToolDefinition, RepositoryError> {
    let input_schema = row
        .input_schema
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| RepositoryError::Serialization(format!("input_schema of {}: {e}", row.name)))?;

    Ok(ToolDefinition {
        id: row.id,
        server_id: row.server_id,
        name: row.name,
        raw_name: row.raw_name,
        description: row.description,
        input_schema,
        created_at: row.created_at,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ToolRepository for SqliteToolRepository {
    async fn upsert_tool(
        &self,
        tool: NewToolDefinition,
    ) -> Result<ToolDefinition, RepositoryError> {
        let input_schema = tool
            .input_schema
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r"
            INSERT INTO mcp_tools (id, server_id, name, raw_name, description, input_schema, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                raw_name = excluded.raw_name,
                description = excluded.description,
                input_schema = excluded.input_schema
            WHERE mcp_tools.server_id = excluded.server_id
            ",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&tool.server_id)
        .bind(&tool.name)
        .bind(&tool.raw_name)
        .bind(&tool.description)
        .bind(&input_schema)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        // The conflict clause skipped the update: another server owns the name
        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "tool name '{}' already belongs to another server",
                tool.name
            )));
        }

        let row = sqlx::query_as::<_, ToolRow>(&format!("{SELECT_TOOL} WHERE name = ?"))
            .bind(&tool.name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row_to_tool(row)
    }

    async fn list_for_server(
        &self,
        server_id: &str,
    ) -> Result<Vec<ToolDefinition>, RepositoryError> {
        let rows = sqlx::query_as::<_, ToolRow>(&format!(
            "{SELECT_TOOL} WHERE server_id = ? ORDER BY name"
        ))
        .bind(server_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(row_to_tool).collect()
    }

    async fn assign_tool_to_agent(
        &self,
        agent_id: &str,
        tool_id: &str,
    ) -> Result<(), RepositoryError> {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM mcp_tools WHERE id = ?")
            .bind(tool_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound(format!("tool {tool_id}")));
        }

        sqlx::query(
            "INSERT OR IGNORE INTO agent_tools (agent_id, tool_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(agent_id)
        .bind(tool_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_agent_tools(&self, agent_id: &str) -> Result<Vec<String>, RepositoryError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT tool_id FROM agent_tools WHERE agent_id = ? ORDER BY created_at, tool_id",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
