//! `SQLite` implementation of the catalog repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use mcpod_core::{CatalogEntry, CatalogRepository, RepositoryError, WorkloadTemplate};

use super::map_sqlx_error;

/// `SQLite` implementation of the catalog repository.
pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CatalogRow {
    id: String,
    name: String,
    description: Option<String>,
    #[sqlx(rename = "type")]
    server_type: String,
    workload: Option<String>,
}

fn row_to_entry(row: CatalogRow) -> Result<CatalogEntry, RepositoryError> {
    let workload = row
        .workload
        .as_deref()
        .map(serde_json::from_str::<WorkloadTemplate>)
        .transpose()
        .map_err(|e| RepositoryError::Serialization(format!("workload of {}: {e}", row.id)))?;

    Ok(CatalogEntry {
        server_type: row
            .server_type
            .parse()
            .map_err(RepositoryError::Serialization)?,
        id: row.id,
        name: row.name,
        description: row.description,
        workload,
    })
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn find_by_id(&self, id: &str) -> Result<CatalogEntry, RepositoryError> {
        let row = sqlx::query_as::<_, CatalogRow>(
            "SELECT id, name, description, type, workload FROM catalog_entries WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| RepositoryError::NotFound(format!("catalog entry {id}")))?;

        row_to_entry(row)
    }

    async fn list(&self) -> Result<Vec<CatalogEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            "SELECT id, name, description, type, workload FROM catalog_entries ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(row_to_entry).collect()
    }

    async fn upsert(&self, entry: &CatalogEntry) -> Result<(), RepositoryError> {
        let workload = entry
            .workload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO catalog_entries (id, name, description, type, workload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                type = excluded.type,
                workload = excluded.workload
            ",
        )
        .bind(&entry.id)
        .bind(&entry.name)
        .bind(&entry.description)
        .bind(entry.server_type.as_str())
        .bind(&workload)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
