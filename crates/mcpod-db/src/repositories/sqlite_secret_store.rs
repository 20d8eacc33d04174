//! `SQLite` implementation of the secret store.
//!
//! Values are stored base64-encoded. This is an encoding, not encryption.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use sqlx::SqlitePool;

use mcpod_core::{RepositoryError, SecretStore};

use super::map_sqlx_error;

/// `SQLite` implementation of the secret store.
pub struct SqliteSecretStore {
    pool: SqlitePool,
}

impl SqliteSecretStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SecretValueRow {
    key: String,
    value: String,
}

/// Decode a base64-encoded secret value.
fn decode_value(encoded: &str) -> Result<String, RepositoryError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| RepositoryError::Serialization(format!("Failed to decode secret: {e}")))?;

    String::from_utf8(bytes)
        .map_err(|e| RepositoryError::Serialization(format!("Invalid UTF-8 in secret: {e}")))
}

/// Encode a secret value to base64.
fn encode_value(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

#[async_trait]
impl SecretStore for SqliteSecretStore {
    async fn create(&self, values: BTreeMap<String, String>) -> Result<String, RepositoryError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("INSERT INTO mcp_secrets (id, created_at) VALUES (?, ?)")
            .bind(&id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for (key, value) in &values {
            sqlx::query("INSERT INTO mcp_secret_values (secret_id, key, value) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(key)
                .bind(encode_value(value))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<BTreeMap<String, String>, RepositoryError> {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM mcp_secrets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound(format!("secret {id}")));
        }

        let rows = sqlx::query_as::<_, SecretValueRow>(
            "SELECT key, value FROM mcp_secret_values WHERE secret_id = ?",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| Ok((row.key, decode_value(&row.value)?)))
            .collect()
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        // Values are deleted via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM mcp_secrets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("secret {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;

    #[tokio::test]
    async fn test_create_get_delete() {
        let pool = setup_test_database().await.unwrap();
        let store = SqliteSecretStore::new(pool.clone());
        let values = BTreeMap::from([
            ("API_KEY".to_string(), "s3cret".to_string()),
            ("TOKEN".to_string(), "ünïcode".to_string()),
        ]);

        let id = store.create(values.clone()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), values);

        // Stored encoded, not as plain text
        let (raw,): (String,) =
            sqlx::query_as("SELECT value FROM mcp_secret_values WHERE key = 'API_KEY'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_ne!(raw, "s3cret");

        store.delete(&id).await.unwrap();
        assert!(matches!(store.get(&id).await, Err(RepositoryError::NotFound(_))));
        let (left,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mcp_secret_values")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(left, 0);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = SqliteSecretStore::new(setup_test_database().await.unwrap());

        assert!(matches!(
            store.delete("nope").await,
            Err(RepositoryError::NotFound(_))
        ));
    }
}
