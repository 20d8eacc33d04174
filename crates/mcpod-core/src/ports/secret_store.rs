//! Credential storage.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::RepositoryError;

/// Stores key/value credentials passed to workloads as environment.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store `values` and return the new secret id.
    async fn create(&self, values: BTreeMap<String, String>) -> Result<String, RepositoryError>;

    /// # Errors
    ///
    /// - `NotFound` if the secret does not exist
    async fn get(&self, id: &str) -> Result<BTreeMap<String, String>, RepositoryError>;

    /// # Errors
    ///
    /// - `NotFound` if the secret does not exist
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;
}
