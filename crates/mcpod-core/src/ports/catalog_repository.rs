//! Catalog of known server definitions.

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::CatalogEntry;

/// Lookup of the definitions servers are installed from.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Find a catalog entry by id.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the entry does not exist
    async fn find_by_id(&self, id: &str) -> Result<CatalogEntry, RepositoryError>;

    async fn list(&self) -> Result<Vec<CatalogEntry>, RepositoryError>;

    /// Insert or replace an entry.
    async fn upsert(&self, entry: &CatalogEntry) -> Result<(), RepositoryError>;
}
