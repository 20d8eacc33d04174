//! Catalog command handlers.

use std::path::Path;

use anyhow::{Result, anyhow};
use mcpod_core::{CatalogEntry, Repos};
use mcpod_db::RepoFactory;

async fn open(database: &Path) -> Result<Repos> {
    let pool = RepoFactory::create_pool(database).await?;
    Ok(RepoFactory::build_repos(pool))
}

/// Validate and store a catalog entry.
pub async fn add(database: &Path, entry: CatalogEntry) -> Result<()> {
    entry.validate().map_err(|e| anyhow!(e))?;
    let repos = open(database).await?;
    repos.catalog.upsert(&entry).await?;
    println!("Saved catalog entry '{}' ({})", entry.id, entry.name);
    Ok(())
}

/// Print every catalog entry.
pub async fn list(database: &Path) -> Result<()> {
    let repos = open(database).await?;
    let entries = repos.catalog.list().await?;
    if entries.is_empty() {
        println!("Catalog is empty.");
        return Ok(());
    }

    println!("{:<24} {:<8} {:<24} IMAGE", "ID", "TYPE", "NAME");
    for entry in entries {
        let image = entry
            .workload
            .as_ref()
            .map_or("-", |w| w.image.as_str());
        println!(
            "{:<24} {:<8} {:<24} {image}",
            entry.id,
            entry.server_type.as_str(),
            entry.name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_then_list_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let database = dir.path().join("mcpod.db");

        add(&database, CatalogEntry::local("echo", "Echo", "echo-mcp"))
            .await
            .unwrap();
        list(&database).await.unwrap();

        let repos = open(&database).await.unwrap();
        assert_eq!(repos.catalog.find_by_id("echo").await.unwrap().name, "Echo");
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_entry() {
        let dir = tempfile::tempdir().unwrap();
        let database = dir.path().join("mcpod.db");

        let result = add(&database, CatalogEntry::local("echo", "Echo", " ")).await;

        assert!(result.is_err());
        assert!(!database.exists());
    }
}
