//! Catalog handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use mcpod_core::CatalogEntry;

use crate::error::HttpError;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<CatalogEntry>>, HttpError> {
    Ok(Json(state.catalog.list().await?))
}

/// Add or replace a catalog entry.
pub async fn upsert(
    State(state): State<AppState>,
    payload: Result<Json<CatalogEntry>, JsonRejection>,
) -> Result<Json<CatalogEntry>, HttpError> {
    let Json(entry) = payload?;
    entry.validate().map_err(HttpError::BadRequest)?;
    state.catalog.upsert(&entry).await?;
    tracing::info!(catalog_id = %entry.id, "Catalog entry saved");
    Ok(Json(entry))
}
