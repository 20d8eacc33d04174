//! MCP server handlers - install, uninstall, restart and queries.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use mcpod_core::{McpServer, PodLogs, ToolDefinition};
use mcpod_mcp::{InstallRequest, InstallationStatus};

use crate::error::HttpError;
use crate::state::AppState;

/// List all installed servers, oldest first.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<McpServer>>, HttpError> {
    Ok(Json(state.mcp.list_servers().await?))
}

/// Install a server from the catalog.
///
/// Local servers come back `pending` once their pod is addressable; poll
/// the installation status for the outcome of tool discovery.
pub async fn install(
    State(state): State<AppState>,
    payload: Result<Json<InstallRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<McpServer>), HttpError> {
    let Json(request) = payload?;
    let server = state.mcp.install(request).await?;
    Ok((StatusCode::CREATED, Json(server)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<McpServer>, HttpError> {
    Ok(Json(state.mcp.get_server(&id).await?))
}

/// Uninstall a server, tearing down its pod and forgetting its tools.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HttpError> {
    state.mcp.uninstall(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the server's pod with a fresh one.
pub async fn restart(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<McpServer>, HttpError> {
    Ok(Json(state.mcp.restart(&id).await?))
}

pub async fn installation_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InstallationStatus>, HttpError> {
    Ok(Json(state.mcp.installation_status(&id).await?))
}

/// Tools discovered on the server, ordered by name.
pub async fn list_tools(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ToolDefinition>>, HttpError> {
    Ok(Json(state.mcp.list_tools(&id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

/// Recent output of the server's pod.
pub async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<PodLogs>, HttpError> {
    let Query(query) = query?;
    Ok(Json(state.mcp.get_logs(&id, query.lines).await?))
}
