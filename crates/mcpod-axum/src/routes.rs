//! Route definitions and router construction.
//!
//! Axum 0.8 uses brace syntax for path parameters: `{id}`.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::bootstrap::CorsConfig;
use crate::handlers;
use crate::state::AppState;

/// Build CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    match config {
        CorsConfig::AllowAll => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsConfig::AllowOrigins(origins) => {
            use axum::http::HeaderValue;
            let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// All API routes without the `/api` prefix (nested by the caller).
pub(crate) fn api_routes() -> Router<AppState> {
    Router::new()
        // MCP servers
        .route(
            "/mcp/servers",
            get(handlers::servers::list).post(handlers::servers::install),
        )
        .route(
            "/mcp/servers/{id}",
            get(handlers::servers::get).delete(handlers::servers::remove),
        )
        .route(
            "/mcp/servers/{id}/restart",
            post(handlers::servers::restart),
        )
        .route(
            "/mcp/servers/{id}/installation-status",
            get(handlers::servers::installation_status),
        )
        .route("/mcp/servers/{id}/tools", get(handlers::servers::list_tools))
        .route("/mcp/servers/{id}/logs", get(handlers::servers::logs))
        .route("/mcp/servers/{id}/proxy", post(handlers::proxy::proxy))
        // Catalog
        .route(
            "/catalog",
            get(handlers::catalog::list).post(handlers::catalog::upsert),
        )
        // Events (SSE)
        .route("/events", get(handlers::events::stream))
}

/// Create the main router: `/health` plus every API route under `/api`.
pub fn create_router(state: AppState, cors_config: &CorsConfig) -> Router {
    let cors = build_cors_layer(cors_config);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes().with_state(state).layer(cors))
}

/// Health check endpoint.
pub(crate) async fn health_check() -> &'static str {
    "OK"
}
