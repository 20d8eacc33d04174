//! HTTP gateway for mcpod.
//!
//! Exposes install, uninstall, restart, installation status, tools, logs and
//! the streamed JSON-RPC proxy over axum, plus an SSE feed of runtime events.
#![deny(unsafe_code)]

pub mod bootstrap;
pub mod channel;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod sse;
pub mod state;

// Re-export primary types
pub use bootstrap::{AxumContext, CorsConfig, ServerConfig, bootstrap, start_server};
pub use error::HttpError;
pub use routes::create_router;
pub use sse::SseBroadcaster;
pub use state::AppState;
