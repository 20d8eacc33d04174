//! Serve command handler.

use std::path::Path;

use anyhow::Result;
use mcpod_axum::{ServerConfig, start_server};

use crate::commands::ServeArgs;

/// Build the gateway configuration from flags and environment.
pub fn server_config(database: &Path, args: &ServeArgs) -> ServerConfig {
    let mut config = ServerConfig::new(database);
    config.port = args.port;
    config.launcher = args.launcher();
    config.settings = args.settings();
    if !args.allowed_origins.is_empty() {
        config = config.with_allowed_origins(args.allowed_origins.clone());
    }
    config
}

/// Run the gateway until Ctrl-C.
pub async fn execute(database: &Path, args: &ServeArgs) -> Result<()> {
    start_server(server_config(database, args)).await
}
