//! Gateway bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together for
//! the HTTP gateway. All concrete implementations are instantiated here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use mcpod_core::{
    AppEventEmitter, CatalogRepository, DEFAULT_GATEWAY_PORT, Repos, RuntimeSettings,
    validate_settings,
};
use mcpod_db::RepoFactory;
use mcpod_mcp::McpService;
use mcpod_runtime::{Launcher, PodRuntime, ProcessBackend, WorkloadBackend};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::sse::SseBroadcaster;

/// CORS configuration for the web server.
#[derive(Debug, Clone, Default)]
pub enum CorsConfig {
    /// Allow all origins (development mode).
    #[default]
    AllowAll,
    /// Allow specific origins (production mode).
    AllowOrigins(Vec<String>),
}

/// Server configuration for the gateway.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the HTTP server.
    pub port: u16,
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// How pods are launched.
    pub launcher: Launcher,
    /// Timeouts and retry budgets of the runtime.
    pub settings: RuntimeSettings,
    /// CORS configuration.
    pub cors: CorsConfig,
}

impl ServerConfig {
    /// Config with default port, launcher and settings.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            port: DEFAULT_GATEWAY_PORT,
            database_path: database_path.into(),
            launcher: Launcher::default(),
            settings: RuntimeSettings::default(),
            cors: CorsConfig::default(),
        }
    }

    /// Set CORS to allow specific origins.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.cors = CorsConfig::AllowOrigins(origins);
        self
    }
}

/// Application context for the gateway.
pub struct AxumContext {
    /// Install service owning the pod runtime.
    pub mcp: Arc<McpService>,
    /// Catalog definitions servers are installed from.
    pub catalog: Arc<dyn CatalogRepository>,
    /// SSE broadcaster for real-time events.
    pub sse: Arc<SseBroadcaster>,
    /// Stops background tasks (health monitor) on shutdown.
    pub cancel_token: CancellationToken,
}

impl AxumContext {
    /// Wire the service over the given storage and backend.
    ///
    /// Nothing is started: no crash recovery and no health monitor. See
    /// [`bootstrap`] for the full startup sequence.
    pub fn compose(
        repos: Repos,
        backend: Arc<dyn WorkloadBackend>,
        settings: RuntimeSettings,
    ) -> Self {
        let sse = Arc::new(SseBroadcaster::with_defaults());
        let emitter: Arc<dyn AppEventEmitter> = sse.clone();
        let runtime = PodRuntime::new(&repos, backend, &settings, Arc::clone(&emitter));
        let catalog = Arc::clone(&repos.catalog);
        let mcp = Arc::new(McpService::new(repos, runtime, settings, emitter));

        Self {
            mcp,
            catalog,
            sse,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Stop background tasks and tear down every pod.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.mcp.shutdown().await;
    }
}

/// Bootstrap the gateway with all services.
///
/// Opens the database, recovers installations interrupted by a previous
/// run, restarts pods of installed servers and starts the health monitor.
pub async fn bootstrap(config: ServerConfig) -> Result<AxumContext> {
    validate_settings(&config.settings).context("invalid runtime settings")?;

    info!(
        target: "mcpod.paths",
        database_path = %config.database_path.display(),
        launcher = ?config.launcher,
        "Gateway bootstrap resolved configuration"
    );

    // 1. Create database pool with full schema setup
    let pool = RepoFactory::create_pool(&config.database_path).await?;
    let repos = RepoFactory::build_repos(pool);

    // 2. Workload backend
    let backend: Arc<dyn WorkloadBackend> = Arc::new(ProcessBackend::new(config.launcher));

    // 3. Service, runtime and SSE emitter
    let ctx = AxumContext::compose(repos, backend, config.settings.clone());

    // 4. Crash recovery
    ctx.mcp
        .initialize()
        .await
        .context("failed to recover installations")?;

    // 5. Health monitor
    let emitter: Arc<dyn AppEventEmitter> = ctx.sse.clone();
    ctx.mcp
        .runtime()
        .health_monitor(&config.settings, emitter, ctx.cancel_token.clone())
        .spawn();

    Ok(ctx)
}

/// Start the gateway on the configured port and serve until Ctrl-C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let cors = config.cors.clone();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let ctx = Arc::new(bootstrap(config).await?);
    let app = crate::routes::create_router(Arc::clone(&ctx), &cors);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("mcpod gateway listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, tearing down pods");
    ctx.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
