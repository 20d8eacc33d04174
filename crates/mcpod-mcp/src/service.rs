//! High-level MCP service for installing and running MCP servers.
//!
//! This service provides the API used by the HTTP adapter. Storage, the pod
//! runtime and the event emitter are injected.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{TimeDelta, Utc};
use mcpod_core::{
    AppEvent, AppEventEmitter, LocalInstallationStatus, McpServer, McpServerSummary,
    McpServerType, McpServiceError, NewMcpServer, PodLogs, Repos, RepositoryError,
    RuntimeSettings, ToolDefinition, server_names_clash,
};
use mcpod_runtime::bridge::{ClientChannel, ExchangeEnd, JsonRpcEnvelope};
use mcpod_runtime::{PodHandle, PodRuntime};
use serde::{Deserialize, Serialize};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::discovery::{DiscoveryJob, DiscoveryWorker};
use crate::installation::{InstallationStatus, InstallationTracker};

/// Error recorded on installations found `pending` at startup.
pub const INTERRUPTED_INSTALL_MESSAGE: &str = "installation interrupted by gateway restart";

/// Request to install a server from the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub name: String,
    pub catalog_id: String,
    /// Agents that get the discovered tools assigned.
    #[serde(default)]
    pub agent_ids: Vec<String>,
    /// Non-secret configuration, passed to the pod as environment.
    #[serde(default)]
    pub user_config: BTreeMap<String, String>,
    /// Credentials stored in the secret store, passed to the pod as environment.
    #[serde(default)]
    pub secret_values: BTreeMap<String, String>,
}

struct DiscoveryTask {
    worker: AbortHandle,
    supervisor: JoinHandle<()>,
}

/// In-flight discovery runs by server id.
#[derive(Default)]
struct DiscoveryTasks {
    tasks: Mutex<HashMap<String, DiscoveryTask>>,
}

impl DiscoveryTasks {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, DiscoveryTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the entry of a finished run.
    fn finish(&self, server_id: &str) {
        self.lock().remove(server_id);
    }

    fn abort(&self, server_id: &str) -> bool {
        let Some(task) = self.lock().remove(server_id) else {
            return false;
        };
        task.worker.abort();
        task.supervisor.abort();
        true
    }

    fn abort_all(&self) {
        for (_, task) in self.lock().drain() {
            task.worker.abort();
            task.supervisor.abort();
        }
    }

    fn contains(&self, server_id: &str) -> bool {
        self.lock().contains_key(server_id)
    }
}

/// MCP service providing install, uninstall and runtime access.
pub struct McpService {
    repos: Repos,
    runtime: PodRuntime,
    installation: InstallationTracker,
    discovery: Arc<DiscoveryWorker>,
    tasks: Arc<DiscoveryTasks>,
    emitter: Arc<dyn AppEventEmitter>,
    settings: RuntimeSettings,
    /// Serializes the name check with the insert it guards.
    install_lock: tokio::sync::Mutex<()>,
}

impl McpService {
    /// Create a new MCP service with injected dependencies.
    pub fn new(
        repos: Repos,
        runtime: PodRuntime,
        settings: RuntimeSettings,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        let installation =
            InstallationTracker::new(Arc::clone(&repos.servers), Arc::clone(&emitter));
        let discovery = Arc::new(DiscoveryWorker::new(
            Arc::clone(&runtime.bridge),
            Arc::clone(&repos.tools),
            Arc::clone(&emitter),
            &settings,
        ));
        Self {
            repos,
            runtime,
            installation,
            discovery,
            tasks: Arc::new(DiscoveryTasks::default()),
            emitter,
            settings,
            install_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub const fn runtime(&self) -> &PodRuntime {
        &self.runtime
    }

    /// Recover from a previous gateway process.
    ///
    /// Installations stuck in `pending` for longer than the stale threshold
    /// are marked `error`. Recent `pending` installations get a new pod and a
    /// new discovery run, so they still reach `success` or `error`. Servers
    /// whose installation succeeded get their pod started again. Pod failures
    /// are logged, never returned.
    pub async fn initialize(&self) -> Result<(), McpServiceError> {
        let servers = self.repos.servers.list().await?;
        let stale_after =
            TimeDelta::from_std(self.settings.stale_pending_after()).unwrap_or(TimeDelta::MAX);
        let now = Utc::now();

        for server in servers.iter().filter(|s| s.is_local()) {
            match server.local_installation_status {
                LocalInstallationStatus::Pending if now - server.updated_at >= stale_after => {
                    info!(
                        server_id = %server.id,
                        server_name = %server.name,
                        "Marking interrupted installation as failed"
                    );
                    if let Err(e) = self
                        .installation
                        .fail(&server.id, INTERRUPTED_INSTALL_MESSAGE)
                        .await
                    {
                        warn!(server_id = %server.id, error = %e, "Failed to record interrupted installation");
                    }
                }
                LocalInstallationStatus::Pending => self.resume_installation(server).await,
                LocalInstallationStatus::Success => {
                    if let Err(e) = self.runtime.lifecycle.start_server(server).await {
                        warn!(
                            server_id = %server.id,
                            server_name = %server.name,
                            error = %e,
                            "Failed to restore MCP server pod"
                        );
                    }
                }
                LocalInstallationStatus::Idle | LocalInstallationStatus::Error => {}
            }
        }

        Ok(())
    }

    /// Finish an installation the previous process left `pending`.
    ///
    /// Agents named by the original request are not stored, so rediscovered
    /// tools are not assigned to any agent.
    async fn resume_installation(&self, server: &McpServer) {
        info!(
            server_id = %server.id,
            server_name = %server.name,
            "Resuming interrupted installation"
        );
        match self.runtime.lifecycle.start_server(server).await {
            Ok(_) => self.spawn_discovery(server, Vec::new()),
            Err(e) => {
                warn!(server_id = %server.id, error = %e, "Pod of interrupted installation failed to start");
                if let Err(err) = self.installation.fail(&server.id, &e.to_string()).await {
                    warn!(server_id = %server.id, error = %err, "Failed to record interrupted installation");
                }
            }
        }
    }

    /// Stop discovery and tear down every pod.
    pub async fn shutdown(&self) {
        self.tasks.abort_all();
        self.runtime.lifecycle.delete_all().await;
    }

    // =========================================================================
    // Install / Uninstall
    // =========================================================================

    /// Install a server from the catalog.
    ///
    /// Local servers come back `pending` with their pod running; tool
    /// discovery continues in the background. A pod that fails to start
    /// leaves nothing behind: the record and its secret are removed and the
    /// provisioning error is returned.
    pub async fn install(&self, request: InstallRequest) -> Result<McpServer, McpServiceError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(McpServiceError::InvalidConfig(
                "server name must not be empty".to_string(),
            ));
        }

        let entry = self.repos.catalog.find_by_id(&request.catalog_id).await?;
        entry.validate().map_err(McpServiceError::InvalidConfig)?;

        let install_guard = self.install_lock.lock().await;
        self.ensure_name_available(name).await?;

        let secret_id = if request.secret_values.is_empty() {
            None
        } else {
            Some(self.repos.secrets.create(request.secret_values).await?)
        };

        let mut new_server = match entry.server_type {
            McpServerType::Local => NewMcpServer::local(name, &entry.id),
            McpServerType::Remote => NewMcpServer::remote(name, Some(entry.id.clone())),
        };
        new_server.user_config = request.user_config;
        if let Some(secret_id) = &secret_id {
            new_server = new_server.with_secret(secret_id);
        }

        let server = match self.repos.servers.insert(new_server).await {
            Ok(server) => server,
            Err(e) => {
                self.discard_secret(secret_id.as_deref()).await;
                return Err(e.into());
            }
        };
        drop(install_guard);
        self.emitter.emit(AppEvent::mcp_server_installed(
            McpServerSummary::from(&server),
        ));

        if !server.is_local() {
            info!(server_id = %server.id, server_name = %server.name, "Installed remote MCP server");
            return Ok(server);
        }

        if let Err(e) = self.installation.begin(&server.id).await {
            self.rollback(&server).await;
            return Err(e.into());
        }

        if let Err(e) = self.runtime.lifecycle.start_server(&server).await {
            warn!(
                server_id = %server.id,
                server_name = %server.name,
                error = %e,
                "Pod failed to start; rolling back install"
            );
            if let Err(err) = self.installation.fail(&server.id, &e.to_string()).await {
                debug!(server_id = %server.id, error = %err, "Could not record failed installation");
            }
            self.rollback(&server).await;
            return Err(e.into());
        }

        self.spawn_discovery(&server, request.agent_ids);
        info!(server_id = %server.id, server_name = %server.name, "Installed MCP server; discovering tools");

        Ok(self.repos.servers.get(&server.id).await?)
    }

    /// Reject names whose derived tool names could collide with those of an
    /// installed server.
    async fn ensure_name_available(&self, name: &str) -> Result<(), McpServiceError> {
        let servers = self.repos.servers.list().await?;
        if let Some(existing) = servers.iter().find(|s| server_names_clash(&s.name, name)) {
            return Err(RepositoryError::Conflict(format!(
                "server name '{name}' clashes with installed server '{}'",
                existing.name
            ))
            .into());
        }
        Ok(())
    }

    /// Remove a server, its pod, its tools and its secret.
    pub async fn uninstall(&self, server_id: &str) -> Result<(), McpServiceError> {
        let server = self.repos.servers.get(server_id).await?;

        if self.tasks.abort(server_id) {
            debug!(server_id = %server_id, "Aborted in-flight tool discovery");
        }
        self.runtime.lifecycle.delete_server(server_id).await;
        self.repos.servers.delete(server_id).await?;
        self.discard_secret(server.secret_id.as_deref()).await;

        self.emitter.emit(AppEvent::mcp_server_removed(server_id));
        info!(server_id = %server_id, server_name = %server.name, "Uninstalled MCP server");
        Ok(())
    }

    /// Replace the pod of an installed server.
    ///
    /// The installation status is left untouched and tools are not
    /// rediscovered.
    pub async fn restart(&self, server_id: &str) -> Result<McpServer, McpServiceError> {
        self.runtime.lifecycle.restart_server(server_id).await?;
        Ok(self.repos.servers.get(server_id).await?)
    }

    async fn rollback(&self, server: &McpServer) {
        if let Err(e) = self.repos.servers.delete(&server.id).await {
            warn!(server_id = %server.id, error = %e, "Failed to delete server record during rollback");
        }
        self.discard_secret(server.secret_id.as_deref()).await;
        self.emitter.emit(AppEvent::mcp_server_removed(&server.id));
    }

    async fn discard_secret(&self, secret_id: Option<&str>) {
        let Some(secret_id) = secret_id else {
            return;
        };
        if let Err(e) = self.repos.secrets.delete(secret_id).await {
            warn!(secret_id = %secret_id, error = %e, "Failed to delete secret");
        }
    }

    fn spawn_discovery(&self, server: &McpServer, agent_ids: Vec<String>) {
        let job = DiscoveryJob {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            agent_ids,
        };
        // Registered before the supervisor can finish and deregister itself.
        let mut tasks = self.tasks.lock();

        let worker = Arc::clone(&self.discovery);
        let run = tokio::spawn(async move { worker.run(&job).await });
        let abort = run.abort_handle();

        let installation = self.installation.clone();
        let registry = Arc::clone(&self.tasks);
        let server_id = server.id.clone();
        let supervisor = tokio::spawn(async move {
            let outcome = match run.await {
                Ok(Ok(_report)) => installation.succeed(&server_id).await,
                Ok(Err(e)) => {
                    warn!(server_id = %server_id, error = %e, "Tool discovery failed");
                    installation.fail(&server_id, &e.to_string()).await
                }
                Err(join) if join.is_cancelled() => {
                    debug!(server_id = %server_id, "Tool discovery cancelled");
                    return;
                }
                Err(join) => {
                    warn!(server_id = %server_id, error = %join, "Tool discovery panicked");
                    installation
                        .fail(&server_id, &format!("tool discovery panicked: {join}"))
                        .await
                }
            };
            if let Err(e) = outcome {
                warn!(server_id = %server_id, error = %e, "Failed to record installation outcome");
            }
            registry.finish(&server_id);
        });

        let task = DiscoveryTask {
            worker: abort,
            supervisor,
        };
        if let Some(previous) = tasks.insert(server.id.clone(), task) {
            previous.worker.abort();
        }
    }

    /// Whether tool discovery is still running for the server.
    pub fn is_discovering(&self, server_id: &str) -> bool {
        self.tasks.contains(server_id)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn installation_status(
        &self,
        server_id: &str,
    ) -> Result<InstallationStatus, McpServiceError> {
        Ok(self.installation.status(server_id).await?)
    }

    pub async fn get_server(&self, server_id: &str) -> Result<McpServer, McpServiceError> {
        Ok(self.repos.servers.get(server_id).await?)
    }

    pub async fn list_servers(&self) -> Result<Vec<McpServer>, McpServiceError> {
        Ok(self.repos.servers.list().await?)
    }

    pub async fn list_tools(&self, server_id: &str) -> Result<Vec<ToolDefinition>, McpServiceError> {
        self.repos.servers.get(server_id).await?;
        Ok(self.repos.tools.list_for_server(server_id).await?)
    }

    /// Recent output of the server's pod; `lines` defaults to the configured
    /// line count.
    pub async fn get_logs(
        &self,
        server_id: &str,
        lines: Option<usize>,
    ) -> Result<PodLogs, McpServiceError> {
        let lines = lines.unwrap_or(self.settings.default_log_lines);
        Ok(self.runtime.logs.get_logs(server_id, lines).await?)
    }

    // =========================================================================
    // Proxy
    // =========================================================================

    pub fn get_pod(&self, server_id: &str) -> Option<Arc<PodHandle>> {
        self.runtime.get_pod(server_id)
    }

    /// Relay one JSON-RPC message to the server's pod.
    pub async fn proxy<C>(
        &self,
        server_id: &str,
        message: JsonRpcEnvelope,
        channel: &mut C,
    ) -> Result<ExchangeEnd, McpServiceError>
    where
        C: ClientChannel + ?Sized,
    {
        Ok(self.runtime.bridge.proxy(server_id, message, channel).await?)
    }
}

#[cfg(test)]
mod tests;
