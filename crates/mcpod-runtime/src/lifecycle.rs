//! Lifecycle controller: start, restart and delete the pod of one server.
//!
//! Every operation takes the registry's per-server lock, so an install racing
//! a restart for the same id can never register two pods, while unrelated
//! servers provision concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mcpod_core::{
    AppEvent, AppEventEmitter, CatalogRepository, McpServer, McpServerRepository, RepositoryError,
    RuntimeError, SecretStore,
};
use tracing::{debug, info, warn};

use crate::backend::{WorkloadBackend, WorkloadSpec, pod_name_for};
use crate::registry::{PodHandle, PodRegistry, PodStdio};

/// How often addressability is polled while provisioning.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Creates, restarts and tears down pods.
pub struct LifecycleController {
    registry: Arc<dyn PodRegistry>,
    backend: Arc<dyn WorkloadBackend>,
    servers: Arc<dyn McpServerRepository>,
    catalog: Arc<dyn CatalogRepository>,
    secrets: Arc<dyn SecretStore>,
    emitter: Arc<dyn AppEventEmitter>,
    provision_timeout: Duration,
    poll_interval: Duration,
}

impl LifecycleController {
    pub fn new(
        registry: Arc<dyn PodRegistry>,
        backend: Arc<dyn WorkloadBackend>,
        servers: Arc<dyn McpServerRepository>,
        catalog: Arc<dyn CatalogRepository>,
        secrets: Arc<dyn SecretStore>,
        emitter: Arc<dyn AppEventEmitter>,
        provision_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            backend,
            servers,
            catalog,
            secrets,
            emitter,
            provision_timeout,
            poll_interval: READY_POLL_INTERVAL.min(provision_timeout / 4),
        }
    }

    /// Provision the pod of a local server and register it.
    ///
    /// Returns once the workload is addressable; the MCP server inside may
    /// still be starting.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if a pod is registered for the server
    /// - `InvalidConfig` for non-local servers or unusable catalog entries
    /// - `Provision` if the workload cannot be created or does not become
    ///   addressable in time; nothing is left registered or running
    pub async fn start_server(&self, server: &McpServer) -> Result<Arc<PodHandle>, RuntimeError> {
        let _guard = self.registry.lock(&server.id).await;
        self.start_locked(server).await
    }

    /// Replace the pod of an existing server.
    ///
    /// Tool discovery is not re-run and installation status is untouched.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the server does not exist
    /// - otherwise as [`Self::start_server`]
    pub async fn restart_server(&self, server_id: &str) -> Result<Arc<PodHandle>, RuntimeError> {
        let server = self.servers.get(server_id).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => {
                RuntimeError::NotFound(format!("server {server_id} does not exist"))
            }
            other => RuntimeError::Repository(other),
        })?;

        let _guard = self.registry.lock(server_id).await;
        info!(server_id = %server_id, server_name = %server.name, "Restarting pod");
        self.teardown_locked(server_id, "restart").await;
        self.start_locked(&server).await
    }

    /// Best-effort teardown of a server's pod. Never fails.
    pub async fn delete_server(&self, server_id: &str) {
        let _guard = self.registry.lock(server_id).await;
        self.teardown_locked(server_id, "deleted").await;
    }

    /// Tear down every registered pod, e.g. on shutdown.
    pub async fn delete_all(&self) {
        for pod in self.registry.list() {
            self.delete_server(pod.server_id()).await;
        }
    }

    async fn start_locked(&self, server: &McpServer) -> Result<Arc<PodHandle>, RuntimeError> {
        if !server.is_local() {
            return Err(RuntimeError::InvalidConfig(format!(
                "server {} is {}, only local servers run as pods",
                server.id, server.server_type
            )));
        }
        if self.registry.get(&server.id).is_some() {
            return Err(RuntimeError::AlreadyRunning(server.id.clone()));
        }

        let spec = self.workload_spec(server).await?;

        // A workload left behind by a dead pod or a previous gateway run
        // would collide with the deterministic pod name.
        if let Err(e) = self.backend.delete(&spec.pod_name).await {
            debug!(pod_name = %spec.pod_name, error = %e, "Pre-start cleanup failed");
        }

        info!(
            server_id = %server.id,
            server_name = %server.name,
            pod_name = %spec.pod_name,
            image = %spec.image,
            "Provisioning pod"
        );

        let workload = self.backend.create(&spec).await.map_err(|e| match e {
            RuntimeError::Provision(msg) => RuntimeError::Provision(msg),
            other => RuntimeError::Provision(other.to_string()),
        })?;

        if let Err(e) = self.wait_until_addressable(&spec.pod_name).await {
            warn!(
                server_id = %server.id,
                pod_name = %spec.pod_name,
                error = %e,
                "Pod did not become addressable; tearing it down"
            );
            if let Err(cleanup) = self.backend.delete(&spec.pod_name).await {
                warn!(
                    pod_name = %spec.pod_name,
                    error = %cleanup,
                    "Failed to remove unready workload"
                );
            }
            return Err(e);
        }

        let handle = Arc::new(PodHandle::new(
            &server.id,
            &workload.pod_name,
            &workload.container_name,
            PodStdio::new(workload.stdin, workload.stdout),
        ));
        self.registry.insert(Arc::clone(&handle))?;

        info!(server_id = %server.id, pod_name = %workload.pod_name, "Pod addressable");
        self.emitter
            .emit(AppEvent::mcp_pod_started(&server.id, &workload.pod_name));

        Ok(handle)
    }

    async fn teardown_locked(&self, server_id: &str, reason: &str) {
        let pod_name = match self.registry.remove(server_id) {
            Some(pod) => {
                info!(
                    server_id = %server_id,
                    pod_name = %pod.pod_name(),
                    reason = %reason,
                    "Tearing down pod"
                );
                self.emitter
                    .emit(AppEvent::mcp_pod_stopped(server_id, reason));
                pod.pod_name().to_string()
            }
            None => pod_name_for(server_id),
        };

        if let Err(e) = self.backend.delete(&pod_name).await {
            warn!(
                server_id = %server_id,
                pod_name = %pod_name,
                error = %e,
                "Pod teardown failed; workload may be orphaned"
            );
        }
    }

    async fn wait_until_addressable(&self, pod_name: &str) -> Result<(), RuntimeError> {
        let poll = async {
            loop {
                match self.backend.is_running(pod_name).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(e) => return Err(RuntimeError::Provision(e.to_string())),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(self.provision_timeout, poll)
            .await
            .unwrap_or_else(|_| {
                Err(RuntimeError::Provision(format!(
                    "pod {pod_name} not addressable within {}s",
                    self.provision_timeout.as_secs()
                )))
            })
    }

    async fn workload_spec(&self, server: &McpServer) -> Result<WorkloadSpec, RuntimeError> {
        let catalog_id = server.catalog_id.as_deref().ok_or_else(|| {
            RuntimeError::InvalidConfig(format!("server {} has no catalog entry", server.id))
        })?;
        let entry = self.catalog.find_by_id(catalog_id).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => {
                RuntimeError::InvalidConfig(format!("catalog entry {catalog_id} does not exist"))
            }
            other => RuntimeError::Repository(other),
        })?;
        let workload = entry.workload.ok_or_else(|| {
            RuntimeError::InvalidConfig(format!("catalog entry {catalog_id} has no workload"))
        })?;

        let mut env: BTreeMap<String, String> = workload.env;
        env.extend(server.user_config.clone());
        if let Some(secret_id) = &server.secret_id {
            env.extend(self.secrets.get(secret_id).await?);
        }

        Ok(WorkloadSpec {
            server_id: server.id.clone(),
            pod_name: pod_name_for(&server.id),
            image: workload.image,
            command: workload.command,
            args: workload.args,
            env,
        })
    }
}
