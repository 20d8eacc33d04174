//! Wiring of the runtime components around one registry and backend.

use std::sync::Arc;

use mcpod_core::{AppEventEmitter, Repos, RuntimeSettings};
use tokio_util::sync::CancellationToken;

use crate::backend::WorkloadBackend;
use crate::bridge::StreamBridge;
use crate::health_monitor::PodHealthMonitor;
use crate::lifecycle::LifecycleController;
use crate::logs::LogRetriever;
use crate::registry::{InMemoryPodRegistry, PodHandle, PodRegistry};

/// The pod runtime: registry, lifecycle controller, bridge and log retriever
/// sharing one registry and one backend.
#[derive(Clone)]
pub struct PodRuntime {
    pub registry: Arc<dyn PodRegistry>,
    pub backend: Arc<dyn WorkloadBackend>,
    pub lifecycle: Arc<LifecycleController>,
    pub bridge: Arc<StreamBridge>,
    pub logs: Arc<LogRetriever>,
}

impl PodRuntime {
    /// Build a runtime with an empty in-memory registry.
    pub fn new(
        repos: &Repos,
        backend: Arc<dyn WorkloadBackend>,
        settings: &RuntimeSettings,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        let registry: Arc<dyn PodRegistry> = Arc::new(InMemoryPodRegistry::new());
        Self::with_registry(repos, registry, backend, settings, emitter)
    }

    pub fn with_registry(
        repos: &Repos,
        registry: Arc<dyn PodRegistry>,
        backend: Arc<dyn WorkloadBackend>,
        settings: &RuntimeSettings,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        let lifecycle = Arc::new(LifecycleController::new(
            Arc::clone(&registry),
            Arc::clone(&backend),
            Arc::clone(&repos.servers),
            Arc::clone(&repos.catalog),
            Arc::clone(&repos.secrets),
            emitter,
            settings.provision_timeout(),
        ));
        let bridge = Arc::new(StreamBridge::new(
            Arc::clone(&registry),
            settings.proxy_idle_timeout(),
            settings.notification_idle(),
        ));
        let logs = Arc::new(LogRetriever::new(Arc::clone(&registry), Arc::clone(&backend)));

        Self {
            registry,
            backend,
            lifecycle,
            bridge,
            logs,
        }
    }

    /// The live pod of a server, if any.
    pub fn get_pod(&self, server_id: &str) -> Option<Arc<PodHandle>> {
        self.registry.get(server_id)
    }

    /// A health monitor over this runtime's pods.
    pub fn health_monitor(
        &self,
        settings: &RuntimeSettings,
        emitter: Arc<dyn AppEventEmitter>,
        cancel_token: CancellationToken,
    ) -> PodHealthMonitor {
        PodHealthMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.backend),
            emitter,
            settings.health_interval(),
            cancel_token,
        )
    }
}
