//! Pod liveness monitoring.
//!
//! Periodically asks the backend whether each registered pod is still
//! running. Live pods get their last-healthy timestamp refreshed; dead pods
//! are evicted from the registry and their workload removed.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use mcpod_core::{AppEvent, AppEventEmitter};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::WorkloadBackend;
use crate::registry::PodRegistry;

/// A pod found dead and evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadPod {
    pub server_id: String,
    pub pod_name: String,
}

/// Sweeps the registry for dead pods.
#[derive(Clone)]
pub struct PodHealthMonitor {
    registry: Arc<dyn PodRegistry>,
    backend: Arc<dyn WorkloadBackend>,
    emitter: Arc<dyn AppEventEmitter>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl PodHealthMonitor {
    pub fn new(
        registry: Arc<dyn PodRegistry>,
        backend: Arc<dyn WorkloadBackend>,
        emitter: Arc<dyn AppEventEmitter>,
        check_interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            backend,
            emitter,
            interval: check_interval,
            cancel_token,
        }
    }

    /// Check every registered pod once and evict the dead ones.
    pub async fn sweep(&self) -> Vec<DeadPod> {
        let mut dead = Vec::new();

        for pod in self.registry.list() {
            match self.backend.is_running(pod.pod_name()).await {
                Ok(true) => pod.mark_healthy(),
                Ok(false) => {
                    // Under the lifecycle lock so a concurrent restart's new
                    // workload (same pod name) is never removed.
                    let _guard = self.registry.lock(pod.server_id()).await;
                    if !self.registry.evict(&pod) {
                        continue;
                    }
                    warn!(
                        server_id = %pod.server_id(),
                        pod_name = %pod.pod_name(),
                        last_healthy = %pod.last_healthy(),
                        "Pod failed health check; evicted"
                    );
                    if let Err(e) = self.backend.delete(pod.pod_name()).await {
                        warn!(
                            pod_name = %pod.pod_name(),
                            error = %e,
                            "Failed to remove dead workload"
                        );
                    }
                    self.emitter.emit(AppEvent::mcp_pod_stopped(
                        pod.server_id(),
                        "health check failed",
                    ));
                    dead.push(DeadPod {
                        server_id: pod.server_id().to_string(),
                        pod_name: pod.pod_name().to_string(),
                    });
                }
                Err(e) => {
                    debug!(pod_name = %pod.pod_name(), error = %e, "Health check inconclusive");
                }
            }
        }

        dead
    }

    /// Stream of evicted pods, one sweep per interval.
    ///
    /// Completes when the cancellation token is triggered.
    pub fn monitor(self) -> impl Stream<Item = DeadPod> {
        stream! {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            debug!(interval_secs = self.interval.as_secs(), "Starting pod health monitor");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for dead in self.sweep().await {
                            yield dead;
                        }
                    }
                    () = self.cancel_token.cancelled() => {
                        debug!("Pod health monitor cancelled");
                        break;
                    }
                }
            }
        }
    }

    /// Run the monitor in the background until cancelled.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let stream = self.monitor();
            futures_util::pin_mut!(stream);
            while let Some(dead) = stream.next().await {
                debug!(server_id = %dead.server_id, "Health monitor reported dead pod");
            }
        })
    }
}
