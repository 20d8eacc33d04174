//! In-memory registry of live pods.
//!
//! The registry is the only owner of [`PodHandle`]s. Everything else clones
//! the `Arc` for the duration of one operation and drops it afterwards. It is
//! never persisted; `McpService::initialize` rebuilds it at startup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mcpod_core::RuntimeError;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, OwnedMutexGuard};

/// Write side of a pod's stdio.
pub type PodWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Read side of a pod's stdio.
pub type PodReader = Box<dyn AsyncRead + Send + Unpin>;

/// The duplex byte stream to a pod's process.
///
/// Only reachable through [`PodHandle::lock_stdio`], which makes stdio a
/// single-writer, single-reader resource.
pub struct PodStdio {
    pub writer: PodWriter,
    pub reader: BufReader<PodReader>,
}

impl PodStdio {
    pub fn new(writer: PodWriter, reader: PodReader) -> Self {
        Self {
            writer,
            reader: BufReader::new(reader),
        }
    }
}

/// One running container instance for one server.
pub struct PodHandle {
    server_id: String,
    pod_name: String,
    container_name: String,
    stdio: AsyncMutex<PodStdio>,
    sequence: AtomicU64,
    started_at: DateTime<Utc>,
    last_healthy: Mutex<DateTime<Utc>>,
}

impl PodHandle {
    pub fn new(
        server_id: impl Into<String>,
        pod_name: impl Into<String>,
        container_name: impl Into<String>,
        stdio: PodStdio,
    ) -> Self {
        let now = Utc::now();
        Self {
            server_id: server_id.into(),
            pod_name: pod_name.into(),
            container_name: container_name.into(),
            stdio: AsyncMutex::new(stdio),
            sequence: AtomicU64::new(0),
            started_at: now,
            last_healthy: Mutex::new(now),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Next request id for this pod. Starts at 1 and never repeats.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Exclusive access to the pod's stdio for one exchange.
    pub async fn lock_stdio(&self) -> MutexGuard<'_, PodStdio> {
        self.stdio.lock().await
    }

    pub fn last_healthy(&self) -> DateTime<Utc> {
        *self
            .last_healthy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_healthy(&self) {
        *self
            .last_healthy
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }
}

impl std::fmt::Debug for PodHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodHandle")
            .field("server_id", &self.server_id)
            .field("pod_name", &self.pod_name)
            .field("container_name", &self.container_name)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

/// Mapping from server id to its live pod.
///
/// Creation, restart and delete for one server id are serialized through
/// [`PodRegistry::lock`]; unrelated ids never contend.
#[async_trait]
pub trait PodRegistry: Send + Sync {
    /// Acquire the lifecycle lock of one server id.
    async fn lock(&self, server_id: &str) -> OwnedMutexGuard<()>;

    fn get(&self, server_id: &str) -> Option<Arc<PodHandle>>;

    /// Register a pod.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if the server already has a pod
    fn insert(&self, handle: Arc<PodHandle>) -> Result<(), RuntimeError>;

    fn remove(&self, server_id: &str) -> Option<Arc<PodHandle>>;

    /// Remove `handle` only if it is still the registered pod of its server.
    ///
    /// Used when a pod is detected dead outside the lifecycle lock, so that a
    /// replacement registered in the meantime survives.
    fn evict(&self, handle: &Arc<PodHandle>) -> bool;

    fn list(&self) -> Vec<Arc<PodHandle>>;
}

/// Default [`PodRegistry`]: a map guarded by a lock, plus per-id async locks.
#[derive(Default)]
pub struct InMemoryPodRegistry {
    pods: RwLock<HashMap<String, Arc<PodHandle>>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InMemoryPodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, server_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(server_id.to_string()).or_default())
    }
}

#[async_trait]
impl PodRegistry for InMemoryPodRegistry {
    async fn lock(&self, server_id: &str) -> OwnedMutexGuard<()> {
        self.lock_for(server_id).lock_owned().await
    }

    fn get(&self, server_id: &str) -> Option<Arc<PodHandle>> {
        self.pods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(server_id)
            .cloned()
    }

    fn insert(&self, handle: Arc<PodHandle>) -> Result<(), RuntimeError> {
        let mut pods = self.pods.write().unwrap_or_else(PoisonError::into_inner);
        if pods.contains_key(handle.server_id()) {
            return Err(RuntimeError::AlreadyRunning(handle.server_id().to_string()));
        }
        pods.insert(handle.server_id().to_string(), handle);
        Ok(())
    }

    fn remove(&self, server_id: &str) -> Option<Arc<PodHandle>> {
        self.pods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id)
    }

    fn evict(&self, handle: &Arc<PodHandle>) -> bool {
        let mut pods = self.pods.write().unwrap_or_else(PoisonError::into_inner);
        match pods.get(handle.server_id()) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                pods.remove(handle.server_id());
                true
            }
            _ => false,
        }
    }

    fn list(&self) -> Vec<Arc<PodHandle>> {
        self.pods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn handle(server_id: &str) -> Arc<PodHandle> {
        let (ours, _theirs) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(ours);
        Arc::new(PodHandle::new(
            server_id,
            format!("mcpod-{server_id}"),
            "mcp-server",
            PodStdio::new(Box::new(writer), Box::new(reader)),
        ))
    }

    #[tokio::test]
    async fn test_insert_rejects_second_pod() {
        let registry = InMemoryPodRegistry::new();
        registry.insert(handle("a")).unwrap();

        let err = registry.insert(handle("a")).unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyRunning(id) if id == "a"));
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn test_evict_ignores_replaced_handle() {
        let registry = InMemoryPodRegistry::new();
        let old = handle("a");
        registry.insert(Arc::clone(&old)).unwrap();
        registry.remove("a");
        let new = handle("a");
        registry.insert(Arc::clone(&new)).unwrap();

        assert!(!registry.evict(&old));
        assert!(registry.get("a").is_some_and(|h| Arc::ptr_eq(&h, &new)));
        assert!(registry.evict(&new));
        assert!(registry.get("a").is_none());
    }

    #[tokio::test]
    async fn test_sequence_is_monotonic() {
        let pod = handle("a");
        assert_eq!(pod.next_sequence(), 1);
        assert_eq!(pod.next_sequence(), 2);
        assert_eq!(pod.next_sequence(), 3);
    }

    #[tokio::test]
    async fn test_locks_are_per_server() {
        let registry = Arc::new(InMemoryPodRegistry::new());
        let _a = registry.lock("a").await;

        // A different id is not blocked.
        tokio::time::timeout(Duration::from_millis(100), registry.lock("b"))
            .await
            .expect("lock for b should not wait on a");

        // The same id is.
        let blocked = tokio::time::timeout(Duration::from_millis(50), registry.lock("a")).await;
        assert!(blocked.is_err());
    }
}
