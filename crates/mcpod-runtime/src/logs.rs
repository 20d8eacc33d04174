//! Recent container output for diagnostics.

use std::sync::Arc;

use mcpod_core::{PodLogs, RuntimeError};

use crate::backend::WorkloadBackend;
use crate::registry::PodRegistry;

/// Fetches the tail of a running pod's primary container output.
pub struct LogRetriever {
    registry: Arc<dyn PodRegistry>,
    backend: Arc<dyn WorkloadBackend>,
}

impl LogRetriever {
    pub fn new(registry: Arc<dyn PodRegistry>, backend: Arc<dyn WorkloadBackend>) -> Self {
        Self { registry, backend }
    }

    /// The last `line_count` lines of output.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no pod is registered for the server, or the backend
    ///   lost its container
    /// - `Backend` if the output cannot be read
    pub async fn get_logs(
        &self,
        server_id: &str,
        line_count: usize,
    ) -> Result<PodLogs, RuntimeError> {
        let pod = self
            .registry
            .get(server_id)
            .ok_or_else(|| RuntimeError::pod_not_found(server_id))?;

        let logs = self.backend.logs(pod.pod_name(), line_count).await?;

        Ok(PodLogs {
            logs,
            container_name: pod.container_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InMemoryPodRegistry, PodHandle, PodStdio};
    use crate::testing::{FakeBackend, FakePod};
    use crate::backend::{WorkloadSpec, pod_name_for};

    #[tokio::test]
    async fn test_logs_of_registered_pod() {
        let registry = Arc::new(InMemoryPodRegistry::new());
        let backend = Arc::new(FakeBackend::new(FakePod::default()));
        let spec = WorkloadSpec {
            server_id: "s1".into(),
            pod_name: pod_name_for("s1"),
            image: "echo-mcp".into(),
            command: None,
            args: Vec::new(),
            env: Default::default(),
        };
        let workload = backend.create(&spec).await.unwrap();
        registry
            .insert(Arc::new(PodHandle::new(
                "s1",
                workload.pod_name,
                workload.container_name,
                PodStdio::new(workload.stdin, workload.stdout),
            )))
            .unwrap();
        let retriever = LogRetriever::new(registry, backend);

        let logs = retriever.get_logs("s1", 2).await.unwrap();

        assert_eq!(logs.container_name, "mcp-server");
        assert_eq!(logs.logs, "listening on stdio\nready");
    }

    #[tokio::test]
    async fn test_logs_without_pod_is_not_found() {
        let retriever = LogRetriever::new(
            Arc::new(InMemoryPodRegistry::new()),
            Arc::new(FakeBackend::new(FakePod::default())),
        );

        let err = retriever.get_logs("missing", 10).await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound(_)));
    }
}
