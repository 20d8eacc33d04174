//! Workload backends: where pods actually run.
//!
//! The lifecycle controller only talks to [`WorkloadBackend`]. The shipped
//! implementation is [`ProcessBackend`], which runs each server either as a
//! `docker run -i` container or as a plain child process.

mod logs;
mod process;
mod shutdown;

use std::collections::BTreeMap;

use async_trait::async_trait;
use mcpod_core::RuntimeError;

use crate::registry::{PodReader, PodWriter};

pub use logs::{LogBuffer, MAX_LOG_LINES};
pub use process::{Launcher, ProcessBackend};
pub use shutdown::shutdown_child;

/// Deterministic pod name of a server.
///
/// Derived from the id alone so that a leftover workload can be cleaned up
/// without the server record.
pub fn pod_name_for(server_id: &str) -> String {
    format!("mcpod-{server_id}")
}

/// Everything a backend needs to create one workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub server_id: String,
    pub pod_name: String,
    pub image: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// A freshly created workload with its stdio attached.
pub struct Workload {
    pub pod_name: String,
    /// Name of the primary container, reported alongside its logs.
    pub container_name: String,
    pub stdin: PodWriter,
    pub stdout: PodReader,
}

/// Creates, inspects and removes workloads.
#[async_trait]
pub trait WorkloadBackend: Send + Sync {
    /// Schedule a workload and attach to its stdio.
    ///
    /// # Errors
    ///
    /// - `Provision` if the workload cannot be created
    async fn create(&self, spec: &WorkloadSpec) -> Result<Workload, RuntimeError>;

    /// Whether the workload is running and addressable.
    ///
    /// `Ok(false)` while it is still starting or after it died.
    async fn is_running(&self, pod_name: &str) -> Result<bool, RuntimeError>;

    /// Last `lines` lines of the primary container's output.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the backend knows no such workload
    /// - `Backend` if the output cannot be read
    async fn logs(&self, pod_name: &str, lines: usize) -> Result<String, RuntimeError>;

    /// Remove the workload. Removing an unknown workload succeeds.
    async fn delete(&self, pod_name: &str) -> Result<(), RuntimeError>;
}
