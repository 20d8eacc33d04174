//! Workloads as local processes: `docker run -i` containers or plain children.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use mcpod_core::RuntimeError;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::logs::{LogBuffer, spawn_log_reader};
use super::shutdown::shutdown_child;
use super::{Workload, WorkloadBackend, WorkloadSpec};

/// How a workload process is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
    /// `docker run -i --rm` with the catalog image; stdio is attached.
    Docker {
        /// Path or name of the docker CLI.
        binary: String,
    },
    /// Run `command` (or the image string as a program) directly.
    /// Intended for development and tests.
    Direct,
}

impl Default for Launcher {
    fn default() -> Self {
        Self::Docker {
            binary: "docker".to_string(),
        }
    }
}

struct ManagedWorkload {
    child: Child,
    logs: Arc<LogBuffer>,
}

/// [`WorkloadBackend`] running each pod as a local process.
pub struct ProcessBackend {
    launcher: Launcher,
    workloads: Mutex<HashMap<String, ManagedWorkload>>,
}

impl ProcessBackend {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            workloads: Mutex::new(HashMap::new()),
        }
    }

    pub const fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    fn build_command(&self, spec: &WorkloadSpec) -> (Command, String) {
        match &self.launcher {
            Launcher::Docker { binary } => {
                let mut cmd = Command::new(binary);
                cmd.args(["run", "-i", "--rm", "--name", spec.pod_name.as_str()]);
                cmd.arg("--label")
                    .arg(format!("mcpod.server-id={}", spec.server_id));
                // Values travel in the client's environment, never on argv
                for (key, value) in &spec.env {
                    cmd.arg("-e").arg(key).env(key, value);
                }
                if let Some(entrypoint) = &spec.command {
                    cmd.arg("--entrypoint").arg(entrypoint);
                }
                cmd.arg(&spec.image).args(&spec.args);
                (cmd, spec.pod_name.clone())
            }
            Launcher::Direct => {
                let program = spec.command.as_deref().unwrap_or(&spec.image);
                let mut cmd = Command::new(program);
                cmd.args(&spec.args).envs(&spec.env);
                let container_name = std::path::Path::new(program)
                    .file_name()
                    .map_or_else(|| program.to_string(), |n| n.to_string_lossy().into_owned());
                (cmd, container_name)
            }
        }
    }

    async fn docker_reports_running(binary: &str, pod_name: &str) -> Result<bool, RuntimeError> {
        let output = Command::new(binary)
            .args(["inspect", "-f", "{{.State.Running}}", pod_name])
            .output()
            .await
            .map_err(|e| RuntimeError::Backend(format!("failed to run {binary} inspect: {e}")))?;

        // Non-zero exit: the container does not exist (yet).
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }
}

#[async_trait]
impl WorkloadBackend for ProcessBackend {
    async fn create(&self, spec: &WorkloadSpec) -> Result<Workload, RuntimeError> {
        let mut workloads = self.workloads.lock().await;
        if workloads.contains_key(&spec.pod_name) {
            return Err(RuntimeError::Provision(format!(
                "workload {} already exists",
                spec.pod_name
            )));
        }

        let (mut cmd, container_name) = self.build_command(spec);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            RuntimeError::Provision(format!("failed to launch {}: {e}", spec.pod_name))
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(RuntimeError::Provision(format!(
                "stdio of {} was not captured",
                spec.pod_name
            )));
        };

        let logs = Arc::new(LogBuffer::new());
        spawn_log_reader(stderr, spec.pod_name.clone(), Arc::clone(&logs));

        info!(
            pod_name = %spec.pod_name,
            pid = ?child.id(),
            launcher = ?self.launcher,
            "Workload process launched"
        );

        workloads.insert(spec.pod_name.clone(), ManagedWorkload { child, logs });

        Ok(Workload {
            pod_name: spec.pod_name.clone(),
            container_name,
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
        })
    }

    async fn is_running(&self, pod_name: &str) -> Result<bool, RuntimeError> {
        {
            let mut workloads = self.workloads.lock().await;
            let Some(workload) = workloads.get_mut(pod_name) else {
                return Ok(false);
            };
            let exited = workload
                .child
                .try_wait()
                .map_err(|e| RuntimeError::Backend(e.to_string()))?;
            if let Some(status) = exited {
                debug!(pod_name = %pod_name, %status, "Workload process has exited");
                return Ok(false);
            }
        }

        match &self.launcher {
            Launcher::Docker { binary } => Self::docker_reports_running(binary, pod_name).await,
            Launcher::Direct => Ok(true),
        }
    }

    async fn logs(&self, pod_name: &str, lines: usize) -> Result<String, RuntimeError> {
        let workloads = self.workloads.lock().await;
        workloads
            .get(pod_name)
            .map(|w| w.logs.tail(lines))
            .ok_or_else(|| RuntimeError::NotFound(format!("no container for {pod_name}")))
    }

    async fn delete(&self, pod_name: &str) -> Result<(), RuntimeError> {
        let removed = self.workloads.lock().await.remove(pod_name);

        let mut result = Ok(());
        if let Launcher::Docker { binary } = &self.launcher {
            match Command::new(binary)
                .args(["rm", "-f", pod_name])
                .output()
                .await
            {
                // Already gone is the common case after `--rm`.
                Ok(output) if !output.status.success() => debug!(
                    pod_name = %pod_name,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "docker rm reported failure"
                ),
                Ok(_) => {}
                Err(e) => {
                    result = Err(RuntimeError::Backend(format!(
                        "failed to run {binary} rm: {e}"
                    )));
                }
            }
        }

        if let Some(workload) = removed {
            match shutdown_child(workload.child).await {
                Ok(status) => debug!(pod_name = %pod_name, %status, "Workload process reaped"),
                Err(e) => {
                    warn!(pod_name = %pod_name, error = %e, "Failed to stop workload process");
                    result = Err(RuntimeError::Backend(e.to_string()));
                }
            }
        }

        result
    }
}
