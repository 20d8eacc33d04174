//! Tool discovery.
//!
//! Runs detached after a pod starts: waits a grace period, performs the MCP
//! handshake, lists the pod's tools through the stream bridge and persists
//! them under derived, globally unique names.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mcpod_core::{
    AppEvent, AppEventEmitter, NewToolDefinition, RepositoryError, RuntimeError, RuntimeSettings,
    ToolDefinition, ToolRepository, derive_tool_name,
};
use mcpod_runtime::bridge::{CollectingChannel, JsonRpcEnvelope, JsonRpcResponse, StreamBridge};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

/// MCP protocol revision announced in `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on `tools/list` pages followed via `nextCursor`.
const MAX_TOOL_PAGES: usize = 50;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The bridge could not complete the exchange.
    #[error("bridge error during {step}: {source}")]
    Bridge {
        step: &'static str,
        #[source]
        source: RuntimeError,
    },

    /// The pod answered with something that is not a usable response.
    #[error("protocol error during {step}: {message}")]
    Protocol { step: &'static str, message: String },

    /// The pod answered with a JSON-RPC error.
    #[error("{step} failed with code {code}: {message}")]
    Server {
        step: &'static str,
        code: i64,
        message: String,
    },

    #[error("failed to persist tool {tool}: {source}")]
    Persistence {
        tool: String,
        #[source]
        source: RepositoryError,
    },
}

impl DiscoveryError {
    /// Whether another attempt of the same step could succeed.
    const fn is_retryable(&self) -> bool {
        match self {
            Self::Bridge { source, .. } => !source.is_not_found(),
            Self::Protocol { .. } | Self::Server { .. } => true,
            Self::Persistence { .. } => false,
        }
    }
}

/// What to discover, and for whom.
#[derive(Debug, Clone)]
pub struct DiscoveryJob {
    pub server_id: String,
    pub server_name: String,
    /// Agents that get every discovered tool assigned.
    pub agent_ids: Vec<String>,
}

/// Result of a successful discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub tools: Vec<ToolDefinition>,
    /// Listed tools whose derived name repeated an earlier one in this run.
    pub duplicates: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolsPage {
    tools: Vec<ListedTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Lists a pod's tools through the bridge and stores them.
pub struct DiscoveryWorker {
    bridge: Arc<StreamBridge>,
    tools: Arc<dyn ToolRepository>,
    emitter: Arc<dyn AppEventEmitter>,
    grace: Duration,
    attempts: u32,
    backoff: Duration,
}

impl DiscoveryWorker {
    pub fn new(
        bridge: Arc<StreamBridge>,
        tools: Arc<dyn ToolRepository>,
        emitter: Arc<dyn AppEventEmitter>,
        settings: &RuntimeSettings,
    ) -> Self {
        Self {
            bridge,
            tools,
            emitter,
            grace: settings.discovery_grace(),
            attempts: settings.discovery_attempts.max(1),
            backoff: settings.discovery_backoff(),
        }
    }

    /// Discover and persist the tools of `job.server_id`.
    ///
    /// Tools persisted before a failure are kept.
    pub async fn run(&self, job: &DiscoveryJob) -> Result<DiscoveryReport, DiscoveryError> {
        tokio::time::sleep(self.grace).await;

        let server_id = job.server_id.as_str();
        debug!(server_id = %server_id, "Starting tool discovery");

        let init_params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcpod",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        self.call(
            server_id,
            "initialize",
            JsonRpcEnvelope::request(1, "initialize", Some(init_params)),
        )
        .await?;
        self.call(
            server_id,
            "initialized",
            JsonRpcEnvelope::notification("notifications/initialized", None),
        )
        .await?;

        let listed = self.list_tools(server_id).await?;
        let report = self.persist(job, listed).await?;

        info!(
            server_id = %server_id,
            tool_count = report.tools.len(),
            duplicates = report.duplicates.len(),
            "Tool discovery finished"
        );
        self.emitter
            .emit(AppEvent::mcp_tools_discovered(server_id, report.tools.len()));
        Ok(report)
    }

    async fn list_tools(&self, server_id: &str) -> Result<Vec<ListedTool>, DiscoveryError> {
        let mut listed = Vec::new();
        let mut cursor: Option<String> = None;

        for page_no in 0..MAX_TOOL_PAGES {
            let params = cursor.take().map(|c| json!({ "cursor": c }));
            let id = 2 + page_no;
            let result = self
                .call(
                    server_id,
                    "tools/list",
                    JsonRpcEnvelope::request(id, "tools/list", params),
                )
                .await?;
            let page: ToolsPage =
                serde_json::from_value(result).map_err(|e| DiscoveryError::Protocol {
                    step: "tools/list",
                    message: format!("malformed tools/list result: {e}"),
                })?;

            listed.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(listed),
            }
        }

        warn!(server_id = %server_id, pages = MAX_TOOL_PAGES, "Stopped following tools/list cursors");
        Ok(listed)
    }

    async fn persist(
        &self,
        job: &DiscoveryJob,
        listed: Vec<ListedTool>,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let mut seen = HashSet::new();
        let mut report = DiscoveryReport {
            tools: Vec::with_capacity(listed.len()),
            duplicates: Vec::new(),
        };

        for tool in listed {
            let name = derive_tool_name(&job.server_name, &tool.name);
            if !seen.insert(name.clone()) {
                debug!(
                    server_id = %job.server_id,
                    raw_name = %tool.name,
                    name = %name,
                    "Skipping tool with duplicate derived name"
                );
                report.duplicates.push(tool.name);
                continue;
            }

            let stored = self
                .tools
                .upsert_tool(NewToolDefinition {
                    server_id: job.server_id.clone(),
                    name: name.clone(),
                    raw_name: tool.name,
                    description: tool.description,
                    input_schema: tool.input_schema,
                })
                .await
                .map_err(|source| DiscoveryError::Persistence {
                    tool: name.clone(),
                    source,
                })?;

            for agent_id in &job.agent_ids {
                self.tools
                    .assign_tool_to_agent(agent_id, &stored.id)
                    .await
                    .map_err(|source| DiscoveryError::Persistence {
                        tool: name.clone(),
                        source,
                    })?;
            }
            report.tools.push(stored);
        }

        Ok(report)
    }

    /// One bridge exchange, retried with linear backoff.
    async fn call(
        &self,
        server_id: &str,
        step: &'static str,
        message: JsonRpcEnvelope,
    ) -> Result<Value, DiscoveryError> {
        let mut attempt = 1;
        loop {
            match self.exchange(server_id, step, message.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && e.is_retryable() => {
                    debug!(
                        server_id = %server_id,
                        step = step,
                        attempt = attempt,
                        error = %e,
                        "Discovery step failed; retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn exchange(
        &self,
        server_id: &str,
        step: &'static str,
        message: JsonRpcEnvelope,
    ) -> Result<Value, DiscoveryError> {
        let id = message.id.clone();
        let mut channel = CollectingChannel::new();
        self.bridge
            .proxy(server_id, message, &mut channel)
            .await
            .map_err(|source| DiscoveryError::Bridge { step, source })?;

        // Notifications have nothing to correlate.
        let Some(id) = id else {
            return Ok(Value::Null);
        };

        let frame = channel
            .response_for(&id)
            .cloned()
            .ok_or_else(|| DiscoveryError::Protocol {
                step,
                message: "pod sent no response".to_string(),
            })?;
        let response: JsonRpcResponse =
            serde_json::from_value(frame).map_err(|e| DiscoveryError::Protocol {
                step,
                message: format!("malformed response: {e}"),
            })?;

        if let Some(error) = response.error {
            return Err(DiscoveryError::Server {
                step,
                code: error.code,
                message: error.message,
            });
        }
        response.result.ok_or_else(|| DiscoveryError::Protocol {
            step,
            message: "response has neither result nor error".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpod_core::{CatalogEntry, McpServer, NoopEmitter, Repos};
    use mcpod_runtime::testing::{FakeBackend, FakePod, MemoryRepos};
    use mcpod_runtime::{PodRuntime, WorkloadBackend};

    struct Harness {
        memory: MemoryRepos,
        runtime: PodRuntime,
        worker: DiscoveryWorker,
    }

    async fn harness(pod: FakePod) -> (Harness, McpServer) {
        let memory = MemoryRepos::new([CatalogEntry::local("cat-x", "X", "x-image")]);
        let repos: Repos = memory.repos();
        let settings = RuntimeSettings::fast();
        let backend = Arc::new(FakeBackend::new(pod));
        let runtime = PodRuntime::new(
            &repos,
            backend as Arc<dyn WorkloadBackend>,
            &settings,
            Arc::new(NoopEmitter::new()),
        );
        let worker = DiscoveryWorker::new(
            Arc::clone(&runtime.bridge),
            Arc::clone(&repos.tools),
            Arc::new(NoopEmitter::new()),
            &settings,
        );

        let server = repos
            .servers
            .insert(mcpod_core::NewMcpServer::local("X", "cat-x"))
            .await
            .unwrap();
        runtime.lifecycle.start_server(&server).await.unwrap();

        (
            Harness {
                memory,
                runtime,
                worker,
            },
            server,
        )
    }

    fn job(server: &McpServer, agents: &[&str]) -> DiscoveryJob {
        DiscoveryJob {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            agent_ids: agents.iter().map(ToString::to_string).collect(),
        }
    }

    #[tokio::test]
    async fn test_discovers_and_assigns_tools() {
        let (h, server) = harness(FakePod::default()).await;

        let report = h.worker.run(&job(&server, &["agent-1"])).await.unwrap();

        assert_eq!(report.tools.len(), 1);
        assert_eq!(report.tools[0].name, "x-ping");
        assert_eq!(report.tools[0].raw_name, "ping");
        assert_eq!(
            h.memory.tools.assignments(),
            vec![("agent-1".to_string(), report.tools[0].id.clone())]
        );
    }

    #[tokio::test]
    async fn test_duplicate_derived_names_keep_first() {
        let pod = FakePod {
            tools: vec![
                json!({"name": "Get Data", "description": "first"}),
                json!({"name": "get_data", "description": "second"}),
                json!({"name": "other"}),
            ],
            ..FakePod::default()
        };
        let (h, server) = harness(pod).await;

        let report = h.worker.run(&job(&server, &[])).await.unwrap();

        let names: Vec<_> = report.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["x-get-data", "x-other"]);
        assert_eq!(report.tools[0].description.as_deref(), Some("first"));
        assert_eq!(report.duplicates, vec!["get_data".to_string()]);
    }

    #[tokio::test]
    async fn test_punctuation_only_raw_names_are_kept_apart() {
        let pod = FakePod {
            tools: vec![json!({"name": "!!"}), json!({"name": "??"})],
            ..FakePod::default()
        };
        let (h, server) = harness(pod).await;

        let report = h.worker.run(&job(&server, &[])).await.unwrap();

        let names: Vec<_> = report.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["x-2121", "x-3f3f"]);
        assert!(report.duplicates.is_empty());
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let pod = FakePod {
            tools_list_failures: 2,
            ..FakePod::default()
        };
        let (h, server) = harness(pod).await;

        let report = h.worker.run(&job(&server, &[])).await.unwrap();
        assert_eq!(report.tools.len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let pod = FakePod {
            tools_list_failures: 10,
            ..FakePod::default()
        };
        let (h, server) = harness(pod).await;

        let err = h.worker.run(&job(&server, &[])).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Server { code: -32000, .. }));
        assert!(h.memory.tools.all().is_empty());
    }

    #[tokio::test]
    async fn test_missing_pod_is_not_retried() {
        let (h, server) = harness(FakePod::default()).await;
        h.runtime.lifecycle.delete_server(&server.id).await;

        let err = h.worker.run(&job(&server, &[])).await.unwrap_err();
        match err {
            DiscoveryError::Bridge { step, source } => {
                assert_eq!(step, "initialize");
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
