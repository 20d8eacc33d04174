//! In-memory ports and a scripted fake pod backend.
//!
//! Available to this crate's tests and, through the `test-utils` feature, to
//! downstream crates.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use mcpod_core::{
    CatalogEntry, CatalogRepository, LocalInstallationStatus, McpServer, McpServerRepository,
    NewMcpServer, NewToolDefinition, RepositoryError, Repos, RuntimeError, SecretStore,
    ToolDefinition, ToolRepository,
};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

use crate::backend::{Workload, WorkloadBackend, WorkloadSpec};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Fake pods
// =============================================================================

/// Behavior of the MCP server inside every pod a [`FakeBackend`] creates.
///
/// Methods understood by the fake server:
///
/// | method          | reply |
/// |-----------------|-------|
/// | `initialize`    | protocol handshake result |
/// | `tools/list`    | `{"tools": tools}` |
/// | `echo`          | `params` as result |
/// | `progress`      | a `notifications/progress` frame, then `{}` |
/// | `stale`         | a response with a foreign id, then `{}` |
/// | `hang`          | nothing |
/// | `crash`         | closes stdout |
/// | `notifications/*` | nothing |
/// | anything else   | JSON-RPC error `-32601` |
#[derive(Debug, Clone)]
pub struct FakePod {
    pub tools: Vec<Value>,
    /// Non-JSON line printed before serving, like a startup banner.
    pub banner: Option<String>,
    /// Whether created workloads ever report running.
    pub becomes_ready: bool,
    /// Whether `create` itself fails.
    pub fail_create: bool,
    /// Number of `tools/list` calls to answer with an error before succeeding.
    pub tools_list_failures: usize,
}

impl Default for FakePod {
    fn default() -> Self {
        Self {
            tools: vec![json!({"name": "ping", "description": "Replies with pong"})],
            banner: Some("fake-mcp starting up".to_string()),
            becomes_ready: true,
            fail_create: false,
            tools_list_failures: 0,
        }
    }
}

struct FakeWorkload {
    task: JoinHandle<()>,
}

/// A [`WorkloadBackend`] whose pods are in-process tasks on duplex pipes.
#[derive(Default)]
pub struct FakeBackend {
    pod: Mutex<FakePod>,
    workloads: Mutex<HashMap<String, FakeWorkload>>,
    received: Arc<Mutex<Vec<Value>>>,
    tools_list_calls: Arc<AtomicUsize>,
    created: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new(pod: FakePod) -> Self {
        Self {
            pod: Mutex::new(pod),
            ..Self::default()
        }
    }

    pub fn set_pod(&self, pod: FakePod) {
        *lock(&self.pod) = pod;
    }

    /// Number of successful `create` calls.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Pod names passed to `delete`, in order.
    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    /// Every frame the fake pods received, across all pods.
    pub fn received(&self) -> Vec<Value> {
        lock(&self.received).clone()
    }

    /// Workloads currently alive.
    pub fn live(&self) -> usize {
        lock(&self.workloads)
            .values()
            .filter(|w| !w.task.is_finished())
            .count()
    }

    /// Kill a pod's process without telling the registry.
    pub fn crash(&self, pod_name: &str) {
        if let Some(workload) = lock(&self.workloads).get(pod_name) {
            workload.task.abort();
        }
    }
}

#[async_trait]
impl WorkloadBackend for FakeBackend {
    async fn create(&self, spec: &WorkloadSpec) -> Result<Workload, RuntimeError> {
        let pod = lock(&self.pod).clone();
        if pod.fail_create {
            return Err(RuntimeError::Provision(format!(
                "cannot schedule {}",
                spec.pod_name
            )));
        }

        let mut workloads = lock(&self.workloads);
        if workloads.contains_key(&spec.pod_name) {
            return Err(RuntimeError::Provision(format!(
                "workload {} already exists",
                spec.pod_name
            )));
        }

        let (gateway_end, pod_end) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(serve_fake_pod(
            pod_end,
            pod,
            Arc::clone(&self.received),
            Arc::clone(&self.tools_list_calls),
        ));
        workloads.insert(spec.pod_name.clone(), FakeWorkload { task });
        self.created.fetch_add(1, Ordering::SeqCst);

        let (reader, writer) = tokio::io::split(gateway_end);
        Ok(Workload {
            pod_name: spec.pod_name.clone(),
            container_name: "mcp-server".to_string(),
            stdin: Box::new(writer),
            stdout: Box::new(reader),
        })
    }

    async fn is_running(&self, pod_name: &str) -> Result<bool, RuntimeError> {
        let ready = lock(&self.pod).becomes_ready;
        Ok(ready
            && lock(&self.workloads)
                .get(pod_name)
                .is_some_and(|w| !w.task.is_finished()))
    }

    async fn logs(&self, pod_name: &str, lines: usize) -> Result<String, RuntimeError> {
        if !lock(&self.workloads).contains_key(pod_name) {
            return Err(RuntimeError::NotFound(format!("no container for {pod_name}")));
        }
        let all = ["fake-mcp starting up", "listening on stdio", "ready"];
        let skip = all.len().saturating_sub(lines);
        Ok(all[skip..].join("\n"))
    }

    async fn delete(&self, pod_name: &str) -> Result<(), RuntimeError> {
        if let Some(workload) = lock(&self.workloads).remove(pod_name) {
            workload.task.abort();
        }
        lock(&self.deleted).push(pod_name.to_string());
        Ok(())
    }
}

async fn serve_fake_pod(
    stream: DuplexStream,
    pod: FakePod,
    received: Arc<Mutex<Vec<Value>>>,
    tools_list_calls: Arc<AtomicUsize>,
) {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    if let Some(banner) = &pod.banner {
        if writer
            .write_all(format!("{banner}\n").as_bytes())
            .await
            .is_err()
        {
            return;
        }
    }

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(request) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        lock(&received).push(request.clone());

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut replies = Vec::new();
        match method {
            "initialize" => replies.push(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake-mcp", "version": "1.0.0"}
                }
            })),
            "tools/list" => {
                let call = tools_list_calls.fetch_add(1, Ordering::SeqCst);
                if call < pod.tools_list_failures {
                    replies.push(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32000, "message": "still warming up"}
                    }));
                } else {
                    replies.push(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {"tools": pod.tools}
                    }));
                }
            }
            "echo" => replies.push(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": request.get("params").cloned().unwrap_or(Value::Null)
            })),
            "progress" => {
                replies.push(json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/progress",
                    "params": {"progress": 50}
                }));
                replies.push(json!({"jsonrpc": "2.0", "id": id, "result": {}}));
            }
            "stale" => {
                replies.push(json!({"jsonrpc": "2.0", "id": 999_999, "result": {"stale": true}}));
                replies.push(json!({"jsonrpc": "2.0", "id": id, "result": {}}));
            }
            "hang" => {}
            "crash" => return,
            m if m.starts_with("notifications/") => {}
            _ => replies.push(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("Method not found: {method}")}
            })),
        }

        for reply in replies {
            let mut frame = reply.to_string();
            frame.push('\n');
            if writer.write_all(frame.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

// =============================================================================
// In-memory ports
// =============================================================================

/// [`McpServerRepository`] over a map.
#[derive(Default)]
pub struct MemoryServerRepository {
    servers: Mutex<Vec<McpServer>>,
    tools: Option<Arc<MemoryToolRepository>>,
}

impl MemoryServerRepository {
    /// Repository whose `delete` also drops the server's tools from `tools`.
    pub fn with_tools(tools: Arc<MemoryToolRepository>) -> Self {
        Self {
            servers: Mutex::new(Vec::new()),
            tools: Some(tools),
        }
    }

    /// Overwrite a stored record, e.g. to backdate `updated_at`.
    pub fn put(&self, server: McpServer) {
        let mut servers = lock(&self.servers);
        servers.retain(|s| s.id != server.id);
        servers.push(server);
    }
}

#[async_trait]
impl McpServerRepository for MemoryServerRepository {
    async fn insert(&self, server: NewMcpServer) -> Result<McpServer, RepositoryError> {
        let mut servers = lock(&self.servers);
        if servers.iter().any(|s| s.name == server.name) {
            return Err(RepositoryError::Conflict(server.name));
        }
        let server = server.into_server(Utc::now());
        servers.push(server.clone());
        Ok(server)
    }

    async fn get(&self, id: &str) -> Result<McpServer, RepositoryError> {
        lock(&self.servers)
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<McpServer>, RepositoryError> {
        Ok(lock(&self.servers).clone())
    }

    async fn set_installation_status(
        &self,
        id: &str,
        status: LocalInstallationStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut servers = lock(&self.servers);
        let server = servers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        server.local_installation_status = status;
        server.local_installation_error = error.map(str::to_string);
        server.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let mut servers = lock(&self.servers);
        let before = servers.len();
        servers.retain(|s| s.id != id);
        if servers.len() == before {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        if let Some(tools) = &self.tools {
            tools.remove_server(id);
        }
        Ok(())
    }
}

/// [`CatalogRepository`] over a map.
#[derive(Default)]
pub struct MemoryCatalog {
    entries: Mutex<BTreeMap<String, CatalogEntry>>,
}

impl MemoryCatalog {
    pub fn with_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().map(|e| (e.id.clone(), e)).collect()),
        }
    }
}

#[async_trait]
impl CatalogRepository for MemoryCatalog {
    async fn find_by_id(&self, id: &str) -> Result<CatalogEntry, RepositoryError> {
        lock(&self.entries)
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("catalog entry {id}")))
    }

    async fn list(&self) -> Result<Vec<CatalogEntry>, RepositoryError> {
        Ok(lock(&self.entries).values().cloned().collect())
    }

    async fn upsert(&self, entry: &CatalogEntry) -> Result<(), RepositoryError> {
        lock(&self.entries).insert(entry.id.clone(), entry.clone());
        Ok(())
    }
}

/// [`SecretStore`] over a map.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, BTreeMap<String, String>>>,
    next: AtomicUsize,
}

impl MemorySecretStore {
    pub fn contains(&self, id: &str) -> bool {
        lock(&self.secrets).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.secrets).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn create(&self, values: BTreeMap<String, String>) -> Result<String, RepositoryError> {
        let id = format!("secret-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.secrets).insert(id.clone(), values);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<BTreeMap<String, String>, RepositoryError> {
        lock(&self.secrets)
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("secret {id}")))
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        lock(&self.secrets)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("secret {id}")))
    }
}

/// [`ToolRepository`] over vectors.
#[derive(Default)]
pub struct MemoryToolRepository {
    tools: Mutex<Vec<ToolDefinition>>,
    assignments: Mutex<Vec<(String, String)>>,
}

impl MemoryToolRepository {
    pub fn all(&self) -> Vec<ToolDefinition> {
        lock(&self.tools).clone()
    }

    pub fn assignments(&self) -> Vec<(String, String)> {
        lock(&self.assignments).clone()
    }

    fn remove_server(&self, server_id: &str) {
        let mut tools = lock(&self.tools);
        let removed: Vec<String> = tools
            .iter()
            .filter(|t| t.server_id == server_id)
            .map(|t| t.id.clone())
            .collect();
        tools.retain(|t| t.server_id != server_id);
        lock(&self.assignments).retain(|(_, tool_id)| !removed.contains(tool_id));
    }
}

#[async_trait]
impl ToolRepository for MemoryToolRepository {
    async fn upsert_tool(&self, tool: NewToolDefinition) -> Result<ToolDefinition, RepositoryError> {
        let mut tools = lock(&self.tools);
        if let Some(existing) = tools.iter_mut().find(|t| t.name == tool.name) {
            if existing.server_id != tool.server_id {
                return Err(RepositoryError::Conflict(tool.name));
            }
            existing.raw_name = tool.raw_name;
            existing.description = tool.description;
            existing.input_schema = tool.input_schema;
            return Ok(existing.clone());
        }

        let stored = ToolDefinition {
            id: format!("tool-{}", tools.len() + 1),
            server_id: tool.server_id,
            name: tool.name,
            raw_name: tool.raw_name,
            description: tool.description,
            input_schema: tool.input_schema,
            created_at: Utc::now(),
        };
        tools.push(stored.clone());
        Ok(stored)
    }

    async fn list_for_server(
        &self,
        server_id: &str,
    ) -> Result<Vec<ToolDefinition>, RepositoryError> {
        let mut tools: Vec<_> = lock(&self.tools)
            .iter()
            .filter(|t| t.server_id == server_id)
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    async fn assign_tool_to_agent(
        &self,
        agent_id: &str,
        tool_id: &str,
    ) -> Result<(), RepositoryError> {
        if !lock(&self.tools).iter().any(|t| t.id == tool_id) {
            return Err(RepositoryError::NotFound(format!("tool {tool_id}")));
        }
        let mut assignments = lock(&self.assignments);
        let pair = (agent_id.to_string(), tool_id.to_string());
        if !assignments.contains(&pair) {
            assignments.push(pair);
        }
        Ok(())
    }

    async fn list_agent_tools(&self, agent_id: &str) -> Result<Vec<String>, RepositoryError> {
        Ok(lock(&self.assignments)
            .iter()
            .filter(|(agent, _)| agent == agent_id)
            .map(|(_, tool)| tool.clone())
            .collect())
    }
}

/// Concrete handles to the in-memory ports behind a [`Repos`].
#[derive(Clone)]
pub struct MemoryRepos {
    pub servers: Arc<MemoryServerRepository>,
    pub catalog: Arc<MemoryCatalog>,
    pub tools: Arc<MemoryToolRepository>,
    pub secrets: Arc<MemorySecretStore>,
}

impl MemoryRepos {
    /// Empty stores plus the given catalog entries.
    pub fn new(catalog: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let tools = Arc::new(MemoryToolRepository::default());
        Self {
            servers: Arc::new(MemoryServerRepository::with_tools(Arc::clone(&tools))),
            catalog: Arc::new(MemoryCatalog::with_entries(catalog)),
            tools,
            secrets: Arc::new(MemorySecretStore::default()),
        }
    }

    pub fn repos(&self) -> Repos {
        Repos::new(
            Arc::clone(&self.servers) as Arc<dyn McpServerRepository>,
            Arc::clone(&self.catalog) as Arc<dyn CatalogRepository>,
            Arc::clone(&self.tools) as Arc<dyn ToolRepository>,
            Arc::clone(&self.secrets) as Arc<dyn SecretStore>,
        )
    }
}
