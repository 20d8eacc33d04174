use std::time::Duration;

use chrono::Utc;
use mcpod_core::{CatalogEntry, NoopEmitter, RepositoryError, RuntimeError};
use mcpod_runtime::bridge::CollectingChannel;
use mcpod_runtime::testing::{FakeBackend, FakePod, MemoryRepos};
use mcpod_runtime::WorkloadBackend;
use serde_json::json;

use super::*;

struct Harness {
    memory: MemoryRepos,
    backend: Arc<FakeBackend>,
    service: McpService,
}

fn catalog() -> Vec<CatalogEntry> {
    let mut remote = CatalogEntry::local("cat-remote", "Remote", "unused");
    remote.server_type = McpServerType::Remote;
    remote.workload = None;
    vec![CatalogEntry::local("cat-x", "X", "x-image"), remote]
}

fn harness_with(pod: FakePod, settings: RuntimeSettings) -> Harness {
    let memory = MemoryRepos::new(catalog());
    let repos = memory.repos();
    let backend = Arc::new(FakeBackend::new(pod));
    let emitter: Arc<dyn AppEventEmitter> = Arc::new(NoopEmitter::new());
    let runtime = PodRuntime::new(
        &repos,
        Arc::clone(&backend) as Arc<dyn WorkloadBackend>,
        &settings,
        Arc::clone(&emitter),
    );
    Harness {
        memory,
        backend,
        service: McpService::new(repos, runtime, settings, emitter),
    }
}

fn harness(pod: FakePod) -> Harness {
    harness_with(pod, RuntimeSettings::fast())
}

fn request(name: &str, catalog_id: &str) -> InstallRequest {
    InstallRequest {
        name: name.to_string(),
        catalog_id: catalog_id.to_string(),
        ..InstallRequest::default()
    }
}

async fn wait_for_outcome(service: &McpService, server_id: &str) -> InstallationStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = service.installation_status(server_id).await.unwrap();
            if status.local_installation_status.is_terminal() && !service.is_discovering(server_id)
            {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("installation never finished")
}

#[tokio::test]
async fn test_local_install_is_pending_then_succeeds() {
    let settings = RuntimeSettings {
        discovery_grace_ms: 200,
        ..RuntimeSettings::fast()
    };
    let h = harness_with(FakePod::default(), settings);
    let mut req = request("X", "cat-x");
    req.agent_ids = vec!["agent-1".to_string()];

    let server = h.service.install(req).await.unwrap();
    assert_eq!(
        server.local_installation_status,
        LocalInstallationStatus::Pending
    );
    assert!(h.service.get_pod(&server.id).is_some());

    let status = wait_for_outcome(&h.service, &server.id).await;
    assert_eq!(status.local_installation_status, LocalInstallationStatus::Success);
    assert!(status.local_installation_error.is_none());

    let tools = h.service.list_tools(&server.id).await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "x-ping");
    assert_eq!(
        h.memory.tools.assignments(),
        vec![("agent-1".to_string(), tools[0].id.clone())]
    );
}

#[tokio::test]
async fn test_unaddressable_pod_rolls_back_record_and_secret() {
    let pod = FakePod {
        becomes_ready: false,
        ..FakePod::default()
    };
    let settings = RuntimeSettings {
        provision_timeout_secs: 1,
        ..RuntimeSettings::fast()
    };
    let h = harness_with(pod, settings);
    let mut req = request("Y", "cat-x");
    req.secret_values.insert("API_KEY".into(), "s3cret".into());

    let err = h.service.install(req).await.unwrap_err();

    assert!(matches!(err, McpServiceError::Runtime(RuntimeError::Provision(_))));
    assert!(h.service.list_servers().await.unwrap().is_empty());
    assert!(h.memory.secrets.is_empty());
    assert_eq!(h.backend.live(), 0);
}

#[tokio::test]
async fn test_schedule_failure_rolls_back() {
    let pod = FakePod {
        fail_create: true,
        ..FakePod::default()
    };
    let h = harness(pod);

    let err = h.service.install(request("Y", "cat-x")).await.unwrap_err();

    assert!(matches!(err, McpServiceError::Runtime(RuntimeError::Provision(_))));
    assert!(h.service.list_servers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_catalog_entry_is_not_found() {
    let h = harness(FakePod::default());

    let err = h.service.install(request("Z", "nope")).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(h.memory.secrets.is_empty());
}

#[tokio::test]
async fn test_blank_name_is_rejected() {
    let h = harness(FakePod::default());

    let err = h.service.install(request("  ", "cat-x")).await.unwrap_err();

    assert!(matches!(err, McpServiceError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_duplicate_name_discards_new_secret() {
    let h = harness(FakePod::default());
    h.service.install(request("X", "cat-x")).await.unwrap();

    let mut req = request("X", "cat-x");
    req.secret_values.insert("TOKEN".into(), "t".into());
    let err = h.service.install(req).await.unwrap_err();

    assert!(matches!(
        err,
        McpServiceError::Repository(RepositoryError::Conflict(_))
    ));
    assert!(h.memory.secrets.is_empty());
}

#[tokio::test]
async fn test_remote_install_stays_idle_without_pod() {
    let h = harness(FakePod::default());

    let server = h
        .service
        .install(request("R", "cat-remote"))
        .await
        .unwrap();

    assert_eq!(server.server_type, McpServerType::Remote);
    assert_eq!(server.local_installation_status, LocalInstallationStatus::Idle);
    assert!(h.service.get_pod(&server.id).is_none());
    assert_eq!(h.backend.created(), 0);
}

#[tokio::test]
async fn test_discovery_failure_marks_error_and_keeps_pod() {
    let pod = FakePod {
        tools_list_failures: 100,
        ..FakePod::default()
    };
    let h = harness(pod);

    let server = h.service.install(request("X", "cat-x")).await.unwrap();
    let status = wait_for_outcome(&h.service, &server.id).await;

    assert_eq!(status.local_installation_status, LocalInstallationStatus::Error);
    let message = status.local_installation_error.unwrap();
    assert!(message.contains("still warming up"), "{message}");
    assert!(h.service.get_pod(&server.id).is_some());
}

#[tokio::test]
async fn test_uninstall_removes_everything() {
    let settings = RuntimeSettings {
        discovery_grace_ms: 5_000,
        ..RuntimeSettings::fast()
    };
    let h = harness_with(FakePod::default(), settings);
    let mut req = request("X", "cat-x");
    req.secret_values.insert("TOKEN".into(), "t".into());
    let server = h.service.install(req).await.unwrap();
    assert!(h.service.is_discovering(&server.id));

    h.service.uninstall(&server.id).await.unwrap();

    assert!(!h.service.is_discovering(&server.id));
    assert!(h.service.get_pod(&server.id).is_none());
    assert!(h.service.get_server(&server.id).await.unwrap_err().is_not_found());
    assert!(h.memory.secrets.is_empty());
    assert_eq!(h.backend.live(), 0);
}

#[tokio::test]
async fn test_uninstall_unknown_server_is_not_found() {
    let h = harness(FakePod::default());

    let err = h.service.uninstall("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_restart_keeps_installation_status() {
    let h = harness(FakePod::default());
    let server = h.service.install(request("X", "cat-x")).await.unwrap();
    wait_for_outcome(&h.service, &server.id).await;
    let before = h.service.get_pod(&server.id).unwrap();

    let restarted = h.service.restart(&server.id).await.unwrap();

    assert_eq!(
        restarted.local_installation_status,
        LocalInstallationStatus::Success
    );
    let after = h.service.get_pod(&server.id).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(h.memory.tools.all().len(), 1);
}

#[tokio::test]
async fn test_proxy_without_pod_is_not_found() {
    let h = harness(FakePod::default());
    let mut channel = CollectingChannel::new();

    let err = tokio::time::timeout(
        Duration::from_secs(1),
        h.service
            .proxy("missing", JsonRpcEnvelope::request(1, "echo", None), &mut channel),
    )
    .await
    .expect("proxy hung")
    .unwrap_err();

    assert!(err.is_not_found());
    assert!(channel.head.is_none());
}

#[tokio::test]
async fn test_proxy_relays_to_installed_server() {
    let h = harness(FakePod::default());
    let server = h.service.install(request("X", "cat-x")).await.unwrap();
    wait_for_outcome(&h.service, &server.id).await;

    let mut channel = CollectingChannel::new();
    let message = JsonRpcEnvelope::request("c-1", "echo", Some(json!({"v": 1})));
    h.service
        .proxy(&server.id, message, &mut channel)
        .await
        .unwrap();

    assert_eq!(channel.frames[0]["id"], "c-1");
    assert_eq!(channel.frames[0]["result"], json!({"v": 1}));
}

#[tokio::test]
async fn test_get_logs_defaults_to_configured_lines() {
    let settings = RuntimeSettings {
        default_log_lines: 2,
        ..RuntimeSettings::fast()
    };
    let h = harness_with(FakePod::default(), settings);
    let server = h.service.install(request("X", "cat-x")).await.unwrap();

    let logs = h.service.get_logs(&server.id, None).await.unwrap();
    assert_eq!(logs.logs, "listening on stdio\nready");
    assert_eq!(logs.container_name, "mcp-server");

    let logs = h.service.get_logs(&server.id, Some(1)).await.unwrap();
    assert_eq!(logs.logs, "ready");
}

#[tokio::test]
async fn test_initialize_recovers_after_gateway_restart() {
    let h = harness(FakePod::default());
    let repos = h.memory.repos();

    let stale = repos
        .servers
        .insert(NewMcpServer::local("Stale", "cat-x"))
        .await
        .unwrap();
    let fresh = repos
        .servers
        .insert(NewMcpServer::local("Fresh", "cat-x"))
        .await
        .unwrap();
    let done = repos
        .servers
        .insert(NewMcpServer::local("Done", "cat-x"))
        .await
        .unwrap();
    for id in [&stale.id, &fresh.id, &done.id] {
        repos
            .servers
            .set_installation_status(id, LocalInstallationStatus::Pending, None)
            .await
            .unwrap();
    }
    repos
        .servers
        .set_installation_status(&done.id, LocalInstallationStatus::Success, None)
        .await
        .unwrap();
    let mut backdated = repos.servers.get(&stale.id).await.unwrap();
    backdated.updated_at = Utc::now() - chrono::TimeDelta::hours(1);
    h.memory.servers.put(backdated);

    h.service.initialize().await.unwrap();

    let stale = h.service.installation_status(&stale.id).await.unwrap();
    assert_eq!(stale.local_installation_status, LocalInstallationStatus::Error);
    assert_eq!(
        stale.local_installation_error.as_deref(),
        Some(INTERRUPTED_INSTALL_MESSAGE)
    );
    assert!(h.service.get_pod(&done.id).is_some());

    // Interrupted recently: a new pod is started and discovery finishes it
    let fresh_status = wait_for_outcome(&h.service, &fresh.id).await;
    assert_eq!(
        fresh_status.local_installation_status,
        LocalInstallationStatus::Success
    );
    assert!(h.service.get_pod(&fresh.id).is_some());
    let tools = h.service.list_tools(&fresh.id).await.unwrap();
    assert_eq!(tools[0].name, "fresh-ping");
}

#[tokio::test]
async fn test_initialize_fails_recent_pending_when_pod_cannot_start() {
    let pod = FakePod {
        fail_create: true,
        ..FakePod::default()
    };
    let h = harness(pod);
    let repos = h.memory.repos();
    let fresh = repos
        .servers
        .insert(NewMcpServer::local("Fresh", "cat-x"))
        .await
        .unwrap();
    repos
        .servers
        .set_installation_status(&fresh.id, LocalInstallationStatus::Pending, None)
        .await
        .unwrap();

    h.service.initialize().await.unwrap();

    let status = h.service.installation_status(&fresh.id).await.unwrap();
    assert_eq!(status.local_installation_status, LocalInstallationStatus::Error);
    assert!(status.local_installation_error.is_some());
    assert!(h.service.get_pod(&fresh.id).is_none());
}

#[tokio::test]
async fn test_names_with_clashing_tool_prefixes_are_rejected() {
    let h = harness(FakePod::default());
    let first = h.service.install(request("X", "cat-x")).await.unwrap();
    wait_for_outcome(&h.service, &first.id).await;

    for name in ["x", "X!", "x files"] {
        let mut req = request(name, "cat-x");
        req.secret_values.insert("TOKEN".into(), "t".into());
        let err = h.service.install(req).await.unwrap_err();
        assert!(
            matches!(err, McpServiceError::Repository(RepositoryError::Conflict(_))),
            "{name}: {err}"
        );
    }

    assert_eq!(h.service.list_servers().await.unwrap().len(), 1);
    assert_eq!(h.backend.created(), 1);
    assert!(h.memory.secrets.is_empty());

    let other = h.service.install(request("Xylophone", "cat-x")).await.unwrap();
    let status = wait_for_outcome(&h.service, &other.id).await;
    assert_eq!(status.local_installation_status, LocalInstallationStatus::Success);
}

#[tokio::test]
async fn test_shutdown_tears_down_all_pods() {
    let h = harness(FakePod::default());
    h.service.install(request("A", "cat-x")).await.unwrap();
    h.service.install(request("B", "cat-x")).await.unwrap();
    assert_eq!(h.service.runtime().registry.list().len(), 2);

    h.service.shutdown().await;

    assert!(h.service.runtime().registry.list().is_empty());
    assert_eq!(h.backend.live(), 0);
}
