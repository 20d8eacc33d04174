//! Shared harness for gateway integration tests.
//!
//! Composes the real router, service and `SQLite` repositories over an
//! in-memory database, with pods played by in-process fakes.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use mcpod_axum::{AxumContext, CorsConfig, create_router};
use mcpod_core::RuntimeSettings;
use mcpod_db::{RepoFactory, setup_test_database};
use mcpod_runtime::WorkloadBackend;
use mcpod_runtime::testing::{FakeBackend, FakePod};

pub struct Gateway {
    pub app: Router,
    pub ctx: Arc<AxumContext>,
    pub backend: Arc<FakeBackend>,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!(
                "body is not JSON ({e}): {}",
                String::from_utf8_lossy(&self.body)
            )
        })
    }

    /// Every line of an NDJSON body.
    pub fn frames(&self) -> Vec<Value> {
        std::str::from_utf8(&self.body)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

pub async fn gateway_with(pod: FakePod, settings: RuntimeSettings) -> Gateway {
    let repos = RepoFactory::build_repos(setup_test_database().await.unwrap());
    let backend = Arc::new(FakeBackend::new(pod));
    let ctx = Arc::new(AxumContext::compose(
        repos,
        Arc::clone(&backend) as Arc<dyn WorkloadBackend>,
        settings,
    ));
    let app = create_router(Arc::clone(&ctx), &CorsConfig::AllowAll);

    let gateway = Gateway { app, ctx, backend };
    let reply = gateway
        .send(
            "POST",
            "/api/catalog",
            Some(json!({
                "id": "cat-x",
                "name": "X",
                "serverType": "local",
                "workload": {"image": "ghcr.io/acme/x-mcp:1"}
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    gateway
}

pub async fn gateway() -> Gateway {
    gateway_with(FakePod::default(), RuntimeSettings::fast()).await
}

impl Gateway {
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> Reply {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        self.send_request(request).await
    }

    pub async fn send_request(&self, request: Request<Body>) -> Reply {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        Reply {
            status,
            headers,
            body,
        }
    }

    /// Install a server named `name` from `cat-x`; panics unless accepted.
    pub async fn install(&self, name: &str) -> Value {
        let reply = self
            .send(
                "POST",
                "/api/mcp/servers",
                Some(json!({"name": name, "catalogId": "cat-x", "agentIds": ["agent-1"]})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
        reply.json()
    }

    /// Poll the installation status until it leaves `pending`.
    pub async fn wait_for_outcome(&self, server_id: &str) -> Value {
        let uri = format!("/api/mcp/servers/{server_id}/installation-status");
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = self.send("GET", &uri, None).await.json();
                if status["localInstallationStatus"] != "pending" {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("installation never finished")
    }
}
