//! End-to-end tests: a real listener, real HTTP, the in-memory backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use proxy_agent::{Agent, AgentSettings, FailureMode, ShutdownSignal};
use proxy_agent_core::fixtures::RecordingRuntime;
use proxy_agent_core::{ProxyConfig, RuntimeBackend, RuntimeError};
use proxy_agent_runtime::{Runtime, RuntimeKind, RuntimeSettings};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct TestAgent {
    addr: SocketAddr,
    shutdown: ShutdownSignal,
    server: JoinHandle<proxy_agent::AgentResult<()>>,
    client: reqwest::Client,
}

impl TestAgent {
    async fn start(runtime: Arc<dyn RuntimeBackend>, failure_mode: FailureMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();

        let settings = AgentSettings {
            listen_addr: "127.0.0.1".to_string(),
            listen_port: addr.port(),
            failure_mode,
            ..AgentSettings::default()
        };
        let agent = Arc::new(Agent::new(runtime, settings));
        let server = tokio::spawn(agent.serve(listener, shutdown.clone()));

        Self {
            addr,
            shutdown,
            server,
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
        }
    }

    async fn memory(failure_mode: FailureMode) -> Self {
        let settings = RuntimeSettings {
            kind: RuntimeKind::Memory,
            ..RuntimeSettings::default()
        };
        let runtime = Runtime::connect(&settings, Arc::new(ProxyConfig::default()))
            .await
            .unwrap();
        Self::start(Arc::new(runtime), failure_mode).await
    }

    async fn post(&self, path: &str, body: &str) -> reqwest::Response {
        self.client
            .post(format!("http://{}{path}", self.addr))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    async fn ready(&self, workload: &str) -> bool {
        let response = self
            .post("/readiness", &json!({ "workload": workload }).to_string())
            .await;
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        body["ready"].as_bool().unwrap()
    }

    async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn test_proxy_lifecycle_over_http() {
    let agent = TestAgent::memory(FailureMode::FireAndForget).await;

    assert!(!agent.ready("w1").await);

    let response = agent
        .post("/start", r#"{"workload":"w1","podIp":"10.1.2.3"}"#)
        .await;
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.bytes().await.unwrap().is_empty());

    assert!(agent.ready("w1").await);

    let response = agent.post("/stop", r#"{"workload":"w1"}"#).await;
    assert_eq!(response.status(), 200);
    assert!(!agent.ready("w1").await);

    agent.stop().await;
}

#[tokio::test]
async fn test_fire_and_forget_swallows_failures() {
    let agent = TestAgent::memory(FailureMode::FireAndForget).await;

    // Truncated JSON.
    let response = agent.post("/start", r#"{"workload":"#).await;
    assert_eq!(response.status(), 200);

    // Stopping a proxy that was never started fails in the backend.
    let response = agent.post("/stop", r#"{"workload":"ghost"}"#).await;
    assert_eq!(response.status(), 200);

    agent.stop().await;
}

#[tokio::test]
async fn test_report_mode_surfaces_failures() {
    let agent = TestAgent::memory(FailureMode::Report).await;

    let response = agent.post("/start", r#"{"workload":"#).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "malformed");

    let response = agent.post("/stop", r#"{"workload":"ghost"}"#).await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    agent.stop().await;
}

#[tokio::test]
async fn test_backend_failure_reaches_caller_only_in_report_mode() {
    let runtime = Arc::new(
        RecordingRuntime::new().fail_start(RuntimeError::unavailable("daemon restarting")),
    );
    let agent = TestAgent::start(runtime.clone(), FailureMode::Report).await;

    let response = agent.post("/start", r#"{"workload":"w1"}"#).await;
    assert_eq!(response.status(), 503);
    assert_eq!(runtime.start_calls().len(), 1);

    agent.stop().await;
}

#[tokio::test]
async fn test_health_and_routing() {
    let agent = TestAgent::memory(FailureMode::FireAndForget).await;

    let response = agent
        .client
        .get(format!("http://{}/healthz", agent.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["runtime"], "memory");

    let response = agent
        .client
        .get(format!("http://{}/start", agent.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);

    let response = agent.post("/unknown", "{}").await;
    assert_eq!(response.status(), 404);

    agent.stop().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let agent = TestAgent::memory(FailureMode::FireAndForget).await;
    let addr = agent.addr;
    let client = agent.client.clone();
    agent.stop().await;

    let result = client
        .post(format!("http://{addr}/start"))
        .body(r#"{"workload":"w1"}"#)
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(result.is_err());
}
