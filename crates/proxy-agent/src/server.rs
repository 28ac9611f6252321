//! The agent: HTTP dispatch onto a runtime backend.
//!
//! Every backend endpoint follows the same shape: decode the body, call the
//! backend exactly once, log what went wrong. What the caller sees on failure
//! depends on [`FailureMode`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use proxy_agent_core::{
    decode, DecodeError, ReadinessRequest, ReadinessResponse, RuntimeBackend, RuntimeError,
    StartRequest, StopRequest, WorkloadRef,
};
use proxy_agent_telemetry::metrics::{
    record_backend_failure, record_decode_failure, record_request,
};
use proxy_agent_telemetry::InFlightGuard;
use tokio::net::TcpListener;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use crate::config::{AgentSettings, FailureMode};
use crate::error::{AgentError, AgentResult, ErrorResponse};
use crate::router::{Operation, RouteOutcome, Router};
use crate::shutdown::ShutdownSignal;

/// Response type of every agent endpoint.
pub type AgentResponse = Response<Full<Bytes>>;

/// Request ID header set on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Dispatches agent requests to a shared runtime backend.
pub struct Agent {
    runtime: Arc<dyn RuntimeBackend>,
    router: Router,
    settings: AgentSettings,
}

impl Agent {
    /// Create an agent serving the default routes.
    pub fn new(runtime: Arc<dyn RuntimeBackend>, settings: AgentSettings) -> Self {
        Self {
            runtime,
            router: Router::agent(),
            settings,
        }
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn run(self, shutdown: ShutdownSignal) -> AgentResult<()> {
        let addr = self.settings.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AgentError::server(format!("failed to bind {addr}: {e}")))?;

        Arc::new(self).serve(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` fires.
    ///
    /// Each connection runs on its own task. In-flight requests are not
    /// drained when the loop exits.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> AgentResult<()> {
        let addr = listener.local_addr()?;
        info!(
            %addr,
            runtime = self.runtime.name(),
            routes = self.router.route_count(),
            failure_mode = %self.settings.failure_mode,
            "Proxy agent listening"
        );

        let stop = shutdown.recv();
        tokio::pin!(stop);

        loop {
            let (stream, peer) = tokio::select! {
                () = &mut stop => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let agent = Arc::clone(&self);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let agent = Arc::clone(&agent);
                    async move { Ok::<_, Infallible>(agent.handle_request(req, peer).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, error = %e, "Connection error");
                }
            });
        }

        Ok(())
    }

    async fn handle_request(&self, req: Request<Incoming>, peer: SocketAddr) -> AgentResponse {
        let (parts, body) = req.into_parts();
        let limit = self.settings.max_request_body_size;

        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(DecodeError::TooLarge { limit })
            }
            Err(e) => Err(DecodeError::body(e.to_string())),
        };

        debug!(%peer, method = %parts.method, path = parts.uri.path(), "Accepted request");
        self.process(&parts.method, parts.uri.path(), body).await
    }

    /// Route and handle one request whose body is already in memory.
    pub async fn dispatch(&self, method: &Method, path: &str, body: Bytes) -> AgentResponse {
        let limit = self.settings.max_request_body_size;
        let body = if body.len() > limit {
            Err(DecodeError::TooLarge { limit })
        } else {
            Ok(body)
        };
        self.process(method, path, body).await
    }

    async fn process(
        &self,
        method: &Method,
        path: &str,
        body: Result<Bytes, DecodeError>,
    ) -> AgentResponse {
        let request_id = Uuid::now_v7().to_string();
        let span = tracing::info_span!(
            "request",
            method = %method,
            path = %path,
            request_id = %request_id,
        );

        async {
            let mut response = match self.router.route(method, path) {
                RouteOutcome::Found(operation) => {
                    self.handle(operation, &request_id, body).await
                }
                RouteOutcome::MethodNotAllowed { allowed } => {
                    let mut response = error_response(
                        StatusCode::METHOD_NOT_ALLOWED,
                        &ErrorResponse::new(
                            "method_not_allowed",
                            format!("{method} is not allowed on {path}"),
                        )
                        .with_request_id(&request_id),
                    );
                    let allow = allowed
                        .iter()
                        .map(Method::as_str)
                        .collect::<Vec<_>>()
                        .join(", ");
                    if let Ok(value) = HeaderValue::from_str(&allow) {
                        response.headers_mut().insert(ALLOW, value);
                    }
                    response
                }
                RouteOutcome::NotFound => error_response(
                    StatusCode::NOT_FOUND,
                    &ErrorResponse::new("not_found", format!("no route for {path}"))
                        .with_request_id(&request_id),
                ),
            };

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        }
        .instrument(span)
        .await
    }

    async fn handle(
        &self,
        operation: Operation,
        request_id: &str,
        body: Result<Bytes, DecodeError>,
    ) -> AgentResponse {
        let _in_flight = operation.is_backend_call().then(InFlightGuard::new);
        let started = Instant::now();

        let response = match (operation, body) {
            (Operation::Health, _) => self.health(),
            (Operation::Version, _) => json_response(
                StatusCode::OK,
                &serde_json::json!({ "version": crate::VERSION }),
            ),
            (_, Err(e)) => self.decode_failure(operation, request_id, &e),
            (Operation::Start, Ok(body)) => self.handle_start(request_id, &body).await,
            (Operation::Stop, Ok(body)) => self.handle_stop(request_id, &body).await,
            (Operation::Readiness, Ok(body)) => self.handle_readiness(request_id, &body).await,
        };

        let elapsed = started.elapsed();
        record_request(operation.as_str(), response.status().as_u16(), elapsed);
        info!(
            operation = operation.as_str(),
            status = response.status().as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request completed"
        );
        response
    }

    /// Decode a start request and forward it to the backend.
    pub async fn handle_start(&self, request_id: &str, body: &[u8]) -> AgentResponse {
        let request: StartRequest = match decode(body) {
            Ok(request) => request,
            Err(e) => return self.decode_failure(Operation::Start, request_id, &e),
        };

        info!(workload = %request.target.key(), "Starting proxy");
        let result = self.runtime.start_proxy(&request).await;
        self.completion(Operation::Start, request_id, &request.target, result)
    }

    /// Decode a stop request and forward it to the backend.
    pub async fn handle_stop(&self, request_id: &str, body: &[u8]) -> AgentResponse {
        let request: StopRequest = match decode(body) {
            Ok(request) => request,
            Err(e) => return self.decode_failure(Operation::Stop, request_id, &e),
        };

        info!(workload = %request.target.key(), "Stopping proxy");
        let result = self.runtime.stop_proxy(&request).await;
        self.completion(Operation::Stop, request_id, &request.target, result)
    }

    /// Decode a readiness request, probe the backend and encode the answer.
    ///
    /// The `ready` field is always the backend's boolean, even when the
    /// probe also reported a failure.
    pub async fn handle_readiness(&self, request_id: &str, body: &[u8]) -> AgentResponse {
        let request: ReadinessRequest = match decode(body) {
            Ok(request) => request,
            Err(e) => return self.decode_failure(Operation::Readiness, request_id, &e),
        };

        let readiness = self.runtime.is_ready(&request).await;
        let workload = request.target.key();

        let status = match &readiness.failure {
            Some(failure) => {
                error!(
                    workload = %workload,
                    ready = readiness.ready,
                    error = %failure,
                    "Readiness probe failed"
                );
                record_backend_failure(Operation::Readiness.as_str(), failure.category());
                match self.settings.failure_mode {
                    FailureMode::FireAndForget => StatusCode::OK,
                    FailureMode::Report => StatusCode::SERVICE_UNAVAILABLE,
                }
            }
            None => {
                debug!(workload = %workload, ready = readiness.ready, "Readiness probed");
                StatusCode::OK
            }
        };

        match serde_json::to_vec(&ReadinessResponse {
            ready: readiness.ready,
        }) {
            Ok(bytes) => with_json_body(status, Bytes::from(bytes)),
            Err(e) => {
                error!(workload = %workload, error = %e, "Failed to encode readiness response");
                empty_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn health(&self) -> AgentResponse {
        json_response(
            StatusCode::OK,
            &serde_json::json!({
                "status": "ok",
                "runtime": self.runtime.name(),
                "version": crate::VERSION,
            }),
        )
    }

    fn completion(
        &self,
        operation: Operation,
        request_id: &str,
        target: &WorkloadRef,
        result: Result<(), RuntimeError>,
    ) -> AgentResponse {
        let Err(e) = result else {
            return empty_response(StatusCode::OK);
        };

        error!(
            workload = %target.key(),
            operation = operation.as_str(),
            category = e.category(),
            error = %e,
            "Runtime backend call failed"
        );
        record_backend_failure(operation.as_str(), e.category());

        match self.settings.failure_mode {
            FailureMode::FireAndForget => empty_response(StatusCode::OK),
            FailureMode::Report => {
                let err = AgentError::from(e);
                error_response(
                    status_from(err.status_code()),
                    &ErrorResponse::from(&err).with_request_id(request_id),
                )
            }
        }
    }

    fn decode_failure(
        &self,
        operation: Operation,
        request_id: &str,
        e: &DecodeError,
    ) -> AgentResponse {
        error!(
            operation = operation.as_str(),
            category = e.category(),
            error = %e,
            "Failed to decode request"
        );
        record_decode_failure(operation.as_str(), e.category());

        match self.settings.failure_mode {
            FailureMode::FireAndForget => empty_response(StatusCode::OK),
            FailureMode::Report => error_response(
                status_from(e.status_code()),
                &ErrorResponse::new(e.category(), e.to_string()).with_request_id(request_id),
            ),
        }
    }
}

fn status_from(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn empty_response(status: StatusCode) -> AgentResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn with_json_body(status: StatusCode, body: Bytes) -> AgentResponse {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> AgentResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_json_body(status, Bytes::from(bytes)),
        Err(e) => {
            error!(error = %e, "Failed to encode response body");
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn error_response(status: StatusCode, body: &ErrorResponse) -> AgentResponse {
    json_response(status, body)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proxy_agent_core::fixtures::RecordingRuntime;
    use proxy_agent_core::{ProxySpec, Readiness};
    use tokio::sync::Barrier;

    use super::*;

    fn agent_with(
        runtime: RecordingRuntime,
        failure_mode: FailureMode,
    ) -> (Agent, Arc<RecordingRuntime>) {
        let runtime = Arc::new(runtime);
        let settings = AgentSettings {
            failure_mode,
            ..AgentSettings::default()
        };
        let backend: Arc<dyn RuntimeBackend> = runtime.clone();
        (Agent::new(backend, settings), runtime)
    }

    async fn body_json(response: AgentResponse) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_bytes(response: AgentResponse) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    async fn post(agent: &Agent, path: &str, body: &'static str) -> AgentResponse {
        agent
            .dispatch(&Method::POST, path, Bytes::from_static(body.as_bytes()))
            .await
    }

    #[tokio::test]
    async fn test_start_forwards_decoded_request_once() {
        let (agent, runtime) = agent_with(RecordingRuntime::new(), FailureMode::FireAndForget);

        let response = post(
            &agent,
            "/start",
            r#"{"workload":"w1","namespace":"default","proxy":{"image":"proxy:2"},"extra":1}"#,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert!(body_bytes(response).await.is_empty());

        let expected = StartRequest::new(WorkloadRef::new("w1").with_namespace("default"))
            .with_proxy(ProxySpec {
                image: Some("proxy:2".to_string()),
                ..ProxySpec::default()
            });
        assert_eq!(runtime.start_calls(), vec![expected]);
        assert_eq!(runtime.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_makes_no_backend_call() {
        let (agent, runtime) = agent_with(RecordingRuntime::new(), FailureMode::FireAndForget);

        for path in ["/start", "/stop", "/readiness"] {
            let response = post(&agent, path, r#"{"workload":"#).await;
            assert_eq!(response.status(), StatusCode::OK, "{path}");
        }

        assert_eq!(runtime.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_workload_makes_no_backend_call() {
        let (agent, runtime) = agent_with(RecordingRuntime::new(), FailureMode::FireAndForget);

        let response = post(&agent, "/start", r#"{"workload":"  "}"#).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(runtime.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_stop_failure_is_swallowed() {
        let (agent, runtime) = agent_with(
            RecordingRuntime::new().fail_stop(RuntimeError::backend("container stuck")),
            FailureMode::FireAndForget,
        );

        let response = post(&agent, "/stop", r#"{"workload":"w1"}"#).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(runtime.stop_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_readiness_reports_backend_boolean() {
        let (agent, runtime) = agent_with(
            RecordingRuntime::new().with_readiness(Readiness::ready()),
            FailureMode::FireAndForget,
        );

        let response = post(&agent, "/readiness", r#"{"workload":"w1"}"#).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_json(response).await, serde_json::json!({"ready": true}));
        assert_eq!(
            runtime.probe_calls(),
            vec![ReadinessRequest::new(WorkloadRef::new("w1"))]
        );
    }

    #[tokio::test]
    async fn test_readiness_keeps_boolean_on_probe_failure() {
        for ready in [true, false] {
            let (agent, _) = agent_with(
                RecordingRuntime::new().with_readiness(Readiness::with_failure(
                    ready,
                    RuntimeError::unavailable("probe socket closed"),
                )),
                FailureMode::FireAndForget,
            );

            let response = post(&agent, "/readiness", r#"{"workload":"w1"}"#).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await, serde_json::json!({"ready": ready}));
        }
    }

    #[tokio::test]
    async fn test_report_mode_decode_failure() {
        let (agent, runtime) = agent_with(RecordingRuntime::new(), FailureMode::Report);

        let response = post(&agent, "/start", r#"{"workload":"#).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let request_id = response.headers()[REQUEST_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        let body = body_json(response).await;
        assert_eq!(body["error"], "malformed");
        assert_eq!(body["request_id"], request_id);
        assert_eq!(runtime.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_report_mode_backend_failures() {
        let cases = [
            (RuntimeError::not_found("default/w1"), StatusCode::NOT_FOUND, "not_found"),
            (
                RuntimeError::already_exists("default/w1", "name in use"),
                StatusCode::CONFLICT,
                "conflict",
            ),
            (
                RuntimeError::unavailable("docker down"),
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
            ),
            (
                RuntimeError::timeout("docker stop", Duration::from_secs(10)),
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
            ),
            (
                RuntimeError::backend("boom"),
                StatusCode::INTERNAL_SERVER_ERROR,
                "backend",
            ),
        ];

        for (error, status, category) in cases {
            let (agent, _) = agent_with(
                RecordingRuntime::new().fail_stop(error),
                FailureMode::Report,
            );
            let response = post(&agent, "/stop", r#"{"workload":"w1"}"#).await;
            assert_eq!(response.status(), status);
            assert_eq!(body_json(response).await["error"], category);
        }
    }

    #[tokio::test]
    async fn test_report_mode_probe_failure_keeps_body() {
        let (agent, _) = agent_with(
            RecordingRuntime::new()
                .with_readiness(Readiness::failed(RuntimeError::unavailable("no socket"))),
            FailureMode::Report,
        );

        let response = post(&agent, "/readiness", r#"{"workload":"w1"}"#).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await, serde_json::json!({"ready": false}));
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let runtime = Arc::new(RecordingRuntime::new());
        let settings = AgentSettings {
            failure_mode: FailureMode::Report,
            max_request_body_size: 8,
            ..AgentSettings::default()
        };
        let backend: Arc<dyn RuntimeBackend> = runtime.clone();
        let agent = Agent::new(backend, settings);

        let response = post(&agent, "/start", r#"{"workload":"w1"}"#).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(runtime.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_routing_errors() {
        let (agent, runtime) = agent_with(RecordingRuntime::new(), FailureMode::FireAndForget);

        let response = agent.dispatch(&Method::GET, "/start", Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "POST");

        let response = post(&agent, "/nope", "{}").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        assert_eq!(runtime.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_health_and_version() {
        let (agent, runtime) = agent_with(RecordingRuntime::new(), FailureMode::FireAndForget);

        let response = agent.dispatch(&Method::GET, "/healthz", Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["runtime"], "recording");

        let response = agent.dispatch(&Method::GET, "/version", Bytes::new()).await;
        assert_eq!(body_json(response).await["version"], crate::VERSION);

        assert_eq!(runtime.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_starts_do_not_block_each_other() {
        // Both starts must be inside the backend at once for the barrier to open.
        let barrier = Arc::new(Barrier::new(2));
        let (agent, runtime) = agent_with(
            RecordingRuntime::new().with_start_barrier(barrier),
            FailureMode::FireAndForget,
        );
        let agent = Arc::new(agent);

        let first = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { post(&agent, "/start", r#"{"workload":"w1"}"#).await })
        };
        let second = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { post(&agent, "/start", r#"{"workload":"w2"}"#).await })
        };

        let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
            (first.await.unwrap(), second.await.unwrap())
        })
        .await
        .expect("concurrent starts deadlocked");

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(runtime.start_calls().len(), 2);
    }
}
