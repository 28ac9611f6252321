//! Prometheus metrics for the proxy agent.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `proxy_agent_requests_total` | Counter | `operation`, `status` | Requests served |
//! | `proxy_agent_request_duration_seconds` | Histogram | `operation` | Request latency, backend call included |
//! | `proxy_agent_backend_failures_total` | Counter | `operation`, `category` | Failed backend calls |
//! | `proxy_agent_decode_failures_total` | Counter | `operation`, `category` | Rejected request bodies |
//! | `proxy_agent_in_flight_requests` | Gauge | - | Start, stop and readiness requests being served |
//!
//! Recording functions are safe to call before [`init_metrics`]; without an
//! installed recorder they are no-ops.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address the Prometheus scrape listener binds to.
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

impl MetricsConfig {
    /// Metrics turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Installs the global recorder and starts the scrape listener.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address and
/// `TelemetryError::MetricsInit` if the exporter cannot be installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    register_metric_descriptions();
    tracing::info!(%addr, "Prometheus metrics listener started");

    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!(
        "proxy_agent_requests_total",
        "Total number of agent requests served"
    );
    describe_histogram!(
        "proxy_agent_request_duration_seconds",
        "Agent request duration in seconds"
    );
    describe_counter!(
        "proxy_agent_backend_failures_total",
        "Total runtime backend failures by category"
    );
    describe_counter!(
        "proxy_agent_decode_failures_total",
        "Total rejected request bodies by category"
    );
    describe_gauge!(
        "proxy_agent_in_flight_requests",
        "Number of backend-bound agent requests currently being served"
    );
}

/// Records a completed request.
pub fn record_request(operation: &str, status_code: u16, duration: Duration) {
    counter!(
        "proxy_agent_requests_total",
        "operation" => operation.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        "proxy_agent_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a failed backend call.
pub fn record_backend_failure(operation: &str, category: &str) {
    counter!(
        "proxy_agent_backend_failures_total",
        "operation" => operation.to_string(),
        "category" => category.to_string()
    )
    .increment(1);
}

/// Records a rejected request body.
pub fn record_decode_failure(operation: &str, category: &str) {
    counter!(
        "proxy_agent_decode_failures_total",
        "operation" => operation.to_string(),
        "category" => category.to_string()
    )
    .increment(1);
}

/// Guard that tracks an in-flight request until dropped.
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Creates a new guard and increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!("proxy_agent_in_flight_requests").increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!("proxy_agent_in_flight_requests").decrement(1.0);
    }
}
