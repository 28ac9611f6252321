//! Observability for the proxy agent.
//!
//! - **Logging**: structured JSON (or pretty) output through `tracing-subscriber`
//! - **Metrics**: Prometheus counters and histograms via the `metrics` crate
//!
//! # Example
//!
//! ```rust,ignore
//! use proxy_agent_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::builder()
//!         .log_level("info")
//!         .metrics_addr("0.0.0.0:9090")
//!         .build();
//!
//!     init_telemetry(&config).expect("Failed to init telemetry");
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, InFlightGuard, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_telemetry_disabled() {
        let config = TelemetryConfig {
            metrics: MetricsConfig::disabled(),
            logging: LogConfig {
                enabled: false,
                ..LogConfig::default()
            },
        };
        assert!(init_telemetry(&config).is_ok());
    }
}
