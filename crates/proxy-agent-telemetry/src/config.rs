//! Combined telemetry settings.

use crate::logging::{LogConfig, LogFormat};
use crate::metrics::MetricsConfig;

/// Logging and metrics settings installed together by
/// [`init_telemetry`](crate::init_telemetry).
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Prometheus exporter.
    pub metrics: MetricsConfig,

    /// Log subscriber.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Start from production defaults.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    config: TelemetryConfig,
}

impl TelemetryConfigBuilder {
    /// Serve metrics on `addr`.
    #[must_use]
    pub fn metrics_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.metrics = MetricsConfig {
            enabled: true,
            addr: addr.into(),
        };
        self
    }

    /// Do not install a metrics exporter.
    #[must_use]
    pub fn without_metrics(mut self) -> Self {
        self.config.metrics = MetricsConfig::disabled();
        self
    }

    /// Log filter directive.
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// JSON lines when `true`, pretty output otherwise.
    #[must_use]
    pub fn json_logs(mut self, json: bool) -> Self {
        self.config.logging.format = LogFormat::from_json_flag(json);
        self
    }

    /// Replace the logging settings wholesale.
    #[must_use]
    pub fn logging(mut self, logging: LogConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        self.config
    }
}
