//! Structured logging for the proxy agent.
//!
//! JSON is the default output since the agent normally runs as a node
//! daemon whose stdout is collected. A pretty format is available for
//! running it by hand.
//!
//! # Example
//!
//! ```rust,ignore
//! use proxy_agent_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(workload = "default/w1", "Handling proxy start request");
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Log line encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

impl LogFormat {
    /// JSON when `json` is set, pretty otherwise.
    #[must_use]
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Install a subscriber at all.
    pub enabled: bool,

    /// Filter directive, e.g. `info` or `proxy_agent=debug,bollard=warn`.
    pub level: String,

    /// Output encoding.
    pub format: LogFormat,

    /// Attach source file and line to each record.
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Pretty output at debug level with source locations.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            source_location: true,
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            source_location: false,
        }
    }

    /// Override the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Override the output encoding.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Install the global logging subscriber.
///
/// `RUST_LOG`, when set, wins over the configured level.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the filter is invalid or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => create_env_filter(&config.level)?,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_file(config.source_location)
        .with_line_number(config.source_location);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Parse a filter directive.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the directive does not parse.
pub fn create_env_filter(directive: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid log filter {directive:?}: {e}")))
}
