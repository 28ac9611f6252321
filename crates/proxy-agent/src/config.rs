//! Configuration for the proxy agent.
//!
//! Sources, lowest precedence first: built-in defaults, a TOML or JSON file,
//! `PROXY_AGENT_*` environment variables, then command-line flags.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use proxy_agent_core::ProxyConfig;
use proxy_agent_runtime::{RuntimeKind, RuntimeSettings};
use proxy_agent_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AgentError, AgentResult};

/// Default agent port.
pub const DEFAULT_LISTEN_PORT: u16 = 22222;

/// Default request body limit (1 MiB).
pub const DEFAULT_MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024;

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "PROXY_AGENT_";

/// How failures are surfaced to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Log failures and answer 200 regardless.
    #[default]
    FireAndForget,
    /// Answer with the failure's status code and an error body.
    Report,
}

impl FailureMode {
    /// Configuration name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FireAndForget => "fire_and_forget",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fire_and_forget" => Ok(Self::FireAndForget),
            "report" => Ok(Self::Report),
            other => Err(format!("unknown failure mode: {other}")),
        }
    }
}

/// Complete agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Listener and dispatch settings.
    pub agent: AgentSettings,
    /// Runtime backend selection.
    pub runtime: RuntimeSettings,
    /// Default sidecar proxy.
    pub proxy: ProxyConfig,
    /// Logging and metrics.
    pub telemetry: TelemetrySettings,
}

impl AgentConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Load configuration from a `.toml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> AgentResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| AgentError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| AgentError::config(format!("invalid JSON: {e}"))),
            _ => Err(AgentError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply `PROXY_AGENT_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up by variable name, prefix included.
    ///
    /// Unparsable values are logged and ignored.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(addr) = var("LISTEN_ADDR") {
            self.agent.listen_addr = addr;
        }
        if let Some(port) = var("LISTEN_PORT") {
            apply_parsed("LISTEN_PORT", &port, &mut self.agent.listen_port);
        }
        if let Some(mode) = var("FAILURE_MODE") {
            apply_parsed("FAILURE_MODE", &mode, &mut self.agent.failure_mode);
        }
        if let Some(kind) = var("RUNTIME") {
            apply_parsed("RUNTIME", &kind, &mut self.runtime.kind);
        }
        if let Some(socket) = var("DOCKER_SOCKET") {
            self.runtime.docker.socket = Some(socket);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
        if let Some(port) = var("METRICS_PORT") {
            apply_parsed("METRICS_PORT", &port, &mut self.telemetry.metrics_port);
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AgentResult<()> {
        self.agent.socket_addr()?;

        if self.agent.max_request_body_size == 0 {
            return Err(AgentError::config("max_request_body_size must be greater than zero"));
        }

        if self.proxy.image().trim().is_empty() {
            return Err(AgentError::config("proxy image must not be empty"));
        }

        if self.runtime.docker.container_prefix.is_empty() {
            return Err(AgentError::config("container_prefix must not be empty"));
        }

        if self.telemetry.metrics_enabled
            && self.telemetry.metrics_port == self.agent.listen_port
        {
            return Err(AgentError::config("metrics_port must differ from listen_port"));
        }

        Ok(())
    }

    /// Telemetry configuration derived from the `[telemetry]` section.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let builder = TelemetryConfig::builder()
            .log_level(self.telemetry.log_level.clone())
            .json_logs(self.telemetry.json_logs);

        if self.telemetry.metrics_enabled {
            builder.metrics_addr(self.metrics_addr()).build()
        } else {
            builder.without_metrics().build()
        }
    }

    /// Metrics listener address: the agent's listen IP on `metrics_port`.
    ///
    /// IPv6 addresses come out bracketed. An unparsable listen address is
    /// passed through for `validate` or the exporter to reject.
    fn metrics_addr(&self) -> String {
        match self.agent.socket_addr() {
            Ok(addr) => SocketAddr::new(addr.ip(), self.telemetry.metrics_port).to_string(),
            Err(_) => format!("{}:{}", self.agent.listen_addr, self.telemetry.metrics_port),
        }
    }
}

fn apply_parsed<T>(name: &str, raw: &str, target: &mut T)
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw.parse() {
        Ok(value) => *target = value,
        Err(e) => warn!(
            variable = %format!("{ENV_PREFIX}{name}"),
            value = raw,
            error = %e,
            "Ignoring invalid override"
        ),
    }
}

/// The `[agent]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port to listen on.
    pub listen_port: u16,
    /// How failures are surfaced to callers.
    pub failure_mode: FailureMode,
    /// Maximum request body size in bytes.
    pub max_request_body_size: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            failure_mode: FailureMode::default(),
            max_request_body_size: DEFAULT_MAX_REQUEST_BODY_SIZE,
        }
    }
}

impl AgentSettings {
    /// Socket address the agent binds to.
    pub fn socket_addr(&self) -> AgentResult<SocketAddr> {
        let ip: IpAddr = self
            .listen_addr
            .trim()
            .parse()
            .map_err(|e| {
                AgentError::config(format!("invalid listen address {:?}: {e}", self.listen_addr))
            })?;
        Ok(SocketAddr::new(ip, self.listen_port))
    }
}

/// The `[telemetry]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Log filter directive.
    pub log_level: String,
    /// JSON log output.
    pub json_logs: bool,
    /// Serve Prometheus metrics.
    pub metrics_enabled: bool,
    /// Prometheus metrics port.
    pub metrics_port: u16,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.agent.listen_addr = addr.into();
        self
    }

    /// Set the listen port.
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.agent.listen_port = port;
        self
    }

    /// Set the failure mode.
    #[must_use]
    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.config.agent.failure_mode = mode;
        self
    }

    /// Set the request body limit.
    #[must_use]
    pub fn max_request_body_size(mut self, bytes: usize) -> Self {
        self.config.agent.max_request_body_size = bytes;
        self
    }

    /// Select the runtime backend.
    #[must_use]
    pub fn runtime(mut self, kind: RuntimeKind) -> Self {
        self.config.runtime.kind = kind;
        self
    }

    /// Replace the default proxy.
    #[must_use]
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = proxy;
        self
    }

    /// Disable the metrics listener.
    #[must_use]
    pub fn without_metrics(mut self) -> Self {
        self.config.telemetry.metrics_enabled = false;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> AgentResult<AgentConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
