//! Runtime backend selection and per-backend settings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which backend the agent drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Docker Engine API over a local socket.
    #[default]
    Docker,
    /// In-process bookkeeping only; no containers are created.
    Memory,
}

impl RuntimeKind {
    /// Configuration name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown runtime kind: {other}")),
        }
    }
}

/// The `[runtime]` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Selected backend.
    pub kind: RuntimeKind,
    /// Docker backend settings.
    pub docker: DockerSettings,
    /// In-memory backend settings.
    pub memory: MemorySettings,
}

/// The `[runtime.docker]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    /// Unix socket path; the platform default is used when unset.
    pub socket: Option<String>,

    /// Timeout for Docker API calls.
    #[serde(with = "proxy_agent_core::duration")]
    pub timeout: Duration,

    /// Prefix of every proxy container name.
    pub container_prefix: String,

    /// Time the proxy gets to exit after SIGTERM before it is killed.
    #[serde(with = "proxy_agent_core::duration")]
    pub stop_grace_period: Duration,

    /// Timeout of a single status port probe.
    #[serde(with = "proxy_agent_core::duration")]
    pub probe_timeout: Duration,

    /// HTTP path probed on the proxy status port.
    pub status_path: String,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            socket: None,
            timeout: Duration::from_secs(30),
            container_prefix: "istio-proxy-".to_string(),
            stop_grace_period: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
            status_path: "/healthz/ready".to_string(),
        }
    }
}

/// The `[runtime.memory]` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Delay between a start and the proxy reporting ready.
    #[serde(with = "proxy_agent_core::duration")]
    pub warmup: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("docker".parse::<RuntimeKind>(), Ok(RuntimeKind::Docker));
        assert_eq!("Memory".parse::<RuntimeKind>(), Ok(RuntimeKind::Memory));
        assert_eq!("in-memory".parse::<RuntimeKind>(), Ok(RuntimeKind::Memory));
        assert!("cri".parse::<RuntimeKind>().is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = RuntimeSettings::default();
        assert_eq!(settings.kind, RuntimeKind::Docker);
        assert_eq!(settings.docker.container_prefix, "istio-proxy-");
        assert_eq!(settings.docker.status_path, "/healthz/ready");
        assert_eq!(settings.memory.warmup, Duration::ZERO);
    }

    #[test]
    fn test_parse_toml_section() {
        let settings: RuntimeSettings = toml::from_str(
            r#"
            kind = "memory"

            [docker]
            socket = "/run/docker.sock"
            stop_grace_period = "3s"
            probe_timeout = "500ms"

            [memory]
            warmup = "1s"
            "#,
        )
        .unwrap();

        assert_eq!(settings.kind, RuntimeKind::Memory);
        assert_eq!(settings.docker.socket.as_deref(), Some("/run/docker.sock"));
        assert_eq!(settings.docker.stop_grace_period, Duration::from_secs(3));
        assert_eq!(settings.docker.probe_timeout, Duration::from_millis(500));
        assert_eq!(settings.docker.timeout, Duration::from_secs(30));
        assert_eq!(settings.memory.warmup, Duration::from_secs(1));
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RuntimeKind::Memory).unwrap(),
            r#""memory""#
        );
    }
}
