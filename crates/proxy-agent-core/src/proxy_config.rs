//! Default sidecar proxy configuration.
//!
//! [`ProxyConfig`] describes how the sidecar proxy is launched when a start
//! request does not spell everything out: the image, the positional
//! flag/value argument list, the user the proxy runs as and the traffic
//! interception mode. It is built once at startup and shared read-only.
//!
//! The argument list is expected to be an even-length sequence of flag/value
//! pairs. This layer does not check it; a malformed list surfaces only when a
//! backend hands it to the proxy binary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default proxy image.
pub const DEFAULT_IMAGE: &str = "maistra/proxyv2-centos7:0.8.0";

/// Default user ID the proxy process runs as.
pub const DEFAULT_RUN_AS_USER: i64 = 1337;

/// Default proxy arguments, in order.
pub const DEFAULT_ARGS: &[&str] = &[
    "proxy",
    "sidecar",
    "--domain",
    "myproject.svc.cluster.local",
    "--configPath",
    "/etc/istio/proxy",
    "--binaryPath",
    "/usr/local/bin/envoy",
    "--serviceCluster",
    "details.myproject",
    "--drainDuration",
    "45s",
    "--parentShutdownDuration",
    "1m0s",
    "--discoveryAddress",
    "istio-pilot.istio-system:15010",
    "--zipkinAddress",
    "zipkin.istio-system:9411",
    "--connectTimeout",
    "10s",
    "--proxyAdminPort",
    "15000",
    "--controlPlaneAuthPolicy",
    "NONE",
    "--statusPort",
    "15020",
    "--applicationPorts",
    "9080",
    "--concurrency",
    "1",
];

/// Flag carrying the proxy status (health) port.
pub const STATUS_PORT_FLAG: &str = "--statusPort";

/// How the proxy captures pod traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterceptionMode {
    /// iptables REDIRECT.
    #[default]
    #[serde(rename = "REDIRECT")]
    Redirect,
    /// Transparent proxy mode.
    #[serde(rename = "TPROXY")]
    Tproxy,
    /// No interception.
    #[serde(rename = "NONE")]
    Disabled,
}

impl InterceptionMode {
    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redirect => "REDIRECT",
            Self::Tproxy => "TPROXY",
            Self::Disabled => "NONE",
        }
    }
}

impl fmt::Display for InterceptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterceptionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REDIRECT" => Ok(Self::Redirect),
            "TPROXY" => Ok(Self::Tproxy),
            "NONE" => Ok(Self::Disabled),
            other => Err(format!("unknown interception mode: {other}")),
        }
    }
}

/// Immutable description of the default sidecar proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    image: String,
    args: Vec<String>,
    run_as_user: i64,
    interception_mode: InterceptionMode,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            args: DEFAULT_ARGS.iter().map(|s| (*s).to_string()).collect(),
            run_as_user: DEFAULT_RUN_AS_USER,
            interception_mode: InterceptionMode::default(),
        }
    }
}

impl ProxyConfig {
    /// Create a builder seeded with the defaults.
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::default()
    }

    /// Container image reference.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Ordered proxy arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// User ID the proxy runs as.
    pub fn run_as_user(&self) -> i64 {
        self.run_as_user
    }

    /// Traffic interception mode.
    pub fn interception_mode(&self) -> InterceptionMode {
        self.interception_mode
    }

    /// Value following `flag` in the argument list.
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        let index = self.args.iter().position(|arg| arg == flag)?;
        self.args.get(index + 1).map(String::as_str)
    }

    /// Proxy status port, taken from `--statusPort`.
    pub fn status_port(&self) -> Option<u16> {
        self.arg_value(STATUS_PORT_FLAG)?.parse().ok()
    }

    /// Overlay a request's partial specification on these defaults.
    ///
    /// Fields present in `spec` replace the default field wholesale; an
    /// argument list is never merged element-wise.
    #[must_use]
    pub fn resolve(&self, spec: Option<&ProxySpec>) -> Self {
        let Some(spec) = spec else {
            return self.clone();
        };

        Self {
            image: spec.image.clone().unwrap_or_else(|| self.image.clone()),
            args: spec.args.clone().unwrap_or_else(|| self.args.clone()),
            run_as_user: spec.run_as_user.unwrap_or(self.run_as_user),
            interception_mode: spec.interception_mode.unwrap_or(self.interception_mode),
        }
    }
}

/// Partial proxy specification carried by a start request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    /// Image override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Argument list override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Run-as-user override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    /// Interception mode override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interception_mode: Option<InterceptionMode>,
}

impl ProxySpec {
    /// Whether the spec overrides nothing.
    pub fn is_empty(&self) -> bool {
        self.image.is_none()
            && self.args.is_none()
            && self.run_as_user.is_none()
            && self.interception_mode.is_none()
    }
}

/// Builder for [`ProxyConfig`].
#[derive(Debug, Default)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    /// Set the image.
    #[must_use]
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.image = image.into();
        self
    }

    /// Replace the argument list.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append a flag/value pair.
    #[must_use]
    pub fn arg(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.args.push(flag.into());
        self.config.args.push(value.into());
        self
    }

    /// Set the run-as-user ID.
    #[must_use]
    pub fn run_as_user(mut self, uid: i64) -> Self {
        self.config.run_as_user = uid;
        self
    }

    /// Set the interception mode.
    #[must_use]
    pub fn interception_mode(mut self, mode: InterceptionMode) -> Self {
        self.config.interception_mode = mode;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyConfig {
        self.config
    }
}
