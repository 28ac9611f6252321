//! Request and response bodies for the agent endpoints.
//!
//! The JSON shapes are owned by the control plane; the agent only needs the
//! semantic fields below and ignores anything else it is sent.
//!
//! ```
//! use proxy_agent_core::{decode, StartRequest};
//!
//! let request: StartRequest = decode(br#"{"workload":"w1","namespace":"default"}"#).unwrap();
//! assert_eq!(request.target.key(), "default/w1");
//! assert!(request.proxy.is_none());
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::proxy_config::ProxySpec;

/// Identity of the single workload a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRef {
    /// Workload (pod) name.
    pub workload: String,
    /// Pod namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Pod IP, used by backends that probe the proxy status port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_ip: Option<String>,
    /// Pod sandbox (infra container) the proxy joins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<String>,
}

impl WorkloadRef {
    /// Create a reference to a workload by name.
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
            namespace: None,
            pod_ip: None,
            sandbox_id: None,
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the pod IP.
    #[must_use]
    pub fn with_pod_ip(mut self, pod_ip: impl Into<String>) -> Self {
        self.pod_ip = Some(pod_ip.into());
        self
    }

    /// Set the pod sandbox ID.
    #[must_use]
    pub fn with_sandbox_id(mut self, sandbox_id: impl Into<String>) -> Self {
        self.sandbox_id = Some(sandbox_id.into());
        self
    }

    /// Key identifying the workload across requests: `namespace/workload`,
    /// or the bare workload name when no namespace is given.
    pub fn key(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{ns}/{}", self.workload),
            _ => self.workload.clone(),
        }
    }

    /// Check the names can be keyed without collisions.
    ///
    /// The workload must be a DNS-1123 subdomain and the namespace a
    /// DNS-1123 label, as Kubernetes requires of pods and namespaces. Neither
    /// may contain `/`, so `namespace/workload` keys are unambiguous.
    fn validate(&self) -> Result<(), DecodeError> {
        if self.workload.trim().is_empty() {
            return Err(DecodeError::MissingWorkload);
        }
        check_name("workload", &self.workload, MAX_SUBDOMAIN_LEN, true)?;
        if let Some(ns) = self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            check_name("namespace", ns, MAX_LABEL_LEN, false)?;
        }
        Ok(())
    }
}

const MAX_LABEL_LEN: usize = 63;
const MAX_SUBDOMAIN_LEN: usize = 253;

fn check_name(
    field: &'static str,
    value: &str,
    max_len: usize,
    allow_dots: bool,
) -> Result<(), DecodeError> {
    let invalid = |reason| DecodeError::InvalidName {
        field,
        value: value.to_owned(),
        reason,
    };

    if value.len() > max_len {
        return Err(invalid("name too long"));
    }
    let allowed = |c: char| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || (allow_dots && c == '.')
    };
    if !value.chars().all(allowed) {
        return Err(invalid(if allow_dots {
            "only lowercase letters, digits, '-' and '.' are allowed"
        } else {
            "only lowercase letters, digits and '-' are allowed"
        }));
    }

    let alphanumeric = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let segments_ok = value.split('.').all(|segment| {
        segment.starts_with(alphanumeric) && segment.ends_with(alphanumeric)
    });
    if !segments_ok {
        return Err(invalid("must start and end with a letter or digit"));
    }
    Ok(())
}

/// A request naming exactly one workload.
pub trait WorkloadRequest {
    /// The targeted workload.
    fn target(&self) -> &WorkloadRef;
}

/// Ask the backend to start a sidecar proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Targeted workload.
    #[serde(flatten)]
    pub target: WorkloadRef,
    /// Per-request overrides of the default proxy configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxySpec>,
}

impl StartRequest {
    /// Create a start request relying on proxy defaults.
    pub fn new(target: WorkloadRef) -> Self {
        Self {
            target,
            proxy: None,
        }
    }

    /// Attach an explicit proxy specification.
    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxySpec) -> Self {
        self.proxy = Some(proxy);
        self
    }
}

impl WorkloadRequest for StartRequest {
    fn target(&self) -> &WorkloadRef {
        &self.target
    }
}

/// Ask the backend to tear down a sidecar proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRequest {
    /// Targeted workload.
    #[serde(flatten)]
    pub target: WorkloadRef,
}

impl StopRequest {
    /// Create a stop request.
    pub fn new(target: WorkloadRef) -> Self {
        Self { target }
    }
}

impl WorkloadRequest for StopRequest {
    fn target(&self) -> &WorkloadRef {
        &self.target
    }
}

/// Ask the backend whether a sidecar proxy is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessRequest {
    /// Targeted workload.
    #[serde(flatten)]
    pub target: WorkloadRef,
}

impl ReadinessRequest {
    /// Create a readiness request.
    pub fn new(target: WorkloadRef) -> Self {
        Self { target }
    }
}

impl WorkloadRequest for ReadinessRequest {
    fn target(&self) -> &WorkloadRef {
        &self.target
    }
}

/// Probe answer. There is deliberately no "unknown" state: a failed probe
/// reports whatever boolean the backend returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether the proxy is ready to serve traffic.
    pub ready: bool,
}

/// Decode a JSON body into a typed request and check it names a workload.
pub fn decode<T>(body: &[u8]) -> Result<T, DecodeError>
where
    T: DeserializeOwned + WorkloadRequest,
{
    let request: T = serde_json::from_slice(body)?;
    request.target().validate()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy_config::InterceptionMode;

    #[test]
    fn test_decode_minimal_start() {
        let request: StartRequest = decode(br#"{"workload":"w1"}"#).unwrap();
        assert_eq!(request, StartRequest::new(WorkloadRef::new("w1")));
        assert_eq!(request.target.key(), "w1");
    }

    #[test]
    fn test_decode_full_start() {
        let body = br#"{
            "workload": "details-v1",
            "namespace": "bookinfo",
            "podIp": "10.1.2.3",
            "sandboxId": "abc123",
            "proxy": {
                "image": "istio/proxyv2:1.20",
                "runAsUser": 1000,
                "interceptionMode": "TPROXY"
            }
        }"#;

        let request: StartRequest = decode(body).unwrap();
        assert_eq!(request.target.key(), "bookinfo/details-v1");
        assert_eq!(request.target.pod_ip.as_deref(), Some("10.1.2.3"));
        assert_eq!(request.target.sandbox_id.as_deref(), Some("abc123"));

        let proxy = request.proxy.unwrap();
        assert_eq!(proxy.image.as_deref(), Some("istio/proxyv2:1.20"));
        assert_eq!(proxy.run_as_user, Some(1000));
        assert_eq!(proxy.interception_mode, Some(InterceptionMode::Tproxy));
        assert!(proxy.args.is_none());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let request: StopRequest =
            decode(br#"{"workload":"w1","podName":"w1-abc","extra":[1,2]}"#).unwrap();
        assert_eq!(request.target.workload, "w1");
    }

    #[test]
    fn test_decode_truncated_body() {
        let err = decode::<StartRequest>(br#"{"workload":"#).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_decode_missing_workload_field() {
        let err = decode::<ReadinessRequest>(br#"{"namespace":"default"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_decode_blank_workload() {
        let err = decode::<StopRequest>(br#"{"workload":"  "}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingWorkload));
    }

    #[test]
    fn test_decode_rejects_names_that_collide_on_key() {
        // Without validation both of these would key as "default/w1".
        let err = decode::<StopRequest>(br#"{"workload":"default/w1"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidName { field: "workload", .. }));

        let err =
            decode::<StopRequest>(br#"{"workload":"w1","namespace":"team/a"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidName { field: "namespace", .. }));

        let ok: StopRequest = decode(br#"{"workload":"w1","namespace":"default"}"#).unwrap();
        assert_eq!(ok.target.key(), "default/w1");
    }

    #[test]
    fn test_decode_enforces_dns_names() {
        for body in [
            br#"{"workload":"W1"}"#.as_slice(),
            br#"{"workload":"w_1"}"#,
            br#"{"workload":"-w1"}"#,
            br#"{"workload":"w1."}"#,
            br#"{"workload":"w1","namespace":"bookinfo.prod"}"#,
        ] {
            let err = decode::<ReadinessRequest>(body).unwrap_err();
            assert_eq!(err.category(), "invalid_name");
            assert_eq!(err.status_code(), 400);
        }

        let long = format!(r#"{{"workload":"{}"}}"#, "a".repeat(254));
        assert!(decode::<ReadinessRequest>(long.as_bytes()).is_err());

        let request: ReadinessRequest = decode(br#"{"workload":"details-v1.abc12"}"#).unwrap();
        assert_eq!(request.target.key(), "details-v1.abc12");
    }

    #[test]
    fn test_empty_namespace_key() {
        let target = WorkloadRef::new("w1").with_namespace("");
        assert_eq!(target.key(), "w1");
    }

    #[test]
    fn test_readiness_response_wire_shape() {
        let json = serde_json::to_string(&ReadinessResponse { ready: true }).unwrap();
        assert_eq!(json, r#"{"ready":true}"#);
    }

    #[test]
    fn test_start_request_serializes_flat() {
        let request = StartRequest::new(WorkloadRef::new("w1").with_pod_ip("10.0.0.1"));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"workload": "w1", "podIp": "10.0.0.1"}));
    }
}
