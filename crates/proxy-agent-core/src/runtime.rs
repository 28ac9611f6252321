//! The runtime backend contract.
//!
//! The agent never touches containers itself. Every operation is forwarded,
//! once, to a [`RuntimeBackend`]; the backend owns container creation,
//! polling, cleanup and any retry policy.
//!
//! # Contract
//!
//! Implementations must uphold the following, since the dispatcher imposes
//! no ordering of its own:
//!
//! - **Shared and concurrent.** One instance serves every in-flight request.
//!   It must be internally synchronized.
//! - **Linearizable per workload.** Operations on the same
//!   [`WorkloadRef::key`](crate::WorkloadRef::key) must take effect one at a
//!   time, otherwise the outcome of racing start/stop calls is undefined.
//!   [`WorkloadLocks`](crate::WorkloadLocks) provides the usual way to do this.
//! - **Independent across workloads.** An operation on one workload must not
//!   wait on an operation for another.
//! - **Start on a running proxy** is a backend policy decision: idempotent
//!   success or an explicit [`RuntimeError::AlreadyExists`].
//! - **Stop on a missing proxy** must return promptly, with either success or
//!   [`RuntimeError::WorkloadNotFound`].
//! - **Readiness is read-only.** Probing must not change proxy state.

use async_trait::async_trait;

use crate::error::{RuntimeError, RuntimeResult};
use crate::request::{ReadinessRequest, StartRequest, StopRequest};

/// Outcome of a readiness probe.
///
/// A probe can both answer and fail: `ready` is always what the backend
/// decided, and `failure` records why the answer may be unreliable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Whether the proxy is ready.
    pub ready: bool,
    /// Failure encountered while probing, if any.
    pub failure: Option<RuntimeError>,
}

impl Readiness {
    /// The proxy is ready.
    pub fn ready() -> Self {
        Self {
            ready: true,
            failure: None,
        }
    }

    /// The proxy is cleanly not ready.
    pub fn not_ready() -> Self {
        Self {
            ready: false,
            failure: None,
        }
    }

    /// The probe failed; the proxy is reported not ready.
    pub fn failed(error: RuntimeError) -> Self {
        Self {
            ready: false,
            failure: Some(error),
        }
    }

    /// The probe produced an answer together with a failure.
    pub fn with_failure(ready: bool, error: RuntimeError) -> Self {
        Self {
            ready,
            failure: Some(error),
        }
    }

    /// Whether the probe reported a failure.
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

impl From<bool> for Readiness {
    fn from(ready: bool) -> Self {
        Self {
            ready,
            failure: None,
        }
    }
}

/// Capability implemented by every container runtime integration.
#[async_trait]
pub trait RuntimeBackend: Send + Sync + 'static {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Create and start the sidecar proxy for the request's workload.
    async fn start_proxy(&self, request: &StartRequest) -> RuntimeResult<()>;

    /// Stop and remove the sidecar proxy for the request's workload.
    async fn stop_proxy(&self, request: &StopRequest) -> RuntimeResult<()>;

    /// Probe the sidecar proxy for the request's workload without changing it.
    async fn is_ready(&self, request: &ReadinessRequest) -> Readiness;
}
