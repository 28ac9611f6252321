//! Test fixtures for proxy agent development and testing.
//!
//! [`RecordingRuntime`] is a scripted [`RuntimeBackend`] that records every
//! call it receives. It is used by the dispatcher tests to check that each
//! request reaches the backend exactly once, with exactly the decoded value.
//!
//! # Example
//!
//! ```
//! use proxy_agent_core::fixtures::RecordingRuntime;
//! use proxy_agent_core::{RuntimeError, RuntimeBackend, StopRequest, WorkloadRef};
//!
//! # tokio_test::block_on(async {
//! let runtime = RecordingRuntime::new().fail_stop(RuntimeError::not_found("w1"));
//! let result = runtime.stop_proxy(&StopRequest::new(WorkloadRef::new("w1"))).await;
//!
//! assert!(result.is_err());
//! assert_eq!(runtime.stop_calls().len(), 1);
//! # });
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Barrier;

use crate::error::{RuntimeError, RuntimeResult};
use crate::request::{ReadinessRequest, StartRequest, StopRequest};
use crate::runtime::{Readiness, RuntimeBackend};

/// Scripted backend that records calls.
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    starts: Mutex<Vec<StartRequest>>,
    stops: Mutex<Vec<StopRequest>>,
    probes: Mutex<Vec<ReadinessRequest>>,
    start_failure: Option<RuntimeError>,
    stop_failure: Option<RuntimeError>,
    readiness: Option<Readiness>,
    start_barrier: Option<Arc<Barrier>>,
}

impl RecordingRuntime {
    /// Create a backend where every operation succeeds and probes report not ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every start fail with `error`.
    #[must_use]
    pub fn fail_start(mut self, error: RuntimeError) -> Self {
        self.start_failure = Some(error);
        self
    }

    /// Make every stop fail with `error`.
    #[must_use]
    pub fn fail_stop(mut self, error: RuntimeError) -> Self {
        self.stop_failure = Some(error);
        self
    }

    /// Answer every probe with `readiness`.
    #[must_use]
    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Make every start wait on `barrier` before returning.
    ///
    /// With a barrier sized for N parties, N concurrent starts only complete
    /// if none of them blocks the others.
    #[must_use]
    pub fn with_start_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.start_barrier = Some(barrier);
        self
    }

    /// Recorded start requests, in arrival order.
    pub fn start_calls(&self) -> Vec<StartRequest> {
        self.starts.lock().clone()
    }

    /// Recorded stop requests, in arrival order.
    pub fn stop_calls(&self) -> Vec<StopRequest> {
        self.stops.lock().clone()
    }

    /// Recorded readiness requests, in arrival order.
    pub fn probe_calls(&self) -> Vec<ReadinessRequest> {
        self.probes.lock().clone()
    }

    /// Total number of backend calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.starts.lock().len() + self.stops.lock().len() + self.probes.lock().len()
    }
}

#[async_trait]
impl RuntimeBackend for RecordingRuntime {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn start_proxy(&self, request: &StartRequest) -> RuntimeResult<()> {
        self.starts.lock().push(request.clone());

        if let Some(barrier) = &self.start_barrier {
            barrier.wait().await;
        }

        match &self.start_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn stop_proxy(&self, request: &StopRequest) -> RuntimeResult<()> {
        self.stops.lock().push(request.clone());

        match &self.stop_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn is_ready(&self, request: &ReadinessRequest) -> Readiness {
        self.probes.lock().push(request.clone());
        self.readiness.clone().unwrap_or_else(Readiness::not_ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::WorkloadRef;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let runtime = RecordingRuntime::new();
        runtime
            .start_proxy(&StartRequest::new(WorkloadRef::new("a")))
            .await
            .unwrap();
        runtime
            .start_proxy(&StartRequest::new(WorkloadRef::new("b")))
            .await
            .unwrap();

        let starts = runtime.start_calls();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0].target.workload, "a");
        assert_eq!(starts[1].target.workload, "b");
        assert_eq!(runtime.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_readiness() {
        let runtime = RecordingRuntime::new().with_readiness(Readiness::with_failure(
            true,
            RuntimeError::timeout("probe", std::time::Duration::from_secs(1)),
        ));

        let readiness = runtime
            .is_ready(&ReadinessRequest::new(WorkloadRef::new("w1")))
            .await;
        assert!(readiness.ready);
        assert!(readiness.is_failure());
        assert_eq!(runtime.probe_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_default_readiness_is_not_ready() {
        let runtime = RecordingRuntime::new();
        let readiness = runtime
            .is_ready(&ReadinessRequest::new(WorkloadRef::new("w1")))
            .await;
        assert_eq!(readiness, Readiness::not_ready());
    }

    #[tokio::test]
    async fn test_scripted_start_failure() {
        let runtime = RecordingRuntime::new().fail_start(RuntimeError::unavailable("down"));
        let result = runtime
            .start_proxy(&StartRequest::new(WorkloadRef::new("w1")))
            .await;
        assert_eq!(result, Err(RuntimeError::unavailable("down")));
    }
}
