//! In-memory backend.
//!
//! Tracks proxies in a concurrent map without touching any container
//! runtime. Used for dry runs on nodes without Docker and for exercising the
//! agent end to end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use proxy_agent_core::{
    ProxyConfig, Readiness, ReadinessRequest, RuntimeBackend, RuntimeError, RuntimeResult,
    StartRequest, StopRequest, WorkloadLocks, WorkloadRef,
};
use tracing::{debug, info};

use crate::settings::MemorySettings;

/// A proxy the in-memory backend considers running.
#[derive(Debug, Clone)]
pub struct ProxyInstance {
    /// Workload the proxy belongs to.
    pub target: WorkloadRef,
    /// Configuration resolved at start.
    pub config: ProxyConfig,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    ready_at: Instant,
}

impl ProxyInstance {
    /// Whether the warm-up period has passed.
    pub fn is_ready(&self) -> bool {
        Instant::now() >= self.ready_at
    }
}

/// Backend that keeps proxies in process memory.
///
/// Starting a running proxy succeeds without changes. Stopping an unknown
/// proxy reports [`RuntimeError::WorkloadNotFound`].
#[derive(Debug)]
pub struct InMemoryRuntime {
    proxies: DashMap<String, ProxyInstance>,
    defaults: Arc<ProxyConfig>,
    warmup: Duration,
    locks: WorkloadLocks,
}

impl InMemoryRuntime {
    /// Create an empty backend.
    pub fn new(settings: &MemorySettings, defaults: Arc<ProxyConfig>) -> Self {
        Self {
            proxies: DashMap::new(),
            defaults,
            warmup: settings.warmup,
            locks: WorkloadLocks::new(),
        }
    }

    /// Snapshot of the proxy for a workload key.
    pub fn get(&self, key: &str) -> Option<ProxyInstance> {
        self.proxies.get(key).map(|entry| entry.value().clone())
    }

    /// Number of running proxies.
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Whether no proxy is running.
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[async_trait]
impl RuntimeBackend for InMemoryRuntime {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn start_proxy(&self, request: &StartRequest) -> RuntimeResult<()> {
        let key = request.target.key();
        let _guard = self.locks.acquire(&key).await;

        if self.proxies.contains_key(&key) {
            debug!(workload = %key, "Proxy already running");
            return Ok(());
        }

        let config = self.defaults.resolve(request.proxy.as_ref());
        if config.image().trim().is_empty() {
            return Err(RuntimeError::invalid_spec("proxy image must not be empty"));
        }

        info!(workload = %key, image = config.image(), "Starting in-memory proxy");
        self.proxies.insert(
            key,
            ProxyInstance {
                target: request.target.clone(),
                config,
                started_at: Utc::now(),
                ready_at: Instant::now() + self.warmup,
            },
        );
        Ok(())
    }

    async fn stop_proxy(&self, request: &StopRequest) -> RuntimeResult<()> {
        let key = request.target.key();
        let _guard = self.locks.acquire(&key).await;

        match self.proxies.remove(&key) {
            Some((_, instance)) => {
                info!(
                    workload = %key,
                    started_at = %instance.started_at,
                    "Stopped in-memory proxy"
                );
                Ok(())
            }
            None => Err(RuntimeError::not_found(key)),
        }
    }

    async fn is_ready(&self, request: &ReadinessRequest) -> Readiness {
        let key = request.target.key();
        let _guard = self.locks.acquire(&key).await;

        self.proxies
            .get(&key)
            .map_or_else(Readiness::not_ready, |entry| {
                Readiness::from(entry.is_ready())
            })
    }
}
