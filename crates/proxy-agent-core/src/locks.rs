//! Per-workload mutual exclusion for runtime backends.
//!
//! The dispatcher forwards racing start/stop/readiness calls for the same
//! workload straight to the backend. Backends that need those calls to be
//! linearizable take a [`WorkloadGuard`] for the workload key first; calls for
//! different keys never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Registry of async mutexes keyed by workload.
///
/// An entry lives only while some caller holds or waits on it. The last
/// [`WorkloadGuard`] to drop removes it, so probing or starting many distinct
/// workloads leaves nothing behind.
#[derive(Debug, Default)]
pub struct WorkloadLocks {
    locks: Arc<LockMap>,
}

impl WorkloadLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &str) -> WorkloadGuard {
        // Clone the Arc out before awaiting so no shard lock is held across the await.
        let lock = self.entry(key);
        let guard = lock.lock_owned().await;
        self.guard(key, guard)
    }

    /// Try to take `key` without waiting.
    pub fn try_acquire(&self, key: &str) -> Option<WorkloadGuard> {
        let lock = self.entry(key);
        match lock.try_lock_owned() {
            Ok(guard) => Some(self.guard(key, guard)),
            Err(_) => {
                // The holder's guard removes the entry when it drops.
                None
            }
        }
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(key.to_owned()).or_default().value())
    }

    fn guard(&self, key: &str, guard: OwnedMutexGuard<()>) -> WorkloadGuard {
        WorkloadGuard {
            key: key.to_owned(),
            guard: Some(guard),
            registry: Arc::clone(&self.locks),
        }
    }
}

/// Exclusive access to one workload; released on drop.
#[derive(Debug)]
pub struct WorkloadGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Arc<LockMap>,
}

impl WorkloadGuard {
    /// Workload key this guard protects.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for WorkloadGuard {
    fn drop(&mut self) {
        // Unlock first so the mutex Arc is only referenced by the map and by
        // callers still waiting on it.
        drop(self.guard.take());
        self.registry
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
