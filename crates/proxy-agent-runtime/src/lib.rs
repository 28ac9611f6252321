//! # Proxy Agent Runtime
//!
//! Concrete [`RuntimeBackend`] implementations for the proxy agent.
//!
//! - [`DockerRuntime`] - Proxy containers managed through the Docker Engine API
//! - [`InMemoryRuntime`] - Bookkeeping only, for dry runs and tests
//!
//! The agent picks one at startup from [`RuntimeSettings::kind`] and drives it
//! through the [`Runtime`] enum.
//!
//! ```
//! use std::sync::Arc;
//!
//! use proxy_agent_core::{ProxyConfig, RuntimeBackend};
//! use proxy_agent_runtime::{Runtime, RuntimeKind, RuntimeSettings};
//!
//! # tokio_test::block_on(async {
//! let settings = RuntimeSettings {
//!     kind: RuntimeKind::Memory,
//!     ..RuntimeSettings::default()
//! };
//! let runtime = Runtime::connect(&settings, Arc::new(ProxyConfig::default())).await.unwrap();
//! assert_eq!(runtime.name(), "memory");
//! # });
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod docker;
pub mod memory;
mod settings;

use std::sync::Arc;

use async_trait::async_trait;
use proxy_agent_core::{
    ProxyConfig, Readiness, ReadinessRequest, RuntimeBackend, RuntimeResult, StartRequest,
    StopRequest,
};

pub use docker::DockerRuntime;
pub use memory::{InMemoryRuntime, ProxyInstance};
pub use settings::{DockerSettings, MemorySettings, RuntimeKind, RuntimeSettings};

/// The backend selected by configuration.
#[derive(Debug)]
pub enum Runtime {
    /// Docker Engine backend.
    Docker(DockerRuntime),
    /// In-memory backend.
    Memory(InMemoryRuntime),
}

impl Runtime {
    /// Build the backend named by `settings.kind`.
    ///
    /// The Docker variant pings the daemon and fails if it is unreachable.
    pub async fn connect(
        settings: &RuntimeSettings,
        defaults: Arc<ProxyConfig>,
    ) -> RuntimeResult<Self> {
        match settings.kind {
            RuntimeKind::Docker => DockerRuntime::connect(&settings.docker, defaults)
                .await
                .map(Self::Docker),
            RuntimeKind::Memory => Ok(Self::Memory(InMemoryRuntime::new(
                &settings.memory,
                defaults,
            ))),
        }
    }

    /// Which variant this is.
    pub fn kind(&self) -> RuntimeKind {
        match self {
            Self::Docker(_) => RuntimeKind::Docker,
            Self::Memory(_) => RuntimeKind::Memory,
        }
    }
}

#[async_trait]
impl RuntimeBackend for Runtime {
    fn name(&self) -> &'static str {
        match self {
            Self::Docker(runtime) => runtime.name(),
            Self::Memory(runtime) => runtime.name(),
        }
    }

    async fn start_proxy(&self, request: &StartRequest) -> RuntimeResult<()> {
        match self {
            Self::Docker(runtime) => runtime.start_proxy(request).await,
            Self::Memory(runtime) => runtime.start_proxy(request).await,
        }
    }

    async fn stop_proxy(&self, request: &StopRequest) -> RuntimeResult<()> {
        match self {
            Self::Docker(runtime) => runtime.stop_proxy(request).await,
            Self::Memory(runtime) => runtime.stop_proxy(request).await,
        }
    }

    async fn is_ready(&self, request: &ReadinessRequest) -> Readiness {
        match self {
            Self::Docker(runtime) => runtime.is_ready(request).await,
            Self::Memory(runtime) => runtime.is_ready(request).await,
        }
    }
}
