//! # Proxy Agent Core
//!
//! Core types and traits shared by the proxy agent and its runtime backends.
//!
//! This crate provides the foundational pieces of the agent:
//!
//! - [`StartRequest`], [`StopRequest`], [`ReadinessRequest`] - Typed request bodies,
//!   each naming exactly one workload through a [`WorkloadRef`]
//! - [`ReadinessResponse`] - The `{"ready": bool}` probe answer
//! - [`ProxyConfig`] - Immutable description of the default sidecar proxy
//! - [`RuntimeBackend`] - The capability every container runtime integration implements
//! - [`WorkloadLocks`] - Keyed async mutexes backends use to linearize operations per workload
//! - [`RuntimeError`], [`DecodeError`] - Error taxonomy

#![doc(html_root_url = "https://docs.rs/proxy-agent-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod duration;
mod error;
pub mod fixtures;
mod locks;
mod proxy_config;
mod request;
mod runtime;

pub use error::{DecodeError, RuntimeError, RuntimeResult};
pub use locks::{WorkloadGuard, WorkloadLocks};
pub use proxy_config::{InterceptionMode, ProxyConfig, ProxyConfigBuilder, ProxySpec};
pub use request::{
    decode, ReadinessRequest, ReadinessResponse, StartRequest, StopRequest, WorkloadRef,
    WorkloadRequest,
};
pub use runtime::{Readiness, RuntimeBackend};
