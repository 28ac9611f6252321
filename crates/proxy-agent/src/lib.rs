//! Proxy Agent - node-local sidecar proxy lifecycle service
//!
//! The agent runs on every node and lets a control plane start, stop and probe
//! a workload's sidecar proxy independently of pod creation order. It does no
//! container work itself: each request is decoded and handed, once, to a
//! [`RuntimeBackend`](proxy_agent_core::RuntimeBackend).
//!
//! # Endpoints
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | POST | `/start` | `{"workload": ..}` | empty |
//! | POST | `/stop` | `{"workload": ..}` | empty |
//! | POST | `/readiness` | `{"workload": ..}` | `{"ready": bool}` |
//! | GET | `/healthz` | - | agent liveness |
//! | GET | `/version` | - | agent version |
//!
//! Backend and decode failures are logged and, by default, still answered
//! with 200. Set `failure_mode = "report"` to surface them as status codes.
//!
//! # Example Usage
//!
//! ```bash
//! $ proxy-agent --config /etc/proxy-agent/agent.toml
//!
//! $ PROXY_AGENT_RUNTIME=memory PROXY_AGENT_LISTEN_PORT=22222 proxy-agent
//! ```

#![doc(html_root_url = "https://docs.rs/proxy-agent/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod router;
pub mod server;
pub mod shutdown;

pub use config::{AgentConfig, AgentConfigBuilder, AgentSettings, FailureMode};
pub use error::{AgentError, AgentResult, ErrorResponse};
pub use server::Agent;
pub use shutdown::ShutdownSignal;

/// Agent version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
