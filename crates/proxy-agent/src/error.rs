//! Error types for the proxy agent.

use std::fmt;

use proxy_agent_core::{DecodeError, RuntimeError};
use thiserror::Error;

/// Agent-level errors.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Server startup or accept-loop error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// Request body could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Runtime backend failure.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config { .. } => 500,
            Self::Server { .. } => 500,
            Self::Decode(e) => e.status_code(),
            Self::Runtime(e) => e.status_code(),
            Self::Io(_) => 500,
            Self::Json(_) => 500,
        }
    }

    /// Get the error category for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Server { .. } => "server",
            Self::Decode(e) => e.category(),
            Self::Runtime(e) => e.category(),
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// JSON body returned for failures when they are reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Error category.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Set the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<&AgentError> for ErrorResponse {
    fn from(err: &AgentError) -> Self {
        Self::new(err.category(), err.to_string())
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error, self.message)
    }
}
