//! Error types for the proxy agent core.
//!
//! Two families of errors cross the runtime boundary:
//!
//! | Type | Raised by | Meaning |
//! |---|---|---|
//! | [`DecodeError`] | the dispatcher | the request body could not become a typed request |
//! | [`RuntimeError`] | a [`RuntimeBackend`] | the backend could not carry out the operation |
//!
//! The dispatcher never interprets a [`RuntimeError`] beyond logging it and
//! mapping it to a status code; retry policy belongs to the backend.
//!
//! [`RuntimeBackend`]: crate::RuntimeBackend

use std::time::Duration;

use thiserror::Error;

/// Result type for runtime backend operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Failure reported by a runtime backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// No proxy exists for the workload.
    #[error("no proxy found for workload {workload}")]
    WorkloadNotFound {
        /// Workload key.
        workload: String,
    },

    /// A proxy exists for the workload and the backend refuses to replace it.
    #[error("proxy for workload {workload} already exists: {message}")]
    AlreadyExists {
        /// Workload key.
        workload: String,
        /// Error message.
        message: String,
    },

    /// The container runtime could not be reached.
    #[error("runtime unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// The runtime did not answer in time.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Time waited before giving up.
        elapsed: Duration,
    },

    /// The resolved proxy specification was rejected by the runtime.
    #[error("invalid proxy specification: {message}")]
    InvalidSpec {
        /// Error message.
        message: String,
    },

    /// Any other backend failure.
    #[error("runtime error: {message}")]
    Backend {
        /// Error message.
        message: String,
    },
}

impl RuntimeError {
    /// Create a workload-not-found error.
    pub fn not_found(workload: impl Into<String>) -> Self {
        Self::WorkloadNotFound {
            workload: workload.into(),
        }
    }

    /// Create an already-exists error.
    pub fn already_exists(workload: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            workload: workload.into(),
            message: message.into(),
        }
    }

    /// Create a runtime-unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    /// Create an invalid-spec error.
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }

    /// Create a generic backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Get the HTTP status code used when failures are reported to callers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::WorkloadNotFound { .. } => 404,
            Self::AlreadyExists { .. } => 409,
            Self::Unavailable { .. } => 503,
            Self::Timeout { .. } => 504,
            Self::InvalidSpec { .. } | Self::Backend { .. } => 500,
        }
    }

    /// Get the error category for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::WorkloadNotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "conflict",
            Self::Unavailable { .. } => "unavailable",
            Self::Timeout { .. } => "timeout",
            Self::InvalidSpec { .. } => "invalid_spec",
            Self::Backend { .. } => "backend",
        }
    }
}

/// Failure turning a request body into a typed request.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not valid JSON for the request type.
    #[error("malformed request body: {0}")]
    Json(#[from] serde_json::Error),

    /// The body decoded but names no workload.
    #[error("request does not identify a workload")]
    MissingWorkload,

    /// A workload or namespace is not a valid Kubernetes object name.
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidName {
        /// `workload` or `namespace`.
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Which naming rule it breaks.
        reason: &'static str,
    },

    /// The body exceeded the configured size limit.
    #[error("request body exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The body could not be read from the connection.
    #[error("failed to read request body: {message}")]
    Body {
        /// Error message.
        message: String,
    },
}

impl DecodeError {
    /// Create a body read error.
    pub fn body(message: impl Into<String>) -> Self {
        Self::Body {
            message: message.into(),
        }
    }

    /// Get the HTTP status code used when failures are reported to callers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::TooLarge { .. } => 413,
            Self::Json(_)
            | Self::MissingWorkload
            | Self::InvalidName { .. }
            | Self::Body { .. } => 400,
        }
    }

    /// Get the error category for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Json(_) => "malformed",
            Self::MissingWorkload => "missing_workload",
            Self::InvalidName { .. } => "invalid_name",
            Self::TooLarge { .. } => "too_large",
            Self::Body { .. } => "body",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_status_codes() {
        assert_eq!(RuntimeError::not_found("w1").status_code(), 404);
        assert_eq!(RuntimeError::already_exists("w1", "running").status_code(), 409);
        assert_eq!(RuntimeError::unavailable("socket closed").status_code(), 503);
        assert_eq!(
            RuntimeError::timeout("start", Duration::from_secs(5)).status_code(),
            504
        );
        assert_eq!(RuntimeError::invalid_spec("odd args").status_code(), 500);
        assert_eq!(RuntimeError::backend("boom").status_code(), 500);
    }

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError::not_found("default/w1");
        assert_eq!(err.to_string(), "no proxy found for workload default/w1");

        let err = RuntimeError::unavailable("connection refused");
        assert!(err.to_string().contains("runtime unavailable"));
    }

    #[test]
    fn test_runtime_error_category() {
        assert_eq!(RuntimeError::not_found("w").category(), "not_found");
        assert_eq!(RuntimeError::backend("x").category(), "backend");
    }

    #[test]
    fn test_decode_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{\"workload\":").unwrap_err();
        let err: DecodeError = json_err.into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "malformed");
    }

    #[test]
    fn test_decode_error_too_large() {
        let err = DecodeError::TooLarge { limit: 16 };
        assert_eq!(err.status_code(), 413);
        assert_eq!(err.to_string(), "request body exceeds 16 bytes");
    }
}
