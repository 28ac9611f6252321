//! Telemetry setup errors.

use thiserror::Error;

/// Raised while installing the logging subscriber or metrics exporter.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The Prometheus exporter could not be installed.
    #[error("metrics exporter: {0}")]
    MetricsInit(String),

    /// The log filter was invalid or a subscriber is already installed.
    #[error("logging subscriber: {0}")]
    LoggingInit(String),

    /// The metrics listen address did not parse.
    #[error("invalid metrics address {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_subsystem() {
        let err = TelemetryError::MetricsInit("port in use".to_string());
        assert_eq!(err.to_string(), "metrics exporter: port in use");

        let err = TelemetryError::InvalidAddress("nope:99999".to_string());
        assert!(err.to_string().contains("nope:99999"));
    }
}
