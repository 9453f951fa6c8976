//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur during telemetry initialisation.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize metrics.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// The subsystem was already initialised in this process.
    #[error("{0} is already initialized")]
    AlreadyInitialized(&'static str),
}

impl TelemetryError {
    /// Whether this error only reports a repeated initialisation.
    pub fn is_already_initialized(&self) -> bool {
        matches!(self, Self::AlreadyInitialized(_))
    }
}
