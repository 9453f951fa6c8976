//! The umbrella error returned by commands and the runner.

use monkey_config::ConfigError;
use monkey_core::di::DiError;
use monkey_core::lifecycle::LifecycleError;
use monkey_core::StateError;
use monkey_server::ServerError;
use monkey_telemetry::TelemetryError;
use thiserror::Error;

/// Any failure that aborts a command.
#[derive(Debug, Error)]
pub enum MonkeyError {
    /// The configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Framework state was used out of sequence.
    #[error(transparent)]
    State(#[from] StateError),

    /// The dependency graph could not be committed.
    #[error("dependency injection failed: {0}")]
    Di(#[from] DiError),

    /// Managed components failed to start or stop.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The HTTP server could not be built.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Logging or metrics could not be initialised.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// A bundle's `run` failed.
    #[error("bundle '{bundle}' failed: {source:#}")]
    Bundle {
        /// Bundle name.
        bundle: String,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// The application's `run` failed.
    #[error("application failed: {0:#}")]
    Application(#[source] anyhow::Error),

    /// An I/O failure in the command runner.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other command failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MonkeyError {
    /// Creates a bundle failure.
    pub fn bundle(bundle: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Bundle {
            bundle: bundle.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MonkeyError::bundle("migrations", anyhow::anyhow!("schema locked"));
        assert_eq!(err.to_string(), "bundle 'migrations' failed: schema locked");

        let err = MonkeyError::from(StateError::NotCommitted);
        assert_eq!(err.to_string(), StateError::NotCommitted.to_string());

        let err = MonkeyError::Application(anyhow::anyhow!("no database"));
        assert_eq!(err.to_string(), "application failed: no database");
    }

    #[test]
    fn test_from_config_error() {
        let err: MonkeyError = ConfigError::invalid_value("server.addr", "bad").into();
        assert!(matches!(err, MonkeyError::Config(_)));
    }
}
