//! Structured logging for Monkey applications.
//!
//! Unset fields of [`LoggingConfig`] fall back to the run mode:
//!
//! | Mode   | Level   | Format   |
//! |--------|---------|----------|
//! | `dev`  | `debug` | pretty   |
//! | `test` | `warn`  | pretty   |
//! | `prod` | `info`  | JSON     |
//!
//! # Example
//!
//! ```rust,ignore
//! use monkey_config::LoggingConfig;
//! use monkey_core::Mode;
//! use monkey_telemetry::init_logging;
//!
//! init_logging(&LoggingConfig::default(), Mode::Prod)?;
//! tracing::info!(application = "shop", "Starting");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use monkey_config::{LogFormat, LoggingConfig};
use monkey_core::Mode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Logging settings after mode defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Filter directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// ANSI colors in pretty output.
    pub ansi: bool,
    /// Source file and line in each event.
    pub include_location: bool,
}

impl LogSettings {
    /// Applies `mode` defaults to the unset fields of `config`.
    pub fn resolve(config: &LoggingConfig, mode: Mode) -> Self {
        let default_format = if mode.is_prod() {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        };
        Self {
            level: config
                .level
                .clone()
                .unwrap_or_else(|| mode.default_log_level().to_string()),
            format: config.format.unwrap_or(default_format),
            ansi: config.ansi_enabled,
            include_location: config.include_location,
        }
    }
}

/// Installs the global `tracing` subscriber.
///
/// Does nothing when `config.enabled` is false.
///
/// # Errors
///
/// Returns [`TelemetryError::AlreadyInitialized`] on a second call and
/// [`TelemetryError::LoggingInit`] for an invalid filter or when another
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig, mode: Mode) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }
    if INITIALIZED.load(Ordering::Acquire) {
        return Err(TelemetryError::AlreadyInitialized("logging"));
    }

    let settings = LogSettings::resolve(config, mode);
    let filter = create_env_filter(&settings.level)?;

    let result = match settings.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_file(settings.include_location)
                .with_line_number(settings.include_location)
                .with_target(true)
                .with_filter(filter);
            tracing_subscriber::registry().with(fmt_layer).try_init()
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(settings.ansi)
                .with_file(settings.include_location)
                .with_line_number(settings.include_location)
                .with_target(true)
                .with_filter(filter);
            tracing_subscriber::registry().with(fmt_layer).try_init()
        }
    };
    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    INITIALIZED.store(true, Ordering::Release);
    tracing::debug!(level = %settings.level, mode = %mode, "Logging initialized");
    Ok(())
}

/// Creates an env filter from a directive string.
///
/// # Errors
///
/// Returns error if the filter string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_defaults() {
        let config = LoggingConfig::default();

        let dev = LogSettings::resolve(&config, Mode::Dev);
        assert_eq!(dev.level, "debug");
        assert_eq!(dev.format, LogFormat::Pretty);

        let test = LogSettings::resolve(&config, Mode::Test);
        assert_eq!(test.level, "warn");

        let prod = LogSettings::resolve(&config, Mode::Prod);
        assert_eq!(prod.level, "info");
        assert_eq!(prod.format, LogFormat::Json);
    }

    #[test]
    fn test_config_overrides_mode() {
        let config = LoggingConfig {
            level: Some("info,shop=trace".to_string()),
            format: Some(LogFormat::Pretty),
            include_location: true,
            ..LoggingConfig::default()
        };

        let settings = LogSettings::resolve(&config, Mode::Prod);
        assert_eq!(settings.level, "info,shop=trace");
        assert_eq!(settings.format, LogFormat::Pretty);
        assert!(settings.include_location);
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("info").is_ok());
        assert!(create_env_filter("monkey=debug,hyper=warn").is_ok());
        assert!(create_env_filter("monkey=verbose").is_err());
    }

    #[test]
    fn test_disabled_logging_is_noop() {
        let config = LoggingConfig {
            enabled: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging(&config, Mode::Dev).is_ok());
    }
}
