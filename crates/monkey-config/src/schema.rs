//! Configuration schema types.
//!
//! This module defines the sections every application configuration carries:
//! the server factory, logging and metrics.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Which server factory to build, and its settings.
///
/// Selected by the `type` key:
///
/// ```toml
/// [server]
/// type = "simple"
/// addr = "0.0.0.0:8080"
/// admin_context_path = "/admin"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFactoryConfig {
    /// Separate application and admin connectors.
    Default(DefaultServerConfig),
    /// One connector; admin endpoints under a path prefix.
    Simple(SimpleServerConfig),
    /// No connectors. Useful for workers and tests.
    Noop,
}

impl Default for ServerFactoryConfig {
    fn default() -> Self {
        Self::Default(DefaultServerConfig::default())
    }
}

impl ServerFactoryConfig {
    /// The factory name (`default`, `simple` or `noop`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Default(_) => "default",
            Self::Simple(_) => "simple",
            Self::Noop => "noop",
        }
    }

    /// Graceful shutdown timeout. Zero for `noop`.
    pub fn shutdown_timeout(&self) -> Duration {
        match self {
            Self::Default(config) => Duration::from_secs(config.shutdown_timeout_secs),
            Self::Simple(config) => Duration::from_secs(config.shutdown_timeout_secs),
            Self::Noop => Duration::ZERO,
        }
    }

    /// Checks addresses and paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Default(config) => {
                let app = parse_addr("server.application_addr", &config.application_addr)?;
                let admin = parse_addr("server.admin_addr", &config.admin_addr)?;
                if app == admin && app.port() != 0 {
                    return Err(ConfigError::invalid_value(
                        "server.admin_addr",
                        "must differ from server.application_addr",
                    ));
                }
            }
            Self::Simple(config) => {
                parse_addr("server.addr", &config.addr)?;
                let path = &config.admin_context_path;
                if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') {
                    return Err(ConfigError::invalid_value(
                        "server.admin_context_path",
                        format!("must look like \"/admin\", got {path:?}"),
                    ));
                }
            }
            Self::Noop => {}
        }
        Ok(())
    }
}

fn parse_addr(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid_value(field, format!("invalid socket address: {value}")))
}

/// Settings for the `default` server factory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DefaultServerConfig {
    /// Application connector bind address.
    #[serde(default = "default_application_addr")]
    pub application_addr: String,

    /// Admin connector bind address.
    #[serde(default = "default_admin_addr")]
    pub admin_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for DefaultServerConfig {
    fn default() -> Self {
        Self {
            application_addr: default_application_addr(),
            admin_addr: default_admin_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Settings for the `simple` server factory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SimpleServerConfig {
    /// Connector bind address.
    #[serde(default = "default_application_addr")]
    pub addr: String,

    /// Path prefix the admin endpoints are served under.
    #[serde(default = "default_admin_context_path")]
    pub admin_context_path: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SimpleServerConfig {
    fn default() -> Self {
        Self {
            addr: default_application_addr(),
            admin_context_path: default_admin_context_path(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_application_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_admin_addr() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_admin_context_path() -> String {
    "/admin".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
///
/// Unset fields fall back to the run mode's defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g. `info` or `info,my_app=debug`).
    #[serde(default)]
    pub level: Option<String>,

    /// Output format.
    #[serde(default)]
    pub format: Option<LogFormat>,

    /// Include ANSI color codes in pretty output.
    #[serde(default = "default_true")]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: None,
            format: None,
            ansi_enabled: true,
            include_location: false,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Histogram bucket boundaries, in seconds.
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

impl MetricsConfig {
    /// Checks bucket boundaries are non-empty and strictly increasing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.histogram_buckets.is_empty() {
            return Err(ConfigError::invalid_value(
                "metrics.histogram_buckets",
                "must not be empty",
            ));
        }
        if self.histogram_buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::invalid_value(
                "metrics.histogram_buckets",
                "must be strictly increasing",
            ));
        }
        Ok(())
    }
}

fn default_histogram_buckets() -> Vec<f64> {
    vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

fn default_true() -> bool {
    true
}
