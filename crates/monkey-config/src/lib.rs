//! Typed configuration system for Monkey applications.
//!
//! This crate provides a strongly-typed configuration system with support for:
//! - TOML and JSON configuration files
//! - `${VAR}` / `${VAR:-default}` substitution through source providers
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields in the framework sections)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! Applications define their own configuration type and implement
//! [`Configuration`] for it. Every configuration carries three framework
//! sections:
//!
//! - [`ServerFactoryConfig`] - Which server factory to build (`default`, `simple`, `noop`)
//! - [`LoggingConfig`] - Log level and format, defaulting to the run mode's
//! - [`MetricsConfig`] - Prometheus recorder settings
//!
//! [`BaseConfig`] is a ready-made configuration with only those sections.
//!
//! # Example
//!
//! ```no_run
//! use monkey_config::{BaseConfig, ConfigLoader};
//!
//! # fn main() -> Result<(), monkey_config::ConfigError> {
//! let config: BaseConfig = ConfigLoader::new()
//!     .with_file("config.toml")?
//!     .with_env_prefix("MONKEY")
//!     .load()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! type = "default"
//! application_addr = "0.0.0.0:8080"
//! admin_addr = "0.0.0.0:8081"
//! shutdown_timeout_secs = 30
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [metrics]
//! enabled = true
//! ```
//!
//! # Environment Variable Overrides
//!
//! Existing keys can be overridden via environment variables using the
//! format `PREFIX__SECTION__KEY`. For example:
//!
//! - `MONKEY__SERVER__ADMIN_ADDR=127.0.0.1:9081`
//! - `MONKEY__METRICS__ENABLED=false`

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;
pub mod source;
pub mod substitution;

pub use config::{BaseConfig, Configuration};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    DefaultServerConfig, LogFormat, LoggingConfig, MetricsConfig, ServerFactoryConfig,
    SimpleServerConfig,
};
pub use source::{
    ConfigurationSourceProvider, FileConfigurationSourceProvider,
    StaticConfigurationSourceProvider, SubstitutingSourceProvider,
};
pub use substitution::VariableSubstitutor;
