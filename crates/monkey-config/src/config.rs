//! The application configuration contract.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, LoggingConfig, MetricsConfig, ServerFactoryConfig};

/// A typed application configuration.
///
/// Implementors are plain serde structs that carry the three framework
/// sections next to their own fields. `Default` supplies the bottom layer of
/// the [`ConfigLoader`](crate::ConfigLoader).
///
/// # Example
///
/// ```
/// use monkey_config::{
///     ConfigError, Configuration, LoggingConfig, MetricsConfig, ServerFactoryConfig,
/// };
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// #[serde(default, deny_unknown_fields)]
/// struct AppConfig {
///     server: ServerFactoryConfig,
///     logging: LoggingConfig,
///     metrics: MetricsConfig,
///     greeting: String,
/// }
///
/// impl Configuration for AppConfig {
///     fn server(&self) -> &ServerFactoryConfig { &self.server }
///     fn logging(&self) -> &LoggingConfig { &self.logging }
///     fn metrics(&self) -> &MetricsConfig { &self.metrics }
///
///     fn validate(&self) -> Result<(), ConfigError> {
///         self.validate_sections()?;
///         if self.greeting.is_empty() {
///             return Err(ConfigError::invalid_value("greeting", "must not be empty"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Configuration: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// The server factory section.
    fn server(&self) -> &ServerFactoryConfig;

    /// The logging section.
    fn logging(&self) -> &LoggingConfig;

    /// The metrics section.
    fn metrics(&self) -> &MetricsConfig;

    /// Validates the framework sections.
    fn validate_sections(&self) -> Result<(), ConfigError> {
        self.server().validate()?;
        self.metrics().validate()?;
        Ok(())
    }

    /// Validates the whole configuration. Defaults to
    /// [`validate_sections`](Self::validate_sections).
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_sections()
    }
}

/// A configuration with only the framework sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BaseConfig {
    /// Server factory section.
    pub server: ServerFactoryConfig,
    /// Logging section.
    pub logging: LoggingConfig,
    /// Metrics section.
    pub metrics: MetricsConfig,
}

impl Configuration for BaseConfig {
    fn server(&self) -> &ServerFactoryConfig {
        &self.server
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn metrics(&self) -> &MetricsConfig {
        &self.metrics
    }
}
