//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A source provider has nothing at the requested path.
    #[error("configuration source not found: {path}")]
    NotFound {
        /// Requested path.
        path: String,
    },

    /// A file exists but could not be read.
    #[error("cannot read configuration file {}", path.display())]
    Read {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A source is not valid TOML or JSON.
    #[error("malformed {format} configuration: {message}")]
    Parse {
        /// `toml` or `json`.
        format: &'static str,
        /// Parser message, including the location when known.
        message: String,
    },

    /// The merged layers do not fit the configuration type.
    #[error("configuration does not match its schema: {0}")]
    Mapping(#[from] serde_json::Error),

    /// The path has no `.toml` or `.json` extension, or the format name is
    /// unknown.
    #[error("unsupported configuration format: {format}")]
    UnsupportedFormat {
        /// The rejected path or format name.
        format: String,
    },

    /// A value was read but is not acceptable.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `server.admin_addr`.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A `PREFIX__SECTION__KEY` variable could not be applied.
    #[error("cannot apply environment override {var}: {reason}")]
    EnvOverride {
        /// The variable name.
        var: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A `${VAR}` reference had no value and no default.
    #[error("undefined variable in configuration: ${{{name}}}")]
    UndefinedVariable {
        /// The variable name.
        name: String,
    },
}

impl ConfigError {
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(format: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Parse {
            format,
            message: error.to_string().trim_end().to_string(),
        }
    }

    pub(crate) fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Rejects the value of `field`.
    ///
    /// Used by [`Configuration::validate`](crate::Configuration::validate).
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env_override(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvOverride {
            var: var.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn undefined_variable(name: impl Into<String>) -> Self {
        Self::UndefinedVariable { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_names_field() {
        let err = ConfigError::invalid_value("server.application_addr", "not a valid address");
        assert_eq!(
            err.to_string(),
            "invalid configuration value for server.application_addr: not a valid address"
        );
    }

    #[test]
    fn test_parse_error_keeps_format() {
        let toml_err = toml::from_str::<toml::Value>("a = ").unwrap_err();
        let err = ConfigError::parse("toml", toml_err);
        assert!(err.to_string().starts_with("malformed toml configuration: "));
        assert!(!err.to_string().ends_with('\n'));
    }

    #[test]
    fn test_env_override_error() {
        let err = ConfigError::env_override("MONKEY__METRICS__ENABLED", "expected boolean");
        assert_eq!(
            err.to_string(),
            "cannot apply environment override MONKEY__METRICS__ENABLED: expected boolean"
        );
    }

    #[test]
    fn test_undefined_variable_error() {
        let err = ConfigError::undefined_variable("DB_URL");
        assert_eq!(
            err.to_string(),
            "undefined variable in configuration: ${DB_URL}"
        );
    }

    #[test]
    fn test_read_error_has_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::read("/etc/shop.toml", io);
        assert!(err.to_string().contains("/etc/shop.toml"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
