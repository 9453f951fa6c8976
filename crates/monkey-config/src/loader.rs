//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::path::Path;

use serde_json::Value;

use crate::source::{ConfigurationSourceProvider, FileConfigurationSourceProvider};
use crate::{ConfigError, Configuration};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (`C::default()`)
/// 2. Configuration sources (TOML or JSON), deep-merged in order
/// 3. Environment variables (`PREFIX__SECTION__KEY`)
///
/// # Example
///
/// ```
/// use monkey_config::{BaseConfig, ConfigLoader, Configuration};
///
/// let toml = r#"
///     [server]
///     type = "simple"
///     addr = "127.0.0.1:3000"
/// "#;
///
/// let config: BaseConfig = ConfigLoader::new()
///     .with_string(toml, "toml")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(config.server().kind(), "simple");
/// ```
#[derive(Debug)]
pub struct ConfigLoader<C> {
    layers: Vec<Value>,
    env_prefix: Option<String>,
    _config: PhantomData<fn() -> C>,
}

impl<C: Configuration> Default for ConfigLoader<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Configuration> ConfigLoader<C> {
    /// Create a new configuration loader starting from `C::default()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            env_prefix: None,
            _config: PhantomData,
        }
    }

    /// Load configuration from a file.
    ///
    /// The format is determined by the file extension (`.toml` or `.json`).
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy();
        self.with_source(&FileConfigurationSourceProvider, &path_str)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file does not exist, silently continues.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration through a source provider.
    ///
    /// The format is determined by the extension of `path`.
    pub fn with_source(
        self,
        provider: &dyn ConfigurationSourceProvider,
        path: &str,
    ) -> Result<Self, ConfigError> {
        let format = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::unsupported_format(path))?;
        if format != "toml" && format != "json" {
            return Err(ConfigError::unsupported_format(path));
        }

        let content = provider.open(path)?;
        tracing::debug!(path, format = %format, "Loaded configuration source");
        self.with_string(&content, &format)
    }

    /// Load configuration from a string.
    ///
    /// `format` is `"toml"` or `"json"`.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content).map_err(|e| ConfigError::parse("toml", e))?,
            "json" => serde_json::from_str(content).map_err(|e| ConfigError::parse("json", e))?,
            _ => return Err(ConfigError::unsupported_format(format)),
        };
        self.layers.push(layer);
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`.
    /// For example, with prefix "MONKEY":
    /// - `MONKEY__SERVER__APPLICATION_ADDR=0.0.0.0:9000`
    /// - `MONKEY__METRICS__ENABLED=false`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
            Err(error) if error.not_found() => {}
            Err(error) => tracing::warn!(error = %error, "Ignoring unreadable .env file"),
        }
        self
    }

    /// Finalize, validate and return the configuration.
    pub fn load(self) -> Result<C, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Finalize without validation.
    pub fn load_unvalidated(self) -> Result<C, ConfigError> {
        let mut merged = serde_json::to_value(C::default())?;
        for layer in self.layers {
            merge(&mut merged, layer);
        }

        if let Some(prefix) = &self.env_prefix {
            apply_env_overrides(&mut merged, prefix, env::vars_os())?;
        }

        Ok(serde_json::from_value(merged)?)
    }
}

/// Deep-merges `overlay` into `base`.
///
/// Objects merge key by key; anything else replaces. An object whose `type`
/// tag differs from the base's replaces it wholesale, since the variants'
/// fields do not mix.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let retagged = match (base_map.get("type"), overlay_map.get("type")) {
                (Some(old), Some(new)) => old != new,
                _ => false,
            };
            if retagged {
                *base_map = overlay_map;
                return;
            }
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Applies `PREFIX__A__B=value` variables onto existing keys of `config`.
///
/// The existing value's JSON type decides how the text is parsed. Variables
/// naming keys that do not exist are ignored, as are variables whose name is
/// not UTF-8. A prefixed variable whose value is not UTF-8 is an error.
fn apply_env_overrides<I, K, V>(
    config: &mut Value,
    prefix: &str,
    vars: I,
) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let marker = format!("{prefix}__");
    let mut overrides = Vec::new();
    for (key, raw) in vars {
        let Ok(key) = key.into().into_string() else {
            continue;
        };
        if !key.starts_with(&marker) {
            continue;
        }
        match raw.into().into_string() {
            Ok(raw) => overrides.push((key, raw)),
            Err(_) => return Err(ConfigError::env_override(key, "value is not valid UTF-8")),
        }
    }
    overrides.sort();

    for (key, raw) in overrides {
        let path: Vec<String> = key[marker.len()..]
            .split("__")
            .map(str::to_lowercase)
            .collect();
        if path.iter().any(String::is_empty) {
            return Err(ConfigError::env_override(&key, "invalid key format"));
        }

        match lookup_mut(config, &path) {
            Some(target) => {
                *target = coerce(&key, target, &raw)?;
                tracing::debug!(var = %key, "Applied environment override");
            }
            None => tracing::debug!(var = %key, "Ignoring environment override for unknown key"),
        }
    }
    Ok(())
}

fn lookup_mut<'a>(value: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    path.iter()
        .try_fold(value, |current, segment| current.as_object_mut()?.get_mut(segment))
}

fn coerce(key: &str, current: &Value, raw: &str) -> Result<Value, ConfigError> {
    match current {
        Value::Bool(_) => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| ConfigError::env_override(key, "expected boolean")),
        Value::Number(number) => {
            let parsed = if number.is_f64() {
                raw.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
            } else if number.is_u64() {
                raw.parse::<u64>().ok().map(serde_json::Number::from)
            } else {
                raw.parse::<i64>().ok().map(serde_json::Number::from)
            };
            parsed
                .map(Value::Number)
                .ok_or_else(|| ConfigError::env_override(key, "expected number"))
        }
        Value::String(_) => Ok(Value::String(raw.to_string())),
        Value::Null => {
            if raw.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
            }
        }
        Value::Array(_) | Value::Object(_) => serde_json::from_str(raw)
            .map_err(|e| ConfigError::env_override(key, format!("expected JSON: {e}"))),
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
