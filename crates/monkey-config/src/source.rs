//! Where configuration text comes from.

use std::fs;
use std::path::Path;

use crate::substitution::VariableSubstitutor;
use crate::ConfigError;

/// Opens configuration text by path.
pub trait ConfigurationSourceProvider: Send + Sync {
    /// Returns the full contents of the source at `path`.
    fn open(&self, path: &str) -> Result<String, ConfigError>;
}

/// Reads configuration from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileConfigurationSourceProvider;

impl ConfigurationSourceProvider for FileConfigurationSourceProvider {
    fn open(&self, path: &str) -> Result<String, ConfigError> {
        let file = Path::new(path);
        if !file.exists() {
            return Err(ConfigError::not_found(path));
        }
        tracing::debug!(path, "Reading configuration file");
        fs::read_to_string(file).map_err(|e| ConfigError::read(file, e))
    }
}

/// Wraps another provider and substitutes `${VAR}` references in its output.
#[derive(Debug)]
pub struct SubstitutingSourceProvider<P> {
    delegate: P,
    substitutor: VariableSubstitutor,
}

impl<P: ConfigurationSourceProvider> SubstitutingSourceProvider<P> {
    /// Creates a provider that substitutes from the process environment.
    pub fn new(delegate: P) -> Self {
        Self::with_substitutor(delegate, VariableSubstitutor::from_env())
    }

    /// Creates a provider with a custom substitutor.
    pub fn with_substitutor(delegate: P, substitutor: VariableSubstitutor) -> Self {
        Self {
            delegate,
            substitutor,
        }
    }
}

impl<P: ConfigurationSourceProvider> ConfigurationSourceProvider for SubstitutingSourceProvider<P> {
    fn open(&self, path: &str) -> Result<String, ConfigError> {
        let raw = self.delegate.open(path)?;
        self.substitutor.replace(&raw)
    }
}

/// Serves configuration from memory, keyed by path.
#[derive(Debug, Default, Clone)]
pub struct StaticConfigurationSourceProvider {
    sources: std::collections::HashMap<String, String>,
}

impl StaticConfigurationSourceProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source.
    #[must_use]
    pub fn with_source(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.sources.insert(path.into(), content.into());
        self
    }
}

impl ConfigurationSourceProvider for StaticConfigurationSourceProvider {
    fn open(&self, path: &str) -> Result<String, ConfigError> {
        self.sources
            .get(path)
            .cloned()
            .ok_or_else(|| ConfigError::not_found(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_file_provider_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hello").unwrap();

        let content = FileConfigurationSourceProvider
            .open(file.path().to_str().unwrap())
            .unwrap();
        assert_eq!(content, "hello\n");
    }

    #[test]
    fn test_file_provider_missing_file() {
        let err = FileConfigurationSourceProvider
            .open("/definitely/not/here.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_substituting_provider() {
        let delegate = StaticConfigurationSourceProvider::new()
            .with_source("app.toml", "addr = \"${HOST}:${PORT:-8080}\"");
        let variables = HashMap::from([("HOST".to_string(), "10.0.0.1".to_string())]);
        let substitutor = VariableSubstitutor::from_map(variables);
        let provider = SubstitutingSourceProvider::with_substitutor(delegate, substitutor);

        assert_eq!(provider.open("app.toml").unwrap(), "addr = \"10.0.0.1:8080\"");
    }

    #[test]
    fn test_substituting_provider_propagates_undefined() {
        let delegate = StaticConfigurationSourceProvider::new().with_source("app.toml", "${NOPE}");
        let provider = SubstitutingSourceProvider::with_substitutor(
            delegate,
            VariableSubstitutor::from_map(HashMap::new()),
        );
        assert!(matches!(
            provider.open("app.toml"),
            Err(ConfigError::UndefinedVariable { .. })
        ));
    }
}
