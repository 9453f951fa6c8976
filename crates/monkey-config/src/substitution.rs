//! `${VAR}` substitution in configuration text.
//!
//! Supported forms:
//!
//! - `${NAME}` - the value of `NAME`
//! - `${NAME:-fallback}` - the value of `NAME`, or `fallback` when unset
//! - `$${NAME}` - the literal text `${NAME}`

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::ConfigError;

static VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(\$?)\{([A-Za-z_][A-Za-z0-9_.]*)(?::-([^}]*))?\}").expect("valid regex")
});

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Replaces variable references using a lookup function.
pub struct VariableSubstitutor {
    lookup: Lookup,
    strict: bool,
}

impl fmt::Debug for VariableSubstitutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableSubstitutor")
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

impl VariableSubstitutor {
    /// Looks variables up in the process environment.
    ///
    /// Strict: an unset variable without a fallback is an error.
    pub fn from_env() -> Self {
        Self::new(|name| std::env::var(name).ok())
    }

    /// Looks variables up in a fixed map. Strict.
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self::new(move |name| values.get(name).cloned())
    }

    /// Looks variables up with a custom function. Strict.
    pub fn new<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
            strict: true,
        }
    }

    /// Sets strict mode. When off, unresolved references are left as-is.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Substitutes every reference in `input`.
    pub fn replace(&self, input: &str) -> Result<String, ConfigError> {
        let mut output = String::with_capacity(input.len());
        let mut last = 0;

        for captures in VARIABLE.captures_iter(input) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            output.push_str(&input[last..whole.start()]);
            output.push_str(&self.resolve(&captures, whole.as_str())?);
            last = whole.end();
        }

        output.push_str(&input[last..]);
        Ok(output)
    }

    fn resolve(&self, captures: &Captures<'_>, whole: &str) -> Result<String, ConfigError> {
        let escaped = captures.get(1).is_some_and(|m| !m.as_str().is_empty());
        if escaped {
            return Ok(whole[1..].to_string());
        }

        let name = &captures[2];
        if let Some(value) = (self.lookup)(name) {
            return Ok(value);
        }
        if let Some(fallback) = captures.get(3) {
            return Ok(fallback.as_str().to_string());
        }
        if self.strict {
            return Err(ConfigError::undefined_variable(name));
        }
        tracing::warn!(variable = name, "Leaving unresolved configuration variable in place");
        Ok(whole.to_string())
    }
}
