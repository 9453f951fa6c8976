//! Process run mode.
//!
//! The mode is resolved once from the `MONKEY_MODE` environment variable when
//! the bootstrap is created. It selects the injector [`Stage`] and the default
//! logging verbosity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::di::Stage;

/// Environment variable holding the run mode.
pub const MODE_ENV_VAR: &str = "MONKEY_MODE";

/// The mode the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Local development (the default).
    #[default]
    Dev,
    /// Automated tests.
    Test,
    /// Production.
    Prod,
}

impl Mode {
    /// Resolves the mode from the process environment.
    ///
    /// Missing or unrecognised values fall back to [`Mode::Dev`].
    pub fn from_env() -> Self {
        let value = std::env::var(MODE_ENV_VAR).ok();
        let mode = Self::from_value(value.as_deref());
        tracing::debug!(mode = %mode, "Resolved run mode");
        mode
    }

    /// Resolves the mode from an optional raw value.
    ///
    /// ```
    /// use monkey_core::Mode;
    ///
    /// assert_eq!(Mode::from_value(None), Mode::Dev);
    /// assert_eq!(Mode::from_value(Some("PROD")), Mode::Prod);
    /// assert_eq!(Mode::from_value(Some("staging")), Mode::Dev);
    /// ```
    pub fn from_value(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    /// The injector stage used in this mode.
    pub fn stage(self) -> Stage {
        match self {
            Self::Prod => Stage::Production,
            Self::Dev | Self::Test => Stage::Development,
        }
    }

    /// The default log filter for this mode.
    pub fn default_log_level(self) -> &'static str {
        match self {
            Self::Dev => "debug",
            Self::Test => "warn",
            Self::Prod => "info",
        }
    }

    /// Returns the lowercase name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        }
    }

    /// Returns `true` in production mode.
    pub fn is_prod(self) -> bool {
        self == Self::Prod
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" => Ok(Self::Prod),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_value_is_dev() {
        assert_eq!(Mode::from_value(None), Mode::Dev);
    }

    #[test]
    fn test_prod_case_insensitive() {
        assert_eq!(Mode::from_value(Some("prod")), Mode::Prod);
        assert_eq!(Mode::from_value(Some("PROD")), Mode::Prod);
        assert_eq!(Mode::from_value(Some("Prod")), Mode::Prod);
    }

    #[test]
    fn test_test_mode() {
        assert_eq!(Mode::from_value(Some("test")), Mode::Test);
    }

    #[test]
    fn test_unrecognised_falls_back_to_dev() {
        assert_eq!(Mode::from_value(Some("production")), Mode::Dev);
        assert_eq!(Mode::from_value(Some("")), Mode::Dev);
    }

    #[test]
    fn test_stage_selection() {
        assert_eq!(Mode::Prod.stage(), Stage::Production);
        assert_eq!(Mode::Dev.stage(), Stage::Development);
        assert_eq!(Mode::Test.stage(), Stage::Development);
    }

    #[test]
    fn test_display() {
        assert_eq!(Mode::Test.to_string(), "test");
    }
}
