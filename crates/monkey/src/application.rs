//! The application entry point.

use monkey_config::Configuration;
use monkey_core::Environment;

use crate::bootstrap::Bootstrap;

/// A Monkey application.
///
/// `initialize` runs once, before the command line is parsed, and is the
/// place to add bundles and commands. `run` is called by the `server`
/// command after the configuration is loaded and every bundle has run,
/// and before the dependency graph is committed.
pub trait Application<C: Configuration>: Send + Sync + 'static {
    /// Name used as the command name in `--help` and in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Version printed by `--version`.
    fn version(&self) -> &str {
        "unknown"
    }

    /// Registers bundles and commands.
    ///
    /// An error aborts the runner before any command is dispatched.
    fn initialize(&self, bootstrap: &mut Bootstrap<C>) -> anyhow::Result<()> {
        let _ = bootstrap;
        Ok(())
    }

    /// Registers modules, routes, health checks and managed components.
    fn run(&self, configuration: &C, environment: &mut Environment) -> anyhow::Result<()>;
}
