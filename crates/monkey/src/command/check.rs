//! The `check` command.

use clap::ArgMatches;
use monkey_config::Configuration;

use super::{file_argument, load_configuration, Command};
use crate::bootstrap::Bootstrap;
use crate::error::MonkeyError;

/// Parses and validates the configuration without starting anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckCommand;

impl<C: Configuration> Command<C> for CheckCommand {
    fn name(&self) -> &str {
        "check"
    }

    fn description(&self) -> &str {
        "Parses and validates the configuration file"
    }

    fn configure(&self, command: clap::Command) -> clap::Command {
        command.arg(file_argument())
    }

    fn run(&self, bootstrap: &Bootstrap<C>, matches: &ArgMatches) -> Result<(), MonkeyError> {
        let configuration = load_configuration(bootstrap, matches)?;
        bootstrap.init_telemetry(&configuration)?;
        tracing::info!(
            application = %bootstrap.application().name(),
            server = configuration.server().kind(),
            "Configuration is OK"
        );
        Ok(())
    }
}
