//! Command-line commands.
//!
//! Every command becomes a subcommand of the application's CLI. The
//! built-in ones are:
//!
//! - `server [file]` - loads the configuration and runs the HTTP server until
//!   a shutdown signal arrives
//! - `check [file]` - loads and validates the configuration, then exits

use clap::{Arg, ArgMatches};
use monkey_config::Configuration;

use crate::bootstrap::Bootstrap;
use crate::error::MonkeyError;

mod check;
mod server;

pub use check::CheckCommand;
pub use server::ServerCommand;

/// Name of the configuration file argument added by [`file_argument`].
pub const FILE_ARG: &str = "file";

/// A subcommand of the application's CLI.
pub trait Command<C: Configuration>: Send + Sync + 'static {
    /// Subcommand name.
    fn name(&self) -> &str;

    /// One-line description for `--help`.
    fn description(&self) -> &str;

    /// Adds the command's arguments.
    fn configure(&self, command: clap::Command) -> clap::Command {
        command
    }

    /// Runs the command with its parsed arguments.
    fn run(&self, bootstrap: &Bootstrap<C>, matches: &ArgMatches) -> Result<(), MonkeyError>;
}

/// The optional positional configuration file argument.
pub fn file_argument() -> Arg {
    Arg::new(FILE_ARG)
        .value_name("FILE")
        .help("Configuration file (.toml or .json)")
        .required(false)
}

/// Loads the configuration named by the [`FILE_ARG`] argument, if present.
pub fn load_configuration<C: Configuration>(
    bootstrap: &Bootstrap<C>,
    matches: &ArgMatches,
) -> Result<C, MonkeyError> {
    let path = matches.get_one::<String>(FILE_ARG).map(String::as_str);
    Ok(bootstrap.load_configuration(path)?)
}
