//! Parses the command line and dispatches to a command.
//!
//! Exit codes:
//!
//! | Code | Meaning |
//! |------|---------|
//! | `0` | success, `--help`, `--version` |
//! | `1` | the command failed |
//! | `2` | the command line could not be parsed |

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::error::ErrorKind;
use monkey_config::Configuration;

use crate::application::Application;
use crate::bootstrap::Bootstrap;
use crate::command::{CheckCommand, Command, ServerCommand};
use crate::error::MonkeyError;

/// Exit code for a failed command.
pub const FAILURE_EXIT_CODE: u8 = 1;

/// Builds the bootstrap for an application and runs its commands.
#[derive(Debug)]
pub struct Runner<C: Configuration> {
    bootstrap: Bootstrap<C>,
    initialization: Option<MonkeyError>,
}

impl<C: Configuration> Runner<C> {
    /// Initialises the application with the mode read from `MONKEY_MODE`.
    pub fn new<A: Application<C>>(application: A) -> Self {
        Self::from_bootstrap(Bootstrap::new(application))
    }

    /// Initialises the application from a prepared bootstrap.
    ///
    /// The `server` and `check` commands are added before
    /// [`Application::initialize`] runs, so the application may replace them.
    /// If `initialize` fails, every run reports that failure and exits with
    /// [`FAILURE_EXIT_CODE`].
    pub fn from_bootstrap(mut bootstrap: Bootstrap<C>) -> Self {
        bootstrap.add_command(ServerCommand::new());
        bootstrap.add_command(CheckCommand);

        let application = std::sync::Arc::clone(bootstrap.application());
        let initialization = match application.initialize(&mut bootstrap) {
            Ok(()) => {
                tracing::debug!(
                    application = %application.name(),
                    commands = ?bootstrap.command_names(),
                    "Application initialized"
                );
                None
            }
            Err(error) => {
                let error = match error.downcast::<MonkeyError>() {
                    Ok(framework) => framework,
                    Err(other) => MonkeyError::Application(other),
                };
                tracing::error!(
                    application = %application.name(),
                    error = %error,
                    "Initialization failed"
                );
                Some(error)
            }
        };
        Self {
            bootstrap,
            initialization,
        }
    }

    /// The initialised bootstrap.
    pub fn bootstrap(&self) -> &Bootstrap<C> {
        &self.bootstrap
    }

    /// Why [`Application::initialize`] failed, if it did.
    pub fn initialization_error(&self) -> Option<&MonkeyError> {
        self.initialization.as_ref()
    }

    /// Runs with the process arguments, writing to stdout and stderr.
    pub fn run(&self) -> ExitCode {
        self.run_with(std::env::args_os(), &mut io::stdout(), &mut io::stderr())
    }

    /// Runs with the given arguments (including the program name).
    pub fn run_with<I, T, W, E>(&self, args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
        W: Write,
        E: Write,
    {
        if let Some(error) = &self.initialization {
            let _ = writeln!(stderr, "{}", Self::describe(error));
            return ExitCode::from(FAILURE_EXIT_CODE);
        }

        let matches = match self.cli().try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(e) => return Self::report_usage(&e, stdout, stderr),
        };

        let Some((name, sub_matches)) = matches.subcommand() else {
            // `subcommand_required` makes this unreachable in practice.
            return ExitCode::from(2);
        };
        let Some(command) = self.bootstrap.command(name) else {
            let _ = writeln!(stderr, "unknown command '{name}'");
            return ExitCode::from(2);
        };

        match command.run(&self.bootstrap, sub_matches) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(command = name, error = %e, "Command failed");
                let _ = writeln!(stderr, "{}", Self::describe(&e));
                ExitCode::from(FAILURE_EXIT_CODE)
            }
        }
    }

    /// The `clap` command tree for the registered commands.
    pub fn cli(&self) -> clap::Command {
        let application = self.bootstrap.application();
        let mut cli = clap::Command::new(application.name().to_string())
            .version(application.version().to_string())
            .subcommand_required(true)
            .arg_required_else_help(true);

        for command in self.bootstrap.commands() {
            let subcommand = clap::Command::new(command.name().to_string())
                .about(command.description().to_string());
            cli = cli.subcommand(command.configure(subcommand));
        }
        cli
    }

    fn report_usage<W: Write, E: Write>(
        error: &clap::Error,
        stdout: &mut W,
        stderr: &mut E,
    ) -> ExitCode {
        let rendered = error.render();
        let written = match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => write!(stdout, "{rendered}"),
            _ => write!(stderr, "{rendered}"),
        };
        if written.is_err() {
            return ExitCode::from(FAILURE_EXIT_CODE);
        }
        // clap reports 0 for help/version and 2 for usage errors.
        ExitCode::from(u8::try_from(error.exit_code()).unwrap_or(FAILURE_EXIT_CODE))
    }

    fn describe(error: &MonkeyError) -> String {
        let mut message = error.to_string();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !message.contains(&cause_text) {
                message.push_str(": ");
                message.push_str(&cause_text);
            }
            source = cause.source();
        }
        message
    }
}

/// Runs an application with the process arguments.
///
/// ```rust,ignore
/// fn main() -> std::process::ExitCode {
///     monkey::run(ShopApplication)
/// }
/// ```
pub fn run<C: Configuration, A: Application<C>>(application: A) -> ExitCode {
    Runner::new(application).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use monkey_config::BaseConfig;
    use monkey_core::{Environment, Mode};

    struct Shop;

    impl Application<BaseConfig> for Shop {
        fn name(&self) -> &str {
            "shop"
        }

        fn version(&self) -> &str {
            "1.2.3"
        }

        fn run(
            &self,
            _configuration: &BaseConfig,
            _environment: &mut Environment,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn runner() -> Runner<BaseConfig> {
        Runner::from_bootstrap(Bootstrap::with_mode(Shop, Mode::Test))
    }

    fn run(args: &[&str]) -> (ExitCode, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = runner().run_with(args.iter().copied(), &mut stdout, &mut stderr);
        (
            code,
            String::from_utf8(stdout).unwrap(),
            String::from_utf8(stderr).unwrap(),
        )
    }

    #[test]
    fn test_builtin_commands() {
        assert_eq!(runner().bootstrap().command_names(), vec!["server", "check"]);
    }

    #[test]
    fn test_help_exits_zero() {
        let (code, stdout, _) = run(&["shop", "--help"]);
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(stdout.contains("server"));
        assert!(stdout.contains("check"));
    }

    #[test]
    fn test_version() {
        let (code, stdout, _) = run(&["shop", "--version"]);
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(stdout.contains("1.2.3"));
    }

    #[test]
    fn test_unknown_subcommand_is_usage_error() {
        let (code, _, stderr) = run(&["shop", "migrate"]);
        assert_eq!(code, ExitCode::from(2));
        assert!(stderr.contains("migrate"));
    }

    #[test]
    fn test_missing_subcommand_is_usage_error() {
        let (code, _, _) = run(&["shop"]);
        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn test_describe_includes_causes() {
        let error = MonkeyError::bundle("db", anyhow::anyhow!("refused").context("connecting"));
        assert_eq!(
            Runner::<BaseConfig>::describe(&error),
            "bundle 'db' failed: connecting: refused"
        );
    }

    struct Misconfigured;

    impl Application<BaseConfig> for Misconfigured {
        fn name(&self) -> &str {
            "misconfigured"
        }

        fn initialize(&self, _bootstrap: &mut Bootstrap<BaseConfig>) -> anyhow::Result<()> {
            anyhow::bail!("no commands to register")
        }

        fn run(
            &self,
            _configuration: &BaseConfig,
            _environment: &mut Environment,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_initialize_failure_exits_with_failure() {
        let runner = Runner::from_bootstrap(Bootstrap::with_mode(Misconfigured, Mode::Test));
        assert!(matches!(
            runner.initialization_error(),
            Some(MonkeyError::Application(_))
        ));

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = runner.run_with(["misconfigured", "check"], &mut stdout, &mut stderr);
        assert_eq!(code, ExitCode::from(FAILURE_EXIT_CODE));
        let stderr = String::from_utf8(stderr).unwrap();
        assert_eq!(stderr.trim_end(), "application failed: no commands to register");
        assert!(stdout.is_empty());
    }
}
