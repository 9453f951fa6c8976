//! The `server` command.

use std::sync::Arc;

use clap::ArgMatches;
use monkey_config::Configuration;
use monkey_core::lifecycle::{LifeCycle, LifecycleContainer};
use monkey_server::{server_factory, wait_for_os_signal, ShutdownSignal};

use super::{file_argument, load_configuration, Command};
use crate::bootstrap::Bootstrap;
use crate::error::MonkeyError;

/// Runs the application until a shutdown signal arrives.
///
/// The sequence is: load configuration, initialise telemetry, run bundles
/// and the application, commit the dependency graph, build the server,
/// start the lifecycle container, wait for SIGINT/SIGTERM or
/// [`ShutdownSignal::trigger`], stop the container.
#[derive(Debug, Clone, Default)]
pub struct ServerCommand {
    shutdown: ShutdownSignal,
}

impl ServerCommand {
    /// Creates the command with a fresh shutdown signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the command around an existing shutdown signal.
    pub fn with_shutdown(shutdown: ShutdownSignal) -> Self {
        Self { shutdown }
    }

    /// The signal that stops a running server.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Runs the application with an already loaded configuration.
    pub fn serve<C: Configuration>(
        &self,
        bootstrap: &Bootstrap<C>,
        configuration: &C,
    ) -> Result<(), MonkeyError> {
        let mut environment = bootstrap.prepare(configuration)?;
        let injector = environment.commit()?;
        tracing::info!(
            bindings = injector.len(),
            stage = ?injector.stage(),
            "Dependency graph committed"
        );

        let factory = server_factory(configuration.server());
        let server = Arc::new(factory.build(&environment)?);
        environment
            .lifecycle()
            .attach_shared(Arc::clone(&server) as Arc<dyn LifeCycle>);

        let lifecycle = Arc::clone(environment.lifecycle());
        if let Err(start_error) = lifecycle.start() {
            tracing::error!(error = %start_error, "Startup failed, stopping started components");
            stop_best_effort(&lifecycle);
            return Err(start_error.into());
        }

        tracing::info!(
            application = %environment.name(),
            server = factory.kind(),
            routes = environment.routes().len(),
            "Started"
        );
        run_until_shutdown(&lifecycle, || self.wait_for_shutdown())
    }

    fn wait_for_shutdown(&self) -> Result<(), MonkeyError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let shutdown = self.shutdown.clone();
        runtime.block_on(async move {
            tokio::select! {
                result = wait_for_os_signal() => result,
                () = shutdown.recv() => Ok(()),
            }
        })?;
        Ok(())
    }
}

/// Blocks in `wait`, then stops the started container.
///
/// The container is stopped even when `wait` fails; that error is returned.
/// Stop failures are logged and never change the outcome.
fn run_until_shutdown<F>(lifecycle: &LifecycleContainer, wait: F) -> Result<(), MonkeyError>
where
    F: FnOnce() -> Result<(), MonkeyError>,
{
    let waited = wait();
    match &waited {
        Ok(()) => tracing::info!("Shutting down"),
        Err(error) => {
            tracing::error!(error = %error, "Cannot wait for a shutdown signal, shutting down");
        }
    }
    stop_best_effort(lifecycle);
    waited
}

fn stop_best_effort(lifecycle: &LifecycleContainer) {
    if let Err(error) = lifecycle.stop() {
        tracing::warn!(error = %error, "Some components did not stop cleanly");
    }
}

impl<C: Configuration> Command<C> for ServerCommand {
    fn name(&self) -> &str {
        "server"
    }

    fn description(&self) -> &str {
        "Runs the application as an HTTP server"
    }

    fn configure(&self, command: clap::Command) -> clap::Command {
        command.arg(file_argument())
    }

    fn run(&self, bootstrap: &Bootstrap<C>, matches: &ArgMatches) -> Result<(), MonkeyError> {
        let configuration = load_configuration(bootstrap, matches)?;
        bootstrap.init_telemetry(&configuration)?;
        self.serve(bootstrap, &configuration)
    }
}
