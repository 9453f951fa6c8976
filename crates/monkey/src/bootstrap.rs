//! Pre-run assembly of an application.
//!
//! A [`Bootstrap`] collects everything that must exist before the
//! configuration is read: bundles, commands, the shared registries, and the
//! settings used to load the configuration. It is only mutated during
//! [`Application::initialize`](crate::Application::initialize) and bundle
//! initialisation.

use std::fmt;
use std::sync::Arc;

use monkey_config::{
    ConfigError, ConfigLoader, Configuration, ConfigurationSourceProvider,
    FileConfigurationSourceProvider,
};
use monkey_core::health::HealthCheckRegistry;
use monkey_core::metrics::MetricRegistry;
use monkey_core::{Environment, Mode};

use crate::application::Application;
use crate::bundle::{Bundle, BundleAdapter, ConfiguredBundle};
use crate::command::Command;
use crate::error::MonkeyError;

/// Default prefix for `PREFIX__SECTION__KEY` environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "MONKEY";

/// Pre-run state of an application.
pub struct Bootstrap<C: Configuration> {
    application: Arc<dyn Application<C>>,
    mode: Mode,
    commands: Vec<Arc<dyn Command<C>>>,
    bundles: Vec<Arc<dyn ConfiguredBundle<C>>>,
    health_checks: Arc<HealthCheckRegistry>,
    metrics: Arc<MetricRegistry>,
    source_provider: Arc<dyn ConfigurationSourceProvider>,
    env_prefix: Option<String>,
    load_dotenv: bool,
}

impl<C: Configuration> fmt::Debug for Bootstrap<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrap")
            .field("application", &self.application.name())
            .field("mode", &self.mode)
            .field("commands", &self.command_names())
            .field("bundles", &self.bundle_names())
            .field("env_prefix", &self.env_prefix)
            .field("load_dotenv", &self.load_dotenv)
            .finish_non_exhaustive()
    }
}

impl<C: Configuration> Bootstrap<C> {
    /// Creates a bootstrap with the mode read from `MONKEY_MODE`.
    pub fn new<A: Application<C>>(application: A) -> Self {
        Self::with_mode(application, Mode::from_env())
    }

    /// Creates a bootstrap with an explicit mode.
    pub fn with_mode<A: Application<C>>(application: A, mode: Mode) -> Self {
        Self {
            application: Arc::new(application),
            mode,
            commands: Vec::new(),
            bundles: Vec::new(),
            health_checks: Arc::new(HealthCheckRegistry::with_defaults()),
            metrics: Arc::new(MetricRegistry::new()),
            source_provider: Arc::new(FileConfigurationSourceProvider),
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
            load_dotenv: false,
        }
    }

    /// The application.
    pub fn application(&self) -> &Arc<dyn Application<C>> {
        &self.application
    }

    /// The run mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Adds a command. A command with the same name is replaced in place.
    pub fn add_command<K: Command<C> + 'static>(&mut self, command: K) -> &mut Self {
        let command: Arc<dyn Command<C>> = Arc::new(command);
        match self.commands.iter().position(|c| c.name() == command.name()) {
            Some(index) => {
                tracing::debug!(command = command.name(), "Replacing command");
                self.commands[index] = command;
            }
            None => self.commands.push(command),
        }
        self
    }

    /// Adds a bundle and initialises it immediately.
    ///
    /// # Errors
    ///
    /// Returns [`MonkeyError::Bundle`] if the bundle's `initialize` fails.
    /// The bundle is not added.
    pub fn add_bundle<B: Bundle>(&mut self, bundle: B) -> Result<&mut Self, MonkeyError> {
        self.add_configured_bundle(BundleAdapter::new(bundle))
    }

    /// Adds a configured bundle and initialises it immediately.
    ///
    /// # Errors
    ///
    /// Returns [`MonkeyError::Bundle`] if the bundle's `initialize` fails.
    /// The bundle is not added.
    pub fn add_configured_bundle<B: ConfiguredBundle<C>>(
        &mut self,
        bundle: B,
    ) -> Result<&mut Self, MonkeyError> {
        let bundle: Arc<dyn ConfiguredBundle<C>> = Arc::new(bundle);
        tracing::debug!(bundle = bundle.name(), "Initializing bundle");
        bundle
            .initialize(self)
            .map_err(|source| MonkeyError::bundle(bundle.name(), source))?;
        self.bundles.push(bundle);
        Ok(self)
    }

    /// Registered commands, in registration order.
    pub fn commands(&self) -> &[Arc<dyn Command<C>>] {
        &self.commands
    }

    /// Looks a command up by name.
    pub fn command(&self, name: &str) -> Option<&Arc<dyn Command<C>>> {
        self.commands.iter().find(|c| c.name() == name)
    }

    /// Names of the registered commands.
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }

    /// Names of the added bundles, in order.
    pub fn bundle_names(&self) -> Vec<&str> {
        self.bundles.iter().map(|b| b.name()).collect()
    }

    /// The health check registry shared with the environment.
    pub fn health_checks(&self) -> &Arc<HealthCheckRegistry> {
        &self.health_checks
    }

    /// The metric registry shared with the environment.
    pub fn metrics(&self) -> &Arc<MetricRegistry> {
        &self.metrics
    }

    /// Replaces the provider configuration files are read through.
    pub fn set_source_provider<P: ConfigurationSourceProvider + 'static>(
        &mut self,
        provider: P,
    ) -> &mut Self {
        self.source_provider = Arc::new(provider);
        self
    }

    /// Sets the environment override prefix; `None` disables overrides.
    pub fn set_env_prefix(&mut self, prefix: Option<&str>) -> &mut Self {
        self.env_prefix = prefix.map(str::to_string);
        self
    }

    /// The environment override prefix.
    pub fn env_prefix(&self) -> Option<&str> {
        self.env_prefix.as_deref()
    }

    /// Loads `.env` into the process environment before reading configuration.
    pub fn set_load_dotenv(&mut self, load: bool) -> &mut Self {
        self.load_dotenv = load;
        self
    }

    /// Loads and validates the configuration.
    ///
    /// Layers are applied in order: defaults, the file at `path` (if any),
    /// then environment overrides.
    pub fn load_configuration(&self, path: Option<&str>) -> Result<C, ConfigError> {
        let mut loader = ConfigLoader::<C>::new();
        if self.load_dotenv {
            loader = loader.with_dotenv();
        }
        if let Some(path) = path {
            loader = loader.with_source(self.source_provider.as_ref(), path)?;
        }
        if let Some(prefix) = &self.env_prefix {
            loader = loader.with_env_prefix(prefix);
        }
        let configuration = loader.load()?;
        tracing::debug!(path, "Configuration loaded");
        Ok(configuration)
    }

    /// Creates the environment, sharing this bootstrap's registries.
    pub fn create_environment(&self) -> Environment {
        Environment::with_registries(
            self.application.name(),
            self.mode,
            Arc::clone(&self.health_checks),
            Arc::clone(&self.metrics),
        )
    }

    /// Runs every bundle in order. The first failure aborts.
    pub fn run_bundles(
        &self,
        configuration: &C,
        environment: &mut Environment,
    ) -> Result<(), MonkeyError> {
        for bundle in &self.bundles {
            tracing::debug!(bundle = bundle.name(), "Running bundle");
            bundle
                .run(configuration, environment)
                .map_err(|source| MonkeyError::bundle(bundle.name(), source))?;
        }
        Ok(())
    }

    /// Builds the environment and runs bundles, then the application.
    ///
    /// The returned environment is not yet committed.
    pub fn prepare(&self, configuration: &C) -> Result<Environment, MonkeyError> {
        let mut environment = self.create_environment();
        self.run_bundles(configuration, &mut environment)?;
        self.application
            .run(configuration, &mut environment)
            .map_err(MonkeyError::Application)?;
        Ok(environment)
    }

    /// Installs logging and metrics from the configuration.
    ///
    /// A repeated initialisation in the same process is ignored.
    pub fn init_telemetry(&self, configuration: &C) -> Result<(), MonkeyError> {
        let results = [
            monkey_telemetry::init_logging(configuration.logging(), self.mode),
            monkey_telemetry::init_metrics(configuration.metrics()),
        ];
        for result in results {
            match result {
                Err(e) if e.is_already_initialized() => {
                    tracing::debug!(error = %e, "Telemetry already initialized");
                }
                other => other?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monkey_config::BaseConfig;
    use monkey_core::health::DEADLOCKS_CHECK;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Shop;

    impl Application<BaseConfig> for Shop {
        fn name(&self) -> &str {
            "shop"
        }

        fn run(
            &self,
            _configuration: &BaseConfig,
            environment: &mut Environment,
        ) -> anyhow::Result<()> {
            environment.metrics().counter("shop_started");
            Ok(())
        }
    }

    struct Counting {
        initialized: Arc<AtomicUsize>,
        ran: Arc<AtomicUsize>,
    }

    impl Bundle for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn initialize<C: Configuration>(
            &self,
            _bootstrap: &mut Bootstrap<C>,
        ) -> anyhow::Result<()> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn run(&self, _environment: &mut Environment) -> anyhow::Result<()> {
            self.ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl ConfiguredBundle<BaseConfig> for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn run(
            &self,
            _configuration: &BaseConfig,
            _environment: &mut Environment,
        ) -> anyhow::Result<()> {
            anyhow::bail!("cannot reach broker")
        }
    }

    struct Unready;

    impl Bundle for Unready {
        fn name(&self) -> &str {
            "unready"
        }

        fn initialize<C: Configuration>(
            &self,
            _bootstrap: &mut Bootstrap<C>,
        ) -> anyhow::Result<()> {
            anyhow::bail!("migrations directory missing")
        }

        fn run(&self, _environment: &mut Environment) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_bundle_initialize_failure_rejects_bundle() {
        let mut bootstrap = Bootstrap::with_mode(Shop, Mode::Test);

        let err = bootstrap.add_bundle(Unready).unwrap_err();
        assert!(matches!(err, MonkeyError::Bundle { ref bundle, .. } if bundle == "unready"));
        assert_eq!(
            err.to_string(),
            "bundle 'unready' failed: migrations directory missing"
        );
        assert!(bootstrap.bundle_names().is_empty());
    }

    #[test]
    fn test_bundle_initialized_on_add() {
        let initialized = Arc::new(AtomicUsize::new(0));
        let ran = Arc::new(AtomicUsize::new(0));
        let mut bootstrap = Bootstrap::with_mode(Shop, Mode::Test);
        bootstrap
            .add_bundle(Counting {
                initialized: Arc::clone(&initialized),
                ran: Arc::clone(&ran),
            })
            .unwrap();

        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(bootstrap.bundle_names(), vec!["counting"]);

        let environment = bootstrap.prepare(&BaseConfig::default()).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!environment.is_committed());
        assert!(environment.metrics().kind("shop_started").is_some());
    }

    #[test]
    fn test_bundle_failure_aborts_before_application() {
        let mut bootstrap = Bootstrap::with_mode(Shop, Mode::Test);
        bootstrap.add_configured_bundle(Failing).unwrap();

        let err = bootstrap.prepare(&BaseConfig::default()).unwrap_err();
        assert!(matches!(err, MonkeyError::Bundle { ref bundle, .. } if bundle == "failing"));
        assert!(bootstrap.metrics().kind("shop_started").is_none());
    }

    #[test]
    fn test_environment_shares_registries() {
        let bootstrap = Bootstrap::with_mode(Shop, Mode::Prod);
        let environment = bootstrap.create_environment();

        assert_eq!(environment.name(), "shop");
        assert_eq!(environment.mode(), Mode::Prod);
        assert!(Arc::ptr_eq(environment.health_checks(), bootstrap.health_checks()));
        assert!(environment.health_checks().contains(DEADLOCKS_CHECK));
    }

    #[test]
    fn test_load_configuration_without_file() {
        let mut bootstrap = Bootstrap::with_mode(Shop, Mode::Test);
        bootstrap.set_env_prefix(None);

        let config = bootstrap.load_configuration(None).unwrap();
        assert_eq!(config, BaseConfig::default());
    }

    #[test]
    fn test_load_configuration_through_provider() {
        let mut bootstrap = Bootstrap::with_mode(Shop, Mode::Test);
        bootstrap
            .set_env_prefix(None)
            .set_source_provider(
                monkey_config::StaticConfigurationSourceProvider::new()
                    .with_source("app.toml", "[server]\ntype = \"noop\"\n"),
            );

        let config = bootstrap.load_configuration(Some("app.toml")).unwrap();
        assert_eq!(config.server.kind(), "noop");
    }
}
