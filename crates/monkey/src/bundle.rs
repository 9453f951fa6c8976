//! Reusable groups of application wiring.
//!
//! A bundle is initialised when it is added to the [`Bootstrap`], before any
//! environment exists, and runs against the environment before the
//! application does. Bundles run in the order they were added.

use std::marker::PhantomData;

use monkey_config::Configuration;
use monkey_core::Environment;

use crate::bootstrap::Bootstrap;

/// A bundle that needs the application's configuration.
pub trait ConfiguredBundle<C: Configuration>: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once when the bundle is added. An error rejects the bundle.
    fn initialize(&self, bootstrap: &mut Bootstrap<C>) -> anyhow::Result<()> {
        let _ = bootstrap;
        Ok(())
    }

    /// Registers modules, routes, health checks or managed components.
    fn run(&self, configuration: &C, environment: &mut Environment) -> anyhow::Result<()>;
}

/// A bundle that works with any configuration.
pub trait Bundle: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once when the bundle is added. An error rejects the bundle.
    fn initialize<C: Configuration>(&self, bootstrap: &mut Bootstrap<C>) -> anyhow::Result<()> {
        let _ = bootstrap;
        Ok(())
    }

    /// Registers modules, routes, health checks or managed components.
    fn run(&self, environment: &mut Environment) -> anyhow::Result<()>;
}

/// Adapts a [`Bundle`] to a specific configuration type.
pub(crate) struct BundleAdapter<B, C> {
    bundle: B,
    _config: PhantomData<fn() -> C>,
}

impl<B, C> BundleAdapter<B, C> {
    pub(crate) fn new(bundle: B) -> Self {
        Self {
            bundle,
            _config: PhantomData,
        }
    }
}

impl<B: Bundle, C: Configuration> ConfiguredBundle<C> for BundleAdapter<B, C> {
    fn name(&self) -> &str {
        self.bundle.name()
    }

    fn initialize(&self, bootstrap: &mut Bootstrap<C>) -> anyhow::Result<()> {
        self.bundle.initialize(bootstrap)
    }

    fn run(&self, _configuration: &C, environment: &mut Environment) -> anyhow::Result<()> {
        self.bundle.run(environment)
    }
}
