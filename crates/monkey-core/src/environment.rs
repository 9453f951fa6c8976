//! The runtime environment handed to bundles and the application.
//!
//! An [`Environment`] owns the shared registries (health checks, metrics,
//! routes), the [`LifecycleContainer`] and the DI facade. Bundles and the
//! application register modules through [`Environment::modules`]; once
//! [`Environment::commit`] has run, the injector is available through
//! [`Environment::injector`] and the module registry rejects further changes.
//!
//! # Example
//!
//! ```rust
//! use monkey_core::{Environment, Mode, StateError};
//! use std::sync::Arc;
//!
//! struct Foo(u32);
//!
//! let mut env = Environment::new("demo", Mode::Test);
//! env.modules().register_instance(Arc::new(Foo(7))).unwrap();
//!
//! assert_eq!(env.injector().unwrap_err(), StateError::NotCommitted);
//! env.commit().unwrap();
//! assert_eq!(env.injector().unwrap().get::<Foo>().unwrap().0, 7);
//! ```

use std::sync::Arc;

use crate::di::{DiError, Injector, ModuleRegistry};
use crate::error::{StateError, StateResult};
use crate::health::{
    DeadlockHealthCheck, HealthCheckRegistry, HealthCheckWarningListener, DEADLOCKS_CHECK,
};
use crate::http::RouteRegistry;
use crate::lifecycle::{LifeCycle, LifecycleContainer, LifecycleListener};
use crate::metrics::MetricRegistry;
use crate::mode::Mode;

/// Shared state for one application run.
#[derive(Debug)]
pub struct Environment {
    name: String,
    mode: Mode,
    health_checks: Arc<HealthCheckRegistry>,
    metrics: Arc<MetricRegistry>,
    lifecycle: Arc<LifecycleContainer>,
    routes: Arc<RouteRegistry>,
    admin_routes: Arc<RouteRegistry>,
    health_warning: Arc<HealthCheckWarningListener>,
    modules: ModuleRegistry,
    injector: Option<Arc<Injector>>,
}

impl Environment {
    /// Creates an environment with fresh registries.
    pub fn new(name: impl Into<String>, mode: Mode) -> Self {
        Self::with_registries(
            name,
            mode,
            Arc::new(HealthCheckRegistry::new()),
            Arc::new(MetricRegistry::new()),
        )
    }

    /// Creates an environment around registries owned by the caller.
    ///
    /// The `deadlocks` health check is registered if it is missing, and a
    /// [`HealthCheckWarningListener`] is attached to the lifecycle container.
    pub fn with_registries(
        name: impl Into<String>,
        mode: Mode,
        health_checks: Arc<HealthCheckRegistry>,
        metrics: Arc<MetricRegistry>,
    ) -> Self {
        if !health_checks.contains(DEADLOCKS_CHECK) {
            health_checks.register(DEADLOCKS_CHECK, DeadlockHealthCheck);
        }

        let lifecycle = Arc::new(LifecycleContainer::new());
        let health_warning = Arc::new(HealthCheckWarningListener::new(Arc::clone(&health_checks)));
        lifecycle.add_shared_listener(Arc::clone(&health_warning) as Arc<dyn LifecycleListener>);

        let name = name.into();
        tracing::debug!(application = %name, mode = %mode, "Created environment");

        Self {
            name,
            mode,
            health_checks,
            metrics,
            lifecycle,
            routes: Arc::new(RouteRegistry::new()),
            admin_routes: Arc::new(RouteRegistry::new()),
            health_warning,
            modules: ModuleRegistry::new(),
            injector: None,
        }
    }

    /// The application name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The run mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The health-check registry.
    pub fn health_checks(&self) -> &Arc<HealthCheckRegistry> {
        &self.health_checks
    }

    /// The metric registry.
    pub fn metrics(&self) -> &Arc<MetricRegistry> {
        &self.metrics
    }

    /// The lifecycle container.
    pub fn lifecycle(&self) -> &Arc<LifecycleContainer> {
        &self.lifecycle
    }

    /// Attaches a managed child to the lifecycle container.
    pub fn manage<L: LifeCycle + 'static>(&self, child: L) {
        self.lifecycle.attach(child);
    }

    /// Application routes, served by the application connector.
    pub fn routes(&self) -> &Arc<RouteRegistry> {
        &self.routes
    }

    /// Extra admin routes, served next to the built-in admin endpoints.
    pub fn admin_routes(&self) -> &Arc<RouteRegistry> {
        &self.admin_routes
    }

    /// Number of "no health checks" warnings emitted at startup.
    pub fn health_check_warnings(&self) -> usize {
        self.health_warning.warnings_emitted()
    }

    /// The DI module registry.
    ///
    /// Registration calls fail with [`StateError::AlreadyCommitted`] after
    /// [`commit`](Self::commit).
    pub fn modules(&mut self) -> &mut ModuleRegistry {
        &mut self.modules
    }

    /// Commits the module registry at the stage selected by the mode.
    pub fn commit(&mut self) -> Result<Arc<Injector>, DiError> {
        let injector = self.modules.commit(self.mode.stage())?;
        self.injector = Some(Arc::clone(&injector));
        Ok(injector)
    }

    /// Returns `true` once the module registry has been committed.
    pub fn is_committed(&self) -> bool {
        self.modules.is_committed()
    }

    /// The committed injector.
    ///
    /// Fails with [`StateError::NotCommitted`] before a successful
    /// [`commit`](Self::commit).
    pub fn injector(&self) -> StateResult<Arc<Injector>> {
        self.injector.clone().ok_or(StateError::NotCommitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{Binder, Stage};
    use crate::health::HealthCheckResult;
    use crate::lifecycle::Managed;

    #[derive(Debug, PartialEq)]
    struct Foo(&'static str);

    #[test]
    fn test_deadlock_check_always_registered() {
        let env = Environment::new("app", Mode::Dev);
        assert_eq!(env.health_checks().names(), vec![DEADLOCKS_CHECK]);
    }

    #[test]
    fn test_shared_registries_keep_existing_checks() {
        let checks = Arc::new(HealthCheckRegistry::new());
        checks.register("db", || Ok(HealthCheckResult::healthy()));
        let env =
            Environment::with_registries("app", Mode::Dev, Arc::clone(&checks), Arc::default());

        assert_eq!(checks.names(), vec!["db", DEADLOCKS_CHECK]);
        assert!(Arc::ptr_eq(env.health_checks(), &checks));
    }

    #[test]
    fn test_injector_before_commit_fails() {
        let env = Environment::new("app", Mode::Dev);
        assert_eq!(env.injector().unwrap_err(), StateError::NotCommitted);
        assert!(!env.is_committed());
    }

    #[test]
    fn test_commit_publishes_injector() {
        let mut env = Environment::new("app", Mode::Dev);
        env.modules()
            .register_module(|binder: &mut Binder| {
                binder.bind_instance(Arc::new(Foo("bar")));
            })
            .unwrap();

        let committed = env.commit().unwrap();
        let injector = env.injector().unwrap();
        assert!(Arc::ptr_eq(&committed, &injector));
        assert_eq!(*injector.get::<Foo>().unwrap(), Foo("bar"));
    }

    #[test]
    fn test_mode_selects_stage() {
        let mut env = Environment::new("app", Mode::Prod);
        assert_eq!(env.commit().unwrap().stage(), Stage::Production);

        let mut env = Environment::new("app", Mode::Test);
        assert_eq!(env.commit().unwrap().stage(), Stage::Development);
    }

    #[test]
    fn test_register_after_commit_fails() {
        let mut env = Environment::new("app", Mode::Dev);
        env.commit().unwrap();
        assert!(env.modules().register_instance(Arc::new(Foo("late"))).is_err());
        assert!(env.commit().is_err());
    }

    #[test]
    fn test_failed_commit_leaves_injector_unavailable() {
        let mut env = Environment::new("app", Mode::Prod);
        env.modules()
            .register_module(|binder: &mut Binder| {
                binder.bind_singleton::<Foo, _>(|_| anyhow::bail!("boom"));
            })
            .unwrap();

        assert!(env.commit().is_err());
        assert!(env.is_committed());
        assert_eq!(env.injector().unwrap_err(), StateError::NotCommitted);
    }

    #[test]
    fn test_health_check_warning_on_start() {
        let env = Environment::new("app", Mode::Dev);
        env.manage(Managed::new("noop", || Ok(()), || Ok(())));
        env.lifecycle().start().unwrap();
        assert_eq!(env.health_check_warnings(), 1);
        env.lifecycle().stop().unwrap();
    }

    #[test]
    fn test_no_warning_with_application_check() {
        let env = Environment::new("app", Mode::Dev);
        env.health_checks()
            .register("db", || Ok(HealthCheckResult::healthy()));
        env.lifecycle().start().unwrap();
        assert_eq!(env.health_check_warnings(), 0);
    }
}
