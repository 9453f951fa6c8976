//! Named health checks.
//!
//! Health checks are registered on the environment's [`HealthCheckRegistry`]
//! and exposed by the admin `/healthcheck` endpoint. The registry always
//! carries the built-in [`DeadlockHealthCheck`] under the name `deadlocks`.
//!
//! # Example
//!
//! ```rust
//! use monkey_core::health::{HealthCheckRegistry, HealthCheckResult};
//!
//! let registry = HealthCheckRegistry::new();
//! registry.register("database", || Ok(HealthCheckResult::healthy()));
//!
//! let results = registry.run_health_checks();
//! assert!(results["database"].is_healthy());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleListener;

/// Name of the built-in deadlock check.
pub const DEADLOCKS_CHECK: &str = "deadlocks";

/// Fewer registered checks than this triggers a startup warning.
pub const MIN_HEALTH_CHECKS: usize = 2;

/// Outcome of a single health check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheckResult {
    healthy: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,

    /// Time taken by the check, in milliseconds.
    #[serde(default)]
    duration_ms: u64,
}

impl HealthCheckResult {
    /// A healthy result with no message.
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: None,
            duration_ms: 0,
        }
    }

    /// A healthy result with a message.
    #[must_use]
    pub fn healthy_with(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::healthy()
        }
    }

    /// An unhealthy result.
    #[must_use]
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    /// Returns whether the check passed.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the time the check took, in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn with_duration(mut self, started: Instant) -> Self {
        self.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// A named probe of some dependency.
///
/// Any `Fn() -> anyhow::Result<HealthCheckResult>` closure is a health check.
/// An `Err` is reported as unhealthy with the error as the message.
pub trait HealthCheck: Send + Sync {
    /// Runs the check.
    fn check(&self) -> anyhow::Result<HealthCheckResult>;
}

impl<F> HealthCheck for F
where
    F: Fn() -> anyhow::Result<HealthCheckResult> + Send + Sync,
{
    fn check(&self) -> anyhow::Result<HealthCheckResult> {
        self()
    }
}

/// Reports threads deadlocked on `parking_lot` locks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadlockHealthCheck;

impl HealthCheck for DeadlockHealthCheck {
    fn check(&self) -> anyhow::Result<HealthCheckResult> {
        let deadlocks = parking_lot::deadlock::check_deadlock();
        if deadlocks.is_empty() {
            return Ok(HealthCheckResult::healthy());
        }
        let threads: Vec<String> = deadlocks
            .iter()
            .flatten()
            .map(|thread| format!("{:?}", thread.thread_id()))
            .collect();
        Ok(HealthCheckResult::unhealthy(format!(
            "{} deadlock(s) detected involving threads [{}]",
            deadlocks.len(),
            threads.join(", ")
        )))
    }
}

/// Thread-safe registry of named health checks.
#[derive(Default)]
pub struct HealthCheckRegistry {
    checks: DashMap<String, Arc<dyn HealthCheck>>,
}

impl fmt::Debug for HealthCheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheckRegistry")
            .field("checks", &self.names())
            .finish()
    }
}

impl HealthCheckRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `deadlocks` check.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(DEADLOCKS_CHECK, DeadlockHealthCheck);
        registry
    }

    /// Registers a check, replacing any check with the same name.
    pub fn register<H: HealthCheck + 'static>(&self, name: impl Into<String>, check: H) {
        let name = name.into();
        if self.checks.insert(name.clone(), Arc::new(check)).is_some() {
            tracing::warn!(health_check = %name, "Replaced existing health check");
        } else {
            tracing::debug!(health_check = %name, "Registered health check");
        }
    }

    /// Removes a check. Returns `true` if it existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.checks.remove(name).is_some()
    }

    /// Sorted names of all registered checks.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checks.iter().map(|entry| entry.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Returns `true` if a check with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Runs one check by name.
    pub fn run_health_check(&self, name: &str) -> Option<HealthCheckResult> {
        let check = self.checks.get(name).map(|entry| Arc::clone(entry.value()))?;
        Some(Self::execute(name, check.as_ref()))
    }

    /// Runs every check, keyed by name in sorted order.
    pub fn run_health_checks(&self) -> BTreeMap<String, HealthCheckResult> {
        // Clone out of the map so slow checks do not hold shard locks.
        let checks: Vec<(String, Arc<dyn HealthCheck>)> = self
            .checks
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        checks
            .into_iter()
            .map(|(name, check)| {
                let result = Self::execute(&name, check.as_ref());
                (name, result)
            })
            .collect()
    }

    fn execute(name: &str, check: &dyn HealthCheck) -> HealthCheckResult {
        let started = Instant::now();
        let result = match check.check() {
            Ok(result) => result,
            Err(error) => HealthCheckResult::unhealthy(format!("{error:#}")),
        };
        if !result.is_healthy() {
            tracing::warn!(health_check = name, message = ?result.message(), "Health check failed");
        }
        result.with_duration(started)
    }
}

/// Warns at startup when too few health checks are registered.
///
/// Only the built-in `deadlocks` check being present usually means the
/// application forgot to register its own.
#[derive(Debug)]
pub struct HealthCheckWarningListener {
    registry: Arc<HealthCheckRegistry>,
    warnings: AtomicUsize,
}

impl HealthCheckWarningListener {
    /// Creates a listener over the given registry.
    pub fn new(registry: Arc<HealthCheckRegistry>) -> Self {
        Self {
            registry,
            warnings: AtomicUsize::new(0),
        }
    }

    /// Number of warnings emitted so far.
    pub fn warnings_emitted(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }
}

impl LifecycleListener for HealthCheckWarningListener {
    fn lifecycle_starting(&self) {
        let count = self.registry.len();
        if count < MIN_HEALTH_CHECKS {
            self.warnings.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(
                registered = count,
                checks = ?self.registry.names(),
                "THIS APPLICATION HAS NO HEALTH CHECKS. Register health checks on the environment \
                 so operators can tell whether it is working."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleContainer;

    #[test]
    fn test_with_defaults_registers_deadlocks() {
        let registry = HealthCheckRegistry::with_defaults();
        assert_eq!(registry.names(), vec![DEADLOCKS_CHECK]);
        assert!(registry.run_health_check(DEADLOCKS_CHECK).unwrap().is_healthy());
    }

    #[test]
    fn test_names_sorted() {
        let registry = HealthCheckRegistry::new();
        registry.register("zeta", || Ok(HealthCheckResult::healthy()));
        registry.register("alpha", || Ok(HealthCheckResult::healthy()));
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_error_reported_as_unhealthy() {
        let registry = HealthCheckRegistry::new();
        registry.register("db", || anyhow::bail!("connection refused"));

        let result = registry.run_health_check("db").unwrap();
        assert!(!result.is_healthy());
        assert_eq!(result.message(), Some("connection refused"));
    }

    #[test]
    fn test_run_all() {
        let registry = HealthCheckRegistry::with_defaults();
        registry.register("cache", || Ok(HealthCheckResult::unhealthy("evicting")));

        let results = registry.run_health_checks();
        assert_eq!(results.len(), 2);
        assert!(results[DEADLOCKS_CHECK].is_healthy());
        assert!(!results["cache"].is_healthy());
    }

    #[test]
    fn test_missing_check() {
        assert!(HealthCheckRegistry::new().run_health_check("nope").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let registry = HealthCheckRegistry::new();
        registry.register("db", || Ok(HealthCheckResult::unhealthy("down")));
        registry.register("db", || Ok(HealthCheckResult::healthy()));
        assert_eq!(registry.len(), 1);
        assert!(registry.run_health_check("db").unwrap().is_healthy());
        assert!(registry.unregister("db"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_result_serialization() {
        let json = serde_json::to_value(HealthCheckResult::unhealthy("down")).unwrap();
        assert_eq!(json["healthy"], false);
        assert_eq!(json["message"], "down");

        let json = serde_json::to_value(HealthCheckResult::healthy()).unwrap();
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_warning_with_only_default_check() {
        let registry = Arc::new(HealthCheckRegistry::with_defaults());
        let listener = Arc::new(HealthCheckWarningListener::new(Arc::clone(&registry)));
        let container = LifecycleContainer::new();
        container.add_shared_listener(Arc::clone(&listener) as Arc<dyn LifecycleListener>);

        container.start().unwrap();
        assert_eq!(listener.warnings_emitted(), 1);
    }

    #[test]
    fn test_no_warning_with_two_checks() {
        let registry = Arc::new(HealthCheckRegistry::with_defaults());
        registry.register("database", || Ok(HealthCheckResult::healthy()));
        let listener = Arc::new(HealthCheckWarningListener::new(Arc::clone(&registry)));
        let container = LifecycleContainer::new();
        container.add_shared_listener(Arc::clone(&listener) as Arc<dyn LifecycleListener>);

        container.start().unwrap();
        assert_eq!(listener.warnings_emitted(), 0);
    }

    #[test]
    fn test_warning_counts_checks_at_starting() {
        let registry = Arc::new(HealthCheckRegistry::new());
        let listener = HealthCheckWarningListener::new(Arc::clone(&registry));

        listener.lifecycle_starting();
        registry.register("a", || Ok(HealthCheckResult::healthy()));
        registry.register("b", || Ok(HealthCheckResult::healthy()));
        listener.lifecycle_starting();

        assert_eq!(listener.warnings_emitted(), 1);
    }
}
