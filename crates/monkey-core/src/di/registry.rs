//! The commit-once module registry.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::binder::{Binder, Binding, Injectable, Module, Registration, Scope};
use super::{DiError, Injector, Stage};
use crate::error::{StateError, StateResult};

/// Rewrites or validates the pending registrations right before commit.
///
/// Any `Fn(&mut Vec<Registration>) -> anyhow::Result<()>` closure is a
/// processor.
pub trait ModuleProcessor: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Processes the pending registrations in place.
    fn process(&self, registrations: &mut Vec<Registration>) -> anyhow::Result<()>;
}

impl<F> ModuleProcessor for F
where
    F: Fn(&mut Vec<Registration>) -> anyhow::Result<()> + Send + Sync,
{
    fn process(&self, registrations: &mut Vec<Registration>) -> anyhow::Result<()> {
        self(registrations)
    }
}

/// Lifecycle state of a [`ModuleRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// Accepting registrations.
    Open,
    /// Committed; terminal.
    Committed,
}

/// Accumulates modules, overrides and processors, then builds one injector.
///
/// The registry moves from [`RegistryState::Open`] to
/// [`RegistryState::Committed`] exactly once. Every mutating call made after
/// that fails with [`StateError::AlreadyCommitted`], and so does a second
/// [`commit`](Self::commit). A commit that fails part-way still leaves the
/// registry committed; the caller is expected to abort startup.
pub struct ModuleRegistry {
    state: RegistryState,
    modules: Vec<Registration>,
    overrides: Vec<Registration>,
    processors: Vec<Box<dyn ModuleProcessor>>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("state", &self.state)
            .field("modules", &self.modules.len())
            .field("overrides", &self.overrides.len())
            .field("processors", &self.processors.len())
            .finish()
    }
}

impl ModuleRegistry {
    /// Creates an open, empty registry.
    pub fn new() -> Self {
        Self {
            state: RegistryState::Open,
            modules: Vec::new(),
            overrides: Vec::new(),
            processors: Vec::new(),
        }
    }

    fn ensure_open(&self, operation: &'static str) -> StateResult<()> {
        match self.state {
            RegistryState::Open => Ok(()),
            RegistryState::Committed => Err(StateError::already_committed(operation)),
        }
    }

    /// Queues a registration.
    pub fn register(&mut self, registration: Registration) -> StateResult<&mut Self> {
        self.ensure_open("register")?;
        tracing::debug!(registration = registration.name(), "Queued registration");
        self.modules.push(registration);
        Ok(self)
    }

    /// Queues a module.
    pub fn register_module<M: Module + 'static>(&mut self, module: M) -> StateResult<&mut Self> {
        self.register(Registration::module(module))
    }

    /// Queues several registrations, in iteration order.
    pub fn register_modules<I>(&mut self, registrations: I) -> StateResult<&mut Self>
    where
        I: IntoIterator<Item = Registration>,
    {
        self.ensure_open("register")?;
        for registration in registrations {
            self.register(registration)?;
        }
        Ok(self)
    }

    /// Queues a single-binding registration for an existing instance.
    pub fn register_instance<T: Send + Sync + 'static>(
        &mut self,
        value: Arc<T>,
    ) -> StateResult<&mut Self> {
        self.register(Binding::instance(value).into())
    }

    /// Queues an eager singleton binding for an [`Injectable`] type.
    ///
    /// The value is constructed while the injector is built.
    pub fn register_type<T: Injectable>(&mut self) -> StateResult<&mut Self> {
        self.register(Binding::injectable::<T>(Scope::EagerSingleton).into())
    }

    /// Queues a module whose bindings take precedence over every regular
    /// registration. Among overrides, the last registered wins.
    pub fn override_with<M: Module + 'static>(&mut self, module: M) -> StateResult<&mut Self> {
        self.override_with_registration(Registration::module(module))
    }

    /// Queues an override registration.
    pub fn override_with_registration(
        &mut self,
        registration: Registration,
    ) -> StateResult<&mut Self> {
        self.ensure_open("override")?;
        tracing::debug!(registration = registration.name(), "Queued override");
        self.overrides.push(registration);
        Ok(self)
    }

    /// Queues several override registrations, in iteration order.
    pub fn override_with_modules<I>(&mut self, registrations: I) -> StateResult<&mut Self>
    where
        I: IntoIterator<Item = Registration>,
    {
        self.ensure_open("override")?;
        for registration in registrations {
            self.override_with_registration(registration)?;
        }
        Ok(self)
    }

    /// Queues a processor run against the pending registrations at commit.
    pub fn register_processor<P: ModuleProcessor + 'static>(
        &mut self,
        processor: P,
    ) -> StateResult<&mut Self> {
        self.ensure_open("register processor")?;
        self.processors.push(Box::new(processor));
        Ok(self)
    }

    /// The current state.
    pub fn state(&self) -> RegistryState {
        self.state
    }

    /// Returns `true` once [`commit`](Self::commit) has been called.
    pub fn is_committed(&self) -> bool {
        self.state == RegistryState::Committed
    }

    /// Number of pending regular registrations.
    pub fn pending(&self) -> usize {
        self.modules.len()
    }

    /// Number of pending override registrations.
    pub fn pending_overrides(&self) -> usize {
        self.overrides.len()
    }

    /// Freezes the registry and builds the injector.
    ///
    /// Runs processors in registration order, configures every registration
    /// followed by every override into one binder, and builds the injector
    /// at `stage`.
    pub fn commit(&mut self, stage: Stage) -> Result<Arc<Injector>, DiError> {
        self.ensure_open("commit")?;
        self.state = RegistryState::Committed;

        let started = Instant::now();
        let mut modules = std::mem::take(&mut self.modules);
        let overrides = std::mem::take(&mut self.overrides);
        let processors = std::mem::take(&mut self.processors);

        for processor in &processors {
            tracing::debug!(processor = processor.name(), "Running module processor");
            processor
                .process(&mut modules)
                .map_err(|source| DiError::Processor {
                    processor: processor.name().to_string(),
                    source,
                })?;
        }

        let module_count = modules.len();
        let override_count = overrides.len();
        let mut binder = Binder::new();
        for registration in modules.into_iter().chain(overrides) {
            registration.configure_into(&mut binder);
        }

        let injector = Injector::build(binder.into_bindings(), stage)?;
        let elapsed = started.elapsed();

        ::metrics::histogram!("monkey_di_commit_seconds").record(elapsed.as_secs_f64());
        tracing::info!(
            stage = ?stage,
            modules = module_count,
            overrides = override_count,
            bindings = injector.len(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Module registry committed"
        );

        Ok(Arc::new(injector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::InjectionError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Foo(u32);

    #[derive(Debug)]
    struct Bar;

    struct FooModule(u32);

    impl Module for FooModule {
        fn configure(&self, binder: &mut Binder) {
            binder.bind_instance(Arc::new(Foo(self.0)));
        }
    }

    #[test]
    fn test_new_registry_is_open() {
        let registry = ModuleRegistry::new();
        assert_eq!(registry.state(), RegistryState::Open);
        assert!(!registry.is_committed());
    }

    #[test]
    fn test_commit_exposes_registered_bindings() {
        let mut registry = ModuleRegistry::new();
        registry
            .register_module(FooModule(1))
            .unwrap()
            .register_instance(Arc::new(Bar))
            .unwrap();

        let injector = registry.commit(Stage::Development).unwrap();
        assert_eq!(*injector.get::<Foo>().unwrap(), Foo(1));
        assert!(injector.contains::<Bar>());
        assert!(registry.is_committed());
    }

    #[test]
    fn test_register_after_commit_fails() {
        let mut registry = ModuleRegistry::new();
        registry.commit(Stage::Development).unwrap();

        let err = registry.register_module(FooModule(1)).unwrap_err();
        assert_eq!(err, StateError::already_committed("register"));
        assert!(registry.register_instance(Arc::new(Bar)).is_err());
        assert!(registry.override_with(FooModule(2)).is_err());
        assert!(registry
            .register_processor(|_: &mut Vec<Registration>| Ok(()))
            .is_err());
    }

    #[test]
    fn test_second_commit_fails_without_rerunning_processors() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let mut registry = ModuleRegistry::new();
        registry
            .register_processor(move |_: &mut Vec<Registration>| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        registry.commit(Stage::Development).unwrap();
        let err = registry.commit(Stage::Development).unwrap_err();

        assert!(matches!(err, DiError::State(StateError::AlreadyCommitted { .. })));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_override_takes_precedence() {
        let mut registry = ModuleRegistry::new();
        registry.override_with(FooModule(99)).unwrap();
        registry.register_module(FooModule(1)).unwrap();

        let injector = registry.commit(Stage::Development).unwrap();
        assert_eq!(*injector.get::<Foo>().unwrap(), Foo(99));
    }

    #[test]
    fn test_last_override_wins() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(FooModule(1)).unwrap();
        registry.override_with(FooModule(2)).unwrap();
        registry.override_with(FooModule(3)).unwrap();

        let injector = registry.commit(Stage::Development).unwrap();
        assert_eq!(*injector.get::<Foo>().unwrap(), Foo(3));
    }

    #[test]
    fn test_processors_run_in_order_and_can_rewrite() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);

        let mut registry = ModuleRegistry::new();
        registry.register_module(FooModule(1)).unwrap();
        registry
            .register_processor(move |regs: &mut Vec<Registration>| {
                first.lock().push("first");
                regs.push(Registration::module(FooModule(7)));
                Ok(())
            })
            .unwrap()
            .register_processor(move |regs: &mut Vec<Registration>| {
                second.lock().push("second");
                assert_eq!(regs.len(), 2);
                Ok(())
            })
            .unwrap();

        let injector = registry.commit(Stage::Development).unwrap();
        assert_eq!(*order.lock(), vec!["first", "second"]);
        assert_eq!(*injector.get::<Foo>().unwrap(), Foo(7));
    }

    #[test]
    fn test_processor_failure_leaves_registry_committed() {
        let mut registry = ModuleRegistry::new();
        registry
            .register_processor(|_: &mut Vec<Registration>| anyhow::bail!("tracing misconfigured"))
            .unwrap();

        let err = registry.commit(Stage::Development).unwrap_err();
        assert!(matches!(err, DiError::Processor { .. }));
        assert!(registry.is_committed());
        assert!(registry.register_module(FooModule(1)).is_err());
    }

    #[test]
    fn test_register_type_is_eager() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);

        struct Service;

        impl Injectable for Service {
            fn inject(_: &Injector) -> Result<Self, InjectionError> {
                BUILT.fetch_add(1, Ordering::SeqCst);
                Ok(Self)
            }
        }

        let mut registry = ModuleRegistry::new();
        registry.register_type::<Service>().unwrap();
        let injector = registry.commit(Stage::Development).unwrap();

        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
        injector.get::<Service>().unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_type_missing_dependency_fails_commit() {
        struct NeedsFoo;

        impl Injectable for NeedsFoo {
            fn inject(injector: &Injector) -> Result<Self, InjectionError> {
                injector.get::<Foo>()?;
                Ok(Self)
            }
        }

        let mut registry = ModuleRegistry::new();
        registry.register_type::<NeedsFoo>().unwrap();
        let err = registry.commit(Stage::Development).unwrap_err();
        assert!(matches!(err, DiError::Injection(_)));
    }

    #[test]
    fn test_override_with_modules_last_wins() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(FooModule(1)).unwrap();
        registry
            .override_with_modules(vec![
                Registration::module(FooModule(5)),
                Registration::from(Binding::instance(Arc::new(Foo(6)))),
            ])
            .unwrap();

        let injector = registry.commit(Stage::Development).unwrap();
        assert_eq!(*injector.get::<Foo>().unwrap(), Foo(6));
    }

    #[test]
    fn test_pending_lists_cleared_after_commit() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(FooModule(1)).unwrap();
        registry.override_with(FooModule(2)).unwrap();
        assert_eq!(registry.pending(), 1);
        assert_eq!(registry.pending_overrides(), 1);

        registry.commit(Stage::Development).unwrap();
        assert_eq!(registry.pending(), 0);
        assert_eq!(registry.pending_overrides(), 0);
    }

    #[test]
    fn test_register_modules_keeps_order() {
        let mut registry = ModuleRegistry::new();
        registry
            .register_modules(vec![
                Registration::module(FooModule(1)),
                Registration::module(FooModule(2)),
            ])
            .unwrap();

        let injector = registry.commit(Stage::Development).unwrap();
        assert_eq!(*injector.get::<Foo>().unwrap(), Foo(2));
    }
}
