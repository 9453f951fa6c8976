//! Bindings, modules and the binder modules configure themselves into.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use super::{InjectionError, Injector};

/// Type-erased service value stored by the injector.
pub(crate) type AnyService = Arc<dyn Any + Send + Sync>;

/// Type-erased provider closure.
pub(crate) type Provider =
    Arc<dyn Fn(&Injector) -> Result<AnyService, InjectionError> + Send + Sync>;

/// How often a binding's provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A pre-built instance; the provider never runs.
    Instance,
    /// A new value on every lookup.
    Prototype,
    /// Created once, on first lookup (or at build time in
    /// [`Stage::Production`](super::Stage::Production)).
    Singleton,
    /// Created once, at injector build time, in every stage.
    EagerSingleton,
}

pub(crate) enum BindingSource {
    Instance(AnyService),
    Provider(Provider),
}

/// A single type-to-value binding.
pub struct Binding {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) scope: Scope,
    pub(crate) source: BindingSource,
}

impl Binding {
    /// Binds `T` to an existing instance.
    pub fn instance<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            scope: Scope::Instance,
            source: BindingSource::Instance(value),
        }
    }

    /// Binds `T` to a provider with the given scope.
    ///
    /// Passing [`Scope::Instance`] is treated as [`Scope::Singleton`] since a
    /// provider has no instance to hand out until it runs.
    pub fn provider<T, F>(scope: Scope, provider: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Injector) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        let provider: Provider = Arc::new(move |injector| {
            provider(injector)
                .map(|value| Arc::new(value) as AnyService)
                .map_err(|e| InjectionError::provider_failed(type_name, &e))
        });
        let scope = if scope == Scope::Instance {
            Scope::Singleton
        } else {
            scope
        };
        Self {
            type_id: TypeId::of::<T>(),
            type_name,
            scope,
            source: BindingSource::Provider(provider),
        }
    }

    /// Binds an [`Injectable`] type as a singleton with the given scope.
    pub fn injectable<T: Injectable>(scope: Scope) -> Self {
        Self::provider(scope, |injector| T::inject(injector).map_err(anyhow::Error::from))
    }

    /// The bound type's name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The bound type's id.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The binding's scope.
    pub fn scope(&self) -> Scope {
        self.scope
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .finish()
    }
}

/// A type that can construct itself from an [`Injector`].
///
/// This is constructor injection without reflection: the type asks the
/// injector for each of its dependencies.
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Builds the value, resolving dependencies from `injector`.
    fn inject(injector: &Injector) -> Result<Self, InjectionError>;
}

/// A unit of configuration that contributes bindings.
///
/// Any `Fn(&mut Binder)` closure is a module.
pub trait Module: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Adds this module's bindings to `binder`.
    fn configure(&self, binder: &mut Binder);
}

impl<F> Module for F
where
    F: Fn(&mut Binder) + Send + Sync,
{
    fn configure(&self, binder: &mut Binder) {
        self(binder);
    }
}

/// Collects bindings while modules configure themselves.
#[derive(Debug, Default)]
pub struct Binder {
    bindings: Vec<Binding>,
}

impl Binder {
    /// Creates an empty binder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pre-built binding.
    pub fn bind(&mut self, binding: Binding) -> &mut Self {
        self.bindings.push(binding);
        self
    }

    /// Binds `T` to an existing instance.
    pub fn bind_instance<T: Send + Sync + 'static>(&mut self, value: Arc<T>) -> &mut Self {
        self.bind(Binding::instance(value))
    }

    /// Binds `T` to a provider that runs on every lookup.
    pub fn bind_provider<T, F>(&mut self, provider: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Injector) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.bind(Binding::provider(Scope::Prototype, provider))
    }

    /// Binds `T` to a lazily created singleton.
    pub fn bind_singleton<T, F>(&mut self, provider: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Injector) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.bind(Binding::provider(Scope::Singleton, provider))
    }

    /// Binds `T` to a singleton created when the injector is built.
    pub fn bind_eager_singleton<T, F>(&mut self, provider: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Injector) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.bind(Binding::provider(Scope::EagerSingleton, provider))
    }

    /// Binds an [`Injectable`] type as a lazy singleton.
    pub fn bind_injectable<T: Injectable>(&mut self) -> &mut Self {
        self.bind(Binding::injectable::<T>(Scope::Singleton))
    }

    /// Configures a nested module into this binder.
    pub fn install(&mut self, module: &dyn Module) -> &mut Self {
        tracing::trace!(module = module.name(), "Installing module");
        module.configure(self);
        self
    }

    /// Number of bindings collected so far.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if no bindings were collected.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn into_bindings(self) -> Vec<Binding> {
        self.bindings
    }
}

/// A queued registration: either a whole module or a single binding.
pub enum Registration {
    /// A module that configures any number of bindings.
    Module(Box<dyn Module>),
    /// A single binding registered directly.
    Binding(Binding),
}

impl Registration {
    /// Wraps a module.
    pub fn module<M: Module + 'static>(module: M) -> Self {
        Self::Module(Box::new(module))
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Module(module) => module.name(),
            Self::Binding(binding) => binding.type_name,
        }
    }

    /// Returns `true` if this registration is a module.
    pub fn is_module(&self) -> bool {
        matches!(self, Self::Module(_))
    }

    pub(crate) fn configure_into(self, binder: &mut Binder) {
        match self {
            Self::Module(module) => {
                binder.install(module.as_ref());
            }
            Self::Binding(binding) => {
                binder.bind(binding);
            }
        }
    }
}

impl From<Binding> for Registration {
    fn from(binding: Binding) -> Self {
        Self::Binding(binding)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(module) => f.debug_tuple("Module").field(&module.name()).finish(),
            Self::Binding(binding) => f.debug_tuple("Binding").field(binding).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeting(&'static str);

    struct GreetingModule;

    impl Module for GreetingModule {
        fn configure(&self, binder: &mut Binder) {
            binder.bind_instance(Arc::new(Greeting("hello")));
        }
    }

    #[test]
    fn test_module_default_name_is_type_name() {
        assert!(GreetingModule.name().ends_with("GreetingModule"));
    }

    #[test]
    fn test_closure_is_module() {
        let module = |binder: &mut Binder| {
            binder.bind_instance(Arc::new(Greeting("hi")));
        };
        let mut binder = Binder::new();
        binder.install(&module);
        assert_eq!(binder.len(), 1);
    }

    #[test]
    fn test_provider_with_instance_scope_becomes_singleton() {
        let binding = Binding::provider(Scope::Instance, |_| Ok(Greeting("x")));
        assert_eq!(binding.scope(), Scope::Singleton);
    }

    #[test]
    fn test_registration_names() {
        let module = Registration::module(GreetingModule);
        assert!(module.is_module());
        assert!(module.name().ends_with("GreetingModule"));

        let binding: Registration = Binding::instance(Arc::new(Greeting("x"))).into();
        assert!(!binding.is_module());
        assert!(binding.name().ends_with("Greeting"));
    }

    #[test]
    fn test_registration_configure_into() {
        let mut binder = Binder::new();
        Registration::module(GreetingModule).configure_into(&mut binder);
        Registration::from(Binding::instance(Arc::new(7_u32))).configure_into(&mut binder);
        assert_eq!(binder.into_bindings().len(), 2);
    }
}
