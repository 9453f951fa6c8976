//! Dependency injection: modules, bindings, the commit-once module registry
//! and the immutable injector it produces.
//!
//! Applications and bundles queue [`Registration`]s on a [`ModuleRegistry`]
//! while the environment is being assembled. A single call to
//! [`ModuleRegistry::commit`] configures every queued module into one binding
//! table and builds an [`Injector`]; after that, the registry rejects any
//! further registration.
//!
//! # Example
//!
//! ```rust
//! use monkey_core::di::{Binder, ModuleRegistry, Stage};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct Repository {
//!     db: Arc<Database>,
//! }
//!
//! let mut registry = ModuleRegistry::new();
//! registry
//!     .register_module(|binder: &mut Binder| {
//!         binder.bind_instance(Arc::new(Database { url: "postgres://localhost/db".into() }));
//!         binder.bind_singleton(|injector| {
//!             Ok(Repository { db: injector.get::<Database>()? })
//!         });
//!     })
//!     .unwrap();
//!
//! let injector = registry.commit(Stage::Development).unwrap();
//! let repo = injector.get::<Repository>().unwrap();
//! assert_eq!(repo.db.url, "postgres://localhost/db");
//! ```

mod binder;
mod injector;
mod registry;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::StateError;

pub use binder::{Binder, Binding, Injectable, Module, Registration, Scope};
pub use injector::Injector;
pub use registry::{ModuleProcessor, ModuleRegistry, RegistryState};

/// The stage an injector is built at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    /// Only eager singletons are created at build time; everything else is
    /// created on first use.
    #[default]
    Development,
    /// Every singleton is created at build time so wiring errors surface
    /// during startup.
    Production,
}

/// Why a type could not be resolved from an [`Injector`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectionError {
    /// Nothing is bound for the type.
    #[error("no binding for {type_name}")]
    NotBound {
        /// The requested type.
        type_name: &'static str,
    },

    /// The binding's provider returned an error.
    #[error("provider for {type_name} failed: {reason}")]
    ProviderFailed {
        /// The type being built.
        type_name: &'static str,
        /// The provider's error chain.
        reason: String,
    },

    /// The type depends on itself, directly or through other bindings.
    #[error("dependency cycle detected while resolving {type_name}")]
    Cycle {
        /// The type whose resolution re-entered itself.
        type_name: &'static str,
    },

    /// Any other resolution failure, reported by an [`Injectable`].
    #[error("cannot inject {type_name}: {reason}")]
    Other {
        /// The type being built.
        type_name: &'static str,
        /// Explanation.
        reason: String,
    },
}

impl InjectionError {
    /// No binding exists for `T`.
    pub fn not_registered<T: ?Sized>() -> Self {
        Self::not_registered_named(std::any::type_name::<T>())
    }

    pub(crate) fn not_registered_named(type_name: &'static str) -> Self {
        Self::NotBound { type_name }
    }

    /// `T` cannot be built for `reason`.
    pub fn custom<T: ?Sized>(reason: impl Into<String>) -> Self {
        Self::Other {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    pub(crate) fn provider_failed(type_name: &'static str, source: &anyhow::Error) -> Self {
        Self::ProviderFailed {
            type_name,
            reason: format!("{source:#}"),
        }
    }

    pub(crate) fn cycle(type_name: &'static str) -> Self {
        Self::Cycle { type_name }
    }

    /// The type that failed to resolve.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NotBound { type_name }
            | Self::ProviderFailed { type_name, .. }
            | Self::Cycle { type_name }
            | Self::Other { type_name, .. } => type_name,
        }
    }
}

/// Errors raised while committing a [`ModuleRegistry`].
#[derive(Error, Debug)]
pub enum DiError {
    /// The registry was used in the wrong phase.
    #[error(transparent)]
    State(#[from] StateError),

    /// A module processor rejected the pending module list.
    #[error("module processor '{processor}' failed")]
    Processor {
        /// Name of the failing processor.
        processor: String,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// Building the injector failed.
    #[error(transparent)]
    Injection(#[from] InjectionError),
}

/// A resolved dependency, held as a field of an [`Injectable`] type.
///
/// ```rust
/// use monkey_core::di::{Inject, InjectionError, Injectable, Injector};
///
/// struct Clock;
///
/// struct Scheduler {
///     clock: Inject<Clock>,
/// }
///
/// impl Injectable for Scheduler {
///     fn inject(injector: &Injector) -> Result<Self, InjectionError> {
///         Ok(Self { clock: Inject::resolve(injector)? })
///     }
/// }
/// ```
pub struct Inject<T: ?Sized>(Arc<T>);

impl<T: Send + Sync + 'static> Inject<T> {
    /// Resolves `T` from `injector`.
    pub fn resolve(injector: &Injector) -> Result<Self, InjectionError> {
        injector.get::<T>().map(Self)
    }
}

impl<T: ?Sized> Inject<T> {
    /// Another handle to the same instance.
    pub fn shared(&self) -> Arc<T> {
        Arc::clone(&self.0)
    }
}

impl<T: ?Sized> From<Arc<T>> for Inject<T> {
    fn from(value: Arc<T>) -> Self {
        Self(value)
    }
}

impl<T: ?Sized> Clone for Inject<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> std::ops::Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
