//! The immutable injector produced by a committed module registry.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::binder::{AnyService, Binding, BindingSource, Scope};
use super::{InjectionError, Stage};

thread_local! {
    /// Types currently being constructed on this thread, innermost last.
    static RESOLVING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// Marks a type as under construction for the lifetime of the guard.
struct ResolutionGuard {
    type_id: TypeId,
}

impl ResolutionGuard {
    fn enter(type_id: TypeId, type_name: &'static str) -> Result<Self, InjectionError> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&type_id) {
                return Err(InjectionError::cycle(type_name));
            }
            stack.push(type_id);
            Ok(Self { type_id })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.type_id) {
                stack.remove(pos);
            }
        });
    }
}

struct Slot {
    type_name: &'static str,
    scope: Scope,
    source: BindingSource,
    cell: OnceCell<AnyService>,
}

/// A committed, immutable set of bindings.
///
/// The injector is `Send + Sync`; lazy singletons are created at most once
/// even when first requested from several threads.
pub struct Injector {
    stage: Stage,
    slots: HashMap<TypeId, Slot>,
    order: Vec<TypeId>,
}

impl Injector {
    /// Builds an injector from bindings at the given stage.
    ///
    /// When several bindings target the same type, the last one wins. Eager
    /// singletons (and, in [`Stage::Production`], every singleton) are
    /// instantiated before this returns, in binding order.
    pub fn build(bindings: Vec<Binding>, stage: Stage) -> Result<Self, InjectionError> {
        let mut slots = HashMap::with_capacity(bindings.len());
        let mut order = Vec::with_capacity(bindings.len());

        for binding in bindings {
            let replaced = slots.insert(
                binding.type_id,
                Slot {
                    type_name: binding.type_name,
                    scope: binding.scope,
                    source: binding.source,
                    cell: OnceCell::new(),
                },
            );
            if replaced.is_some() {
                tracing::debug!(binding = binding.type_name, "Binding overridden");
                order.retain(|id| *id != binding.type_id);
            }
            order.push(binding.type_id);
        }

        let injector = Self {
            stage,
            slots,
            order,
        };
        injector.instantiate_eager()?;
        Ok(injector)
    }

    fn instantiate_eager(&self) -> Result<(), InjectionError> {
        for type_id in &self.order {
            let slot = &self.slots[type_id];
            let eager = match slot.scope {
                Scope::EagerSingleton => true,
                Scope::Singleton => self.stage == Stage::Production,
                Scope::Instance | Scope::Prototype => false,
            };
            if eager {
                tracing::trace!(binding = slot.type_name, "Instantiating eager singleton");
                self.resolve(*type_id, slot.type_name)?;
            }
        }
        Ok(())
    }

    fn resolve(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<AnyService, InjectionError> {
        let slot = self
            .slots
            .get(&type_id)
            .ok_or_else(|| InjectionError::not_registered_named(type_name))?;

        match &slot.source {
            BindingSource::Instance(value) => Ok(Arc::clone(value)),
            BindingSource::Provider(provider) => {
                if slot.scope == Scope::Prototype {
                    let _guard = ResolutionGuard::enter(type_id, slot.type_name)?;
                    return provider(self);
                }
                if let Some(value) = slot.cell.get() {
                    return Ok(Arc::clone(value));
                }
                let _guard = ResolutionGuard::enter(type_id, slot.type_name)?;
                slot.cell.get_or_try_init(|| provider(self)).map(Arc::clone)
            }
        }
    }

    /// Resolves `T`, failing if it is not bound or cannot be built.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectionError> {
        let type_name = std::any::type_name::<T>();
        self.resolve(TypeId::of::<T>(), type_name)?
            .downcast::<T>()
            .map_err(|_| InjectionError::custom::<T>("binding holds a value of another type"))
    }

    /// Resolves `T`, returning `None` on any failure.
    pub fn try_get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get().ok()
    }

    /// Returns `true` if `T` is bound.
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    /// The stage this injector was built at.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Sorted names of all bound types.
    pub fn binding_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.values().map(|slot| slot.type_name).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of bindings.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("stage", &self.stage)
            .field("binding_count", &self.slots.len())
            .finish()
    }
}
