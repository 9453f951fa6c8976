//! Coordinated start and stop of managed components.
//!
//! A [`LifecycleContainer`] owns an ordered list of [`LifeCycle`] children
//! (executors, HTTP servers, connection pools) and drives them through a
//! single state machine:
//!
//! ```text
//! Stopped -> Starting -> Started -> Stopping -> Stopped
//!               |
//!               +-> Failed
//! ```
//!
//! # Execution Order
//!
//! - **Start**: children start in attachment order. The first failure moves
//!   the container to `Failed`; later children are not started and earlier
//!   ones keep running.
//! - **Stop**: children stop in reverse attachment order. Every child gets a
//!   stop attempt; failures are logged and returned together.
//!
//! # Example
//!
//! ```rust
//! use monkey_core::lifecycle::{LifecycleContainer, LifecycleState, Managed};
//!
//! let container = LifecycleContainer::new();
//! container.attach(Managed::new("pool", || Ok(()), || Ok(())));
//!
//! container.start().unwrap();
//! assert_eq!(container.state(), LifecycleState::Started);
//!
//! container.stop().unwrap();
//! assert_eq!(container.state(), LifecycleState::Stopped);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// A component whose start and stop are driven by a [`LifecycleContainer`].
pub trait LifeCycle: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Starts the component. Blocks until it is ready.
    fn start(&self) -> anyhow::Result<()>;

    /// Stops the component. Blocks until it has released its resources.
    fn stop(&self) -> anyhow::Result<()>;
}

type Hook = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Adapts a pair of closures into a [`LifeCycle`] child.
pub struct Managed {
    name: String,
    on_start: Hook,
    on_stop: Hook,
}

impl Managed {
    /// Creates a managed child from start and stop closures.
    pub fn new<S, T>(name: impl Into<String>, on_start: S, on_stop: T) -> Self
    where
        S: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
        T: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            on_start: Box::new(on_start),
            on_stop: Box::new(on_stop),
        }
    }

    /// Creates a managed child that only needs to be stopped.
    pub fn on_stop<T>(name: impl Into<String>, on_stop: T) -> Self
    where
        T: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(name, || Ok(()), on_stop)
    }
}

impl fmt::Debug for Managed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed").field("name", &self.name).finish()
    }
}

impl LifeCycle for Managed {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> anyhow::Result<()> {
        (self.on_start)()
    }

    fn stop(&self) -> anyhow::Result<()> {
        (self.on_stop)()
    }
}

/// State of a [`LifecycleContainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Not running. Initial state, and the state after a clean stop.
    Stopped,
    /// Children are being started.
    Starting,
    /// Every child started.
    Started,
    /// Children are being stopped.
    Stopping,
    /// A child failed to start.
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A single child's stop failure.
#[derive(Debug)]
pub struct ChildStopFailure {
    /// Name of the child.
    pub child: String,
    /// The error it returned.
    pub error: anyhow::Error,
}

impl fmt::Display for ChildStopFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.child, self.error)
    }
}

/// Error type for lifecycle transitions.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A child failed to start; the container is now `Failed`.
    #[error("lifecycle child '{child}' failed to start")]
    ChildStartFailed {
        /// Name of the failing child.
        child: String,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// One or more children failed to stop. Every child was still attempted.
    #[error("{} lifecycle child(ren) failed to stop: {}", failures.len(), join_failures(failures))]
    StopFailures {
        /// Failures in the order they occurred.
        failures: Vec<ChildStopFailure>,
    },

    /// The transition is not allowed from the current state.
    #[error("cannot {operation} lifecycle container while {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state at the time of the call.
        state: LifecycleState,
    },
}

fn join_failures(failures: &[ChildStopFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for lifecycle transitions.
pub type LifecycleResult<T = ()> = Result<T, LifecycleError>;

/// Observes container transitions. Every method defaults to a no-op.
pub trait LifecycleListener: Send + Sync {
    /// The container is about to start its children.
    fn lifecycle_starting(&self) {}

    /// Every child started.
    fn lifecycle_started(&self) {}

    /// A child failed to start.
    fn lifecycle_failure(&self, _child: &str, _error: &anyhow::Error) {}

    /// The container is about to stop its children.
    fn lifecycle_stopping(&self) {}

    /// Every child was given a stop attempt.
    fn lifecycle_stopped(&self) {}
}

struct Child {
    component: Arc<dyn LifeCycle>,
    started: AtomicBool,
}

/// Ordered set of managed children with coordinated start and stop.
///
/// Calls are expected to come from the startup thread one at a time; the
/// container is still `Send + Sync` so it can be shared through the
/// environment.
pub struct LifecycleContainer {
    state: RwLock<LifecycleState>,
    children: RwLock<Vec<Arc<Child>>>,
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl Default for LifecycleContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LifecycleContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleContainer")
            .field("state", &*self.state.read())
            .field("children", &self.child_names())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl LifecycleContainer {
    /// Creates a stopped container with no children.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::Stopped),
            children: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Attaches a child.
    ///
    /// Allowed in any state. A child attached while the container is
    /// `Started` is not started automatically.
    pub fn attach<L: LifeCycle + 'static>(&self, child: L) -> &Self {
        self.attach_shared(Arc::new(child))
    }

    /// Attaches a shared child.
    pub fn attach_shared(&self, child: Arc<dyn LifeCycle>) -> &Self {
        let state = *self.state.read();
        if state == LifecycleState::Started {
            tracing::warn!(
                child = child.name(),
                "Child attached to a started container will not be started automatically"
            );
        }
        tracing::debug!(child = child.name(), "Attached lifecycle child");
        self.children.write().push(Arc::new(Child {
            component: child,
            started: AtomicBool::new(false),
        }));
        self
    }

    /// Registers a listener.
    pub fn add_listener<L: LifecycleListener + 'static>(&self, listener: L) -> &Self {
        self.add_shared_listener(Arc::new(listener))
    }

    /// Registers a shared listener.
    pub fn add_shared_listener(&self, listener: Arc<dyn LifecycleListener>) -> &Self {
        self.listeners.write().push(listener);
        self
    }

    /// The current state.
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Returns `true` when every child has started.
    pub fn is_started(&self) -> bool {
        self.state() == LifecycleState::Started
    }

    /// Returns `true` after a child failed to start.
    pub fn is_failed(&self) -> bool {
        self.state() == LifecycleState::Failed
    }

    /// Names of attached children, in attachment order.
    pub fn child_names(&self) -> Vec<String> {
        self.children
            .read()
            .iter()
            .map(|child| child.component.name().to_string())
            .collect()
    }

    /// Number of attached children.
    pub fn len(&self) -> usize {
        self.children.read().len()
    }

    /// Returns `true` if no child is attached.
    pub fn is_empty(&self) -> bool {
        self.children.read().is_empty()
    }

    // Snapshots let children and listeners call back into the container.
    fn children_snapshot(&self) -> Vec<Arc<Child>> {
        self.children.read().clone()
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn LifecycleListener>> {
        self.listeners.read().clone()
    }

    /// Starts every child in attachment order.
    ///
    /// A no-op when already `Started`. Fails with
    /// [`LifecycleError::InvalidState`] while `Starting`, `Stopping` or
    /// `Failed`.
    pub fn start(&self) -> LifecycleResult {
        {
            let mut state = self.state.write();
            match *state {
                LifecycleState::Started => return Ok(()),
                LifecycleState::Stopped => *state = LifecycleState::Starting,
                other => {
                    return Err(LifecycleError::InvalidState {
                        operation: "start",
                        state: other,
                    })
                }
            }
        }

        let listeners = self.listeners_snapshot();
        for listener in &listeners {
            listener.lifecycle_starting();
        }

        let children = self.children_snapshot();
        tracing::info!(children = children.len(), "Starting lifecycle container");

        for child in &children {
            let name = child.component.name();
            tracing::debug!(child = name, "Starting lifecycle child");
            if let Err(source) = child.component.start() {
                tracing::error!(
                    child = name,
                    error = %format!("{source:#}"),
                    "Lifecycle child failed to start"
                );
                *self.state.write() = LifecycleState::Failed;
                for listener in &listeners {
                    listener.lifecycle_failure(name, &source);
                }
                return Err(LifecycleError::ChildStartFailed {
                    child: name.to_string(),
                    source,
                });
            }
            child.started.store(true, Ordering::SeqCst);
        }

        *self.state.write() = LifecycleState::Started;
        for listener in &listeners {
            listener.lifecycle_started();
        }
        tracing::info!("Lifecycle container started");
        Ok(())
    }

    /// Stops children in reverse attachment order.
    ///
    /// A no-op when already `Stopped`. From `Failed`, only the children that
    /// started successfully are stopped and the container stays `Failed`.
    /// Fails with [`LifecycleError::InvalidState`] while `Starting` or
    /// `Stopping`.
    pub fn stop(&self) -> LifecycleResult {
        let from_failed = {
            let mut state = self.state.write();
            match *state {
                LifecycleState::Stopped => return Ok(()),
                LifecycleState::Started => {
                    *state = LifecycleState::Stopping;
                    false
                }
                LifecycleState::Failed => true,
                other => {
                    return Err(LifecycleError::InvalidState {
                        operation: "stop",
                        state: other,
                    })
                }
            }
        };

        let listeners = self.listeners_snapshot();
        for listener in &listeners {
            listener.lifecycle_stopping();
        }

        let children = self.children_snapshot();
        tracing::info!(children = children.len(), "Stopping lifecycle container");

        let mut failures = Vec::new();
        for child in children.iter().rev() {
            let was_started = child.started.swap(false, Ordering::SeqCst);
            if from_failed && !was_started {
                continue;
            }
            let name = child.component.name();
            tracing::debug!(child = name, "Stopping lifecycle child");
            if let Err(error) = child.component.stop() {
                tracing::error!(
                    child = name,
                    error = %format!("{error:#}"),
                    "Lifecycle child failed to stop"
                );
                failures.push(ChildStopFailure {
                    child: name.to_string(),
                    error,
                });
            }
        }

        if !from_failed {
            *self.state.write() = LifecycleState::Stopped;
        }
        for listener in &listeners {
            listener.lifecycle_stopped();
        }

        if failures.is_empty() {
            tracing::info!("Lifecycle container stopped");
            Ok(())
        } else {
            Err(LifecycleError::StopFailures { failures })
        }
    }
}
