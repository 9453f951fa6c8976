//! Sequencing errors for the bootstrap core.
//!
//! A [`StateError`] means the caller invoked an operation in the wrong phase
//! of startup (registering a module after commit, reading the injector before
//! commit). These are wiring bugs and are never retried.

use thiserror::Error;

/// Result type alias using [`StateError`].
pub type StateResult<T> = Result<T, StateError>;

/// An operation was invoked in a phase that does not allow it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The module registry has already been committed.
    #[error("module registry already committed; cannot {operation}")]
    AlreadyCommitted {
        /// The rejected operation.
        operation: &'static str,
    },

    /// The injector was requested before the module registry was committed.
    #[error("injector is not available before commit")]
    NotCommitted,
}

impl StateError {
    /// Creates an [`StateError::AlreadyCommitted`] for the given operation.
    pub fn already_committed(operation: &'static str) -> Self {
        Self::AlreadyCommitted { operation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_committed_display() {
        let err = StateError::already_committed("register module");
        assert!(err.to_string().contains("already committed"));
        assert!(err.to_string().contains("register module"));
    }

    #[test]
    fn test_not_committed_display() {
        assert_eq!(
            StateError::NotCommitted.to_string(),
            "injector is not available before commit"
        );
    }
}
