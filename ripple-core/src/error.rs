//! Error types for the reactive runtime.

use thiserror::Error;

use crate::graph::NodeId;

/// Raised when code requires a disposal scope but none is active.
///
/// A cleanup registered with no scope to own it would never run, so this is
/// reported instead of silently dropping the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DisposalScopeError {
    /// `on_cleanup` or `pop_scope` was called while the scope stack was empty.
    #[error("no active disposal scope")]
    NoActiveScope,
}

/// Errors reported by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error(transparent)]
    Scope(#[from] DisposalScopeError),

    /// A computed value was read while it was already being computed.
    #[error("circular dependency: computed {0} was read while computing itself")]
    CircularDependency(NodeId),

    /// An effect kept re-triggering itself through other effects.
    #[error("effect {node} re-ran more than {limit} times in one flush")]
    RerunLimitExceeded { node: NodeId, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_error_converts_into_reactive_error() {
        let err: ReactiveError = DisposalScopeError::NoActiveScope.into();
        assert_eq!(err, ReactiveError::Scope(DisposalScopeError::NoActiveScope));
        assert_eq!(err.to_string(), "no active disposal scope");
    }

    #[test]
    fn rerun_limit_message_names_node() {
        let err = ReactiveError::RerunLimitExceeded {
            node: NodeId::from_raw(7),
            limit: 3,
        };
        assert_eq!(err.to_string(), "effect n7 re-ran more than 3 times in one flush");
    }
}
