//! Batching
//!
//! A batch is a depth-counted transaction boundary. Signal writes inside a
//! batch update their values immediately and mark dependents dirty, but
//! queued effects only run once the outermost batch exits. Each queued
//! effect runs exactly once no matter how many of its dependencies changed.
//!
//! ```rust,ignore
//! // Without a batch the effect runs twice.
//! a.set(1);
//! b.set(2);
//!
//! // With a batch it runs once, after both writes.
//! batch(|| {
//!     a.set(1);
//!     b.set(2);
//! });
//! ```

use super::runtime::Runtime;

/// RAII guard for one level of batch depth.
///
/// Dropping the outermost guard flushes queued effects, except while
/// unwinding: the queue is left for the next write to pick up.
pub(crate) struct BatchGuard<'a> {
    runtime: &'a Runtime,
}

impl<'a> BatchGuard<'a> {
    pub(crate) fn enter(runtime: &'a Runtime) -> Self {
        runtime.with_state(|state| state.batch_depth += 1);
        Self { runtime }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let outermost = self.runtime.with_state(|state| {
            state.batch_depth = state.batch_depth.saturating_sub(1);
            state.batch_depth == 0
        });

        if outermost && !std::thread::panicking() {
            self.runtime.flush();
        }
    }
}

/// Run `f` as one batch on the current runtime.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().batch(f)
}

/// Whether the current runtime is inside a batch.
pub fn is_batching() -> bool {
    Runtime::current().is_batching()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    #[test]
    fn batch_returns_value() {
        assert_eq!(batch(|| 42), 42);
    }

    #[test]
    fn nested_batches_flatten() {
        assert!(!is_batching());

        batch(|| {
            assert!(is_batching());
            batch(|| assert!(is_batching()));
            assert!(is_batching());
        });

        assert!(!is_batching());
    }

    #[test]
    fn depth_is_restored_after_panic() {
        let runtime = Runtime::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            runtime.batch(|| panic!("handler failed"));
        }));

        assert!(result.is_err());
        assert!(!runtime.is_batching());
    }
}
