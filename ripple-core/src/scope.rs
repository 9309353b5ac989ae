//! Disposal Scopes
//!
//! A disposal scope collects cleanup callbacks registered while it sits on
//! top of a runtime's scope stack. Popping the scope hands back its
//! [`ScopeHandle`]; running the handle invokes the cleanups last-registered
//! first, like nested resources being torn down.
//!
//! Effects and computeds use the same mechanism: each run of their body gets a
//! fresh scope, which is drained before the next run and on disposal.
//!
//! ```rust,ignore
//! let scope = push_scope();
//! on_cleanup(|| println!("second"))?;
//! on_cleanup(|| println!("first"))?;
//! pop_scope()?;
//! run_cleanups(&scope);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::warn;

use crate::error::DisposalScopeError;
use crate::reactive::{Runtime, WeakRuntime};

type Cleanup = Box<dyn FnOnce()>;

/// Shared handle to the cleanups collected by one disposal scope.
///
/// Clones refer to the same list. A handle created by a runtime remembers it,
/// so [`ScopeHandle::forward_to_parent`] reaches that runtime's scope stack.
#[derive(Clone, Default)]
pub struct ScopeHandle {
    cleanups: Rc<RefCell<Vec<Cleanup>>>,
    owner: Option<WeakRuntime>,
}

impl ScopeHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn owned_by(runtime: &Runtime) -> Self {
        Self {
            cleanups: Rc::default(),
            owner: Some(runtime.downgrade()),
        }
    }

    /// The runtime this scope was pushed on, if it is still alive.
    pub fn runtime(&self) -> Option<Runtime> {
        self.owner.as_ref().and_then(WeakRuntime::upgrade)
    }

    /// Number of cleanups waiting to run.
    pub fn len(&self) -> usize {
        self.cleanups.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cleanups.borrow().is_empty()
    }

    /// Whether both handles refer to the same scope.
    pub fn same_scope(&self, other: &ScopeHandle) -> bool {
        Rc::ptr_eq(&self.cleanups, &other.cleanups)
    }

    pub(crate) fn register(&self, cleanup: Cleanup) {
        self.cleanups.borrow_mut().push(cleanup);
    }

    /// Run every registered cleanup in LIFO order and clear the list.
    ///
    /// Running an already drained handle does nothing. A panicking cleanup
    /// does not stop the others; the first panic is resumed once all of them
    /// have run.
    pub fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        if cleanups.is_empty() {
            return;
        }

        let mut first_panic = None;
        for cleanup in cleanups.into_iter().rev() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                warn!("cleanup panicked, continuing with remaining cleanups");
                first_panic.get_or_insert(payload);
            }
        }

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }

    /// Hand this scope's cleanups to the innermost scope of the runtime that
    /// created it, so they run when that parent is torn down.
    ///
    /// A handle built with [`ScopeHandle::new`] uses the current runtime.
    pub fn forward_to_parent(self) -> Result<(), DisposalScopeError> {
        let runtime = match &self.owner {
            Some(owner) => owner.upgrade().ok_or(DisposalScopeError::NoActiveScope)?,
            None => Runtime::current(),
        };
        runtime.forward_to_parent(self)
    }
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("pending_cleanups", &self.len())
            .finish()
    }
}

/// Pops a scope pushed by [`Runtime::with_scope`] even if the body unwinds.
pub(crate) struct PopScopeGuard<'a> {
    pub(crate) runtime: &'a Runtime,
    pub(crate) handle: ScopeHandle,
}

impl Drop for PopScopeGuard<'_> {
    fn drop(&mut self) {
        let popped = self.runtime.with_state(|state| state.scopes.pop());
        if let Some(popped) = popped {
            debug_assert!(
                popped.same_scope(&self.handle),
                "disposal scope stack mismatch"
            );
        }
    }
}

/// Push a new disposal scope on the current runtime.
pub fn push_scope() -> ScopeHandle {
    Runtime::current().push_scope()
}

/// Pop the innermost disposal scope of the current runtime.
pub fn pop_scope() -> Result<ScopeHandle, DisposalScopeError> {
    Runtime::current().pop_scope()
}

/// Register a cleanup with the innermost disposal scope.
///
/// Fails with [`DisposalScopeError::NoActiveScope`] when no scope is active.
pub fn on_cleanup<F>(cleanup: F) -> Result<(), DisposalScopeError>
where
    F: FnOnce() + 'static,
{
    Runtime::current().on_cleanup(cleanup)
}

/// Register a cleanup if a scope is active. Returns whether it was registered.
pub fn try_on_cleanup<F>(cleanup: F) -> bool
where
    F: FnOnce() + 'static,
{
    Runtime::current().try_on_cleanup(cleanup)
}

/// Run and clear the cleanups collected by `handle`.
pub fn run_cleanups(handle: &ScopeHandle) {
    handle.run_cleanups();
}

/// Run `f` inside a fresh disposal scope and return its result with the
/// scope's handle.
pub fn with_scope<R>(f: impl FnOnce() -> R) -> (R, ScopeHandle) {
    Runtime::current().with_scope(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn cleanups_run_lifo() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scope = push_scope();

        for name in ["f1", "f2", "f3"] {
            let log = log.clone();
            on_cleanup(move || log.borrow_mut().push(name)).unwrap();
        }

        let popped = pop_scope().unwrap();
        assert!(popped.same_scope(&scope));
        assert_eq!(scope.len(), 3);

        run_cleanups(&scope);
        assert_eq!(*log.borrow(), vec!["f3", "f2", "f1"]);
    }

    #[test]
    fn running_twice_is_a_no_op() {
        let count = Rc::new(RefCell::new(0));
        let (_, scope) = with_scope(|| {
            let count = count.clone();
            on_cleanup(move || *count.borrow_mut() += 1).unwrap();
        });

        scope.run_cleanups();
        scope.run_cleanups();
        assert_eq!(*count.borrow(), 1);
        assert!(scope.is_empty());
    }

    #[test]
    fn on_cleanup_without_scope_is_an_error() {
        assert_eq!(on_cleanup(|| {}), Err(DisposalScopeError::NoActiveScope));
        assert_eq!(pop_scope().err(), Some(DisposalScopeError::NoActiveScope));
    }

    #[test]
    fn try_on_cleanup_is_silent_without_scope() {
        assert!(!try_on_cleanup(|| {}));

        let (registered, scope) = with_scope(|| try_on_cleanup(|| {}));
        assert!(registered);
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn nested_scopes_collect_separately() {
        let (inner, outer) = with_scope(|| {
            on_cleanup(|| {}).unwrap();
            let (_, inner) = with_scope(|| {
                on_cleanup(|| {}).unwrap();
                on_cleanup(|| {}).unwrap();
            });
            inner
        });

        assert_eq!(outer.len(), 1);
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn panicking_cleanup_does_not_skip_the_rest() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (_, scope) = with_scope(|| {
            let first = log.clone();
            on_cleanup(move || first.borrow_mut().push("first")).unwrap();
            on_cleanup(|| panic!("boom")).unwrap();
            let last = log.clone();
            on_cleanup(move || last.borrow_mut().push("last")).unwrap();
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| scope.run_cleanups()));
        assert!(result.is_err());
        assert_eq!(*log.borrow(), vec!["last", "first"]);
    }

    #[test]
    fn forwarded_scope_runs_with_parent() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (_, parent) = with_scope(|| {
            let early = log.clone();
            on_cleanup(move || early.borrow_mut().push("parent")).unwrap();

            let (_, child) = with_scope(|| {
                let log = log.clone();
                on_cleanup(move || log.borrow_mut().push("child")).unwrap();
            });
            child.forward_to_parent().unwrap();
        });

        parent.run_cleanups();
        assert_eq!(*log.borrow(), vec!["child", "parent"]);
    }

    #[test]
    fn forwarding_uses_the_owning_runtime() {
        let runtime = Runtime::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let (forwarded, parent) = runtime.with_scope(|| {
            let (_, child) = runtime.with_scope(|| {
                let log = log.clone();
                runtime
                    .on_cleanup(move || log.borrow_mut().push("child"))
                    .unwrap();
            });
            assert!(child.runtime().is_some_and(|owner| owner.ptr_eq(&runtime)));
            child.forward_to_parent()
        });

        assert_eq!(forwarded, Ok(()));
        assert_eq!(parent.len(), 1);
        parent.run_cleanups();
        assert_eq!(*log.borrow(), vec!["child"]);
    }

    #[test]
    fn with_scope_pops_on_unwind() {
        let result = panic::catch_unwind(|| {
            with_scope(|| panic!("setup failed"));
        });
        assert!(result.is_err());
        assert_eq!(on_cleanup(|| {}), Err(DisposalScopeError::NoActiveScope));
    }
}
