//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its derivation under its own
//!    tracking frame and caches the result.
//!
//! 2. When accessed again, if no dependency has changed, the cached value is
//!    returned.
//!
//! 3. When a dependency changes, the runtime marks the computed dirty and
//!    walks on to whatever reads it. Nothing is recomputed at that point.
//!
//! 4. On next access, a dirty computed re-runs its derivation. The reads of
//!    that run replace its previous dependency edges, so branches that are no
//!    longer taken stop notifying it.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay dirty (no wasted work)
//!
//! # Cycles
//!
//! Reading a computed from inside its own derivation, directly or through
//! other computeds, is a dependency cycle. [`Computed::try_get`] reports it
//! as [`ReactiveError::CircularDependency`]; [`Computed::get`] panics.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::{debug, trace};

use super::batch::BatchGuard;
use super::runtime::Runtime;
use super::tracking::ObserverGuard;
use crate::context::{ContextSnapshot, SnapshotGuard};
use crate::error::ReactiveError;
use crate::graph::{DirtyState, NodeId, NodeKind};
use crate::scope::ScopeHandle;

struct ComputedInner<T> {
    id: NodeId,
    runtime: Runtime,
    derive: Box<dyn Fn() -> T>,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,

    /// Set while the derivation runs; a read in that window is a cycle.
    computing: Cell<bool>,
    disposed: Cell<bool>,

    /// Context captured at creation, installed around every derivation.
    context: ContextSnapshot,

    /// Cleanups registered by the current derivation.
    cleanups: RefCell<ScopeHandle>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.runtime.release_node(self.id);
        self.cleanups.get_mut().run_cleanups();
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = signal(2);
/// let doubled = computed({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: 'static> Computed<T> {
    /// Create a computed on the current runtime.
    ///
    /// The derivation is not run immediately. It runs on first access.
    pub fn new<F>(derive: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Runtime::current().computed(derive)
    }

    pub(crate) fn create<F>(runtime: &Runtime, derive: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let id = runtime.register_node(NodeKind::Derived);
        let inner = Rc::new(ComputedInner {
            id,
            runtime: runtime.clone(),
            derive: Box::new(derive),
            value: RefCell::new(None),
            computing: Cell::new(false),
            disposed: Cell::new(false),
            context: runtime.snapshot_context(),
            cleanups: RefCell::new(ScopeHandle::owned_by(runtime)),
        });

        // The enclosing scope, if any, owns this computed's lifetime.
        let weak = Rc::downgrade(&inner);
        runtime.try_on_cleanup(move || {
            if let Some(inner) = weak.upgrade() {
                Computed { inner }.dispose();
            }
        });

        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Borrow the current value, recomputing first if necessary.
    ///
    /// The read is tracked by the current observer, also when the derivation
    /// fails. Writes made by `f` are flushed after the borrow ends.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ReactiveError> {
        self.inner.runtime.track(self.inner.id);
        self.refresh()?;
        let _batch = BatchGuard::enter(&self.inner.runtime);
        Ok(self.borrow_cached(f))
    }

    pub fn try_get(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the computed is read from inside its own derivation.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recomputing if necessary.
    ///
    /// `f` may write to the computed's own dependencies; effects triggered by
    /// those writes run once `f` has returned.
    ///
    /// # Panics
    ///
    /// Panics if the computed is read from inside its own derivation.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.try_with(f) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value without tracking the read.
    ///
    /// Still recomputes a dirty value; only the dependency edge is skipped.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.runtime.untrack(|| self.get())
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        let inner = &self.inner;
        if inner.disposed.get() {
            return DirtyState::Clean;
        }
        if inner.runtime.with_state(|state| state.graph.is_dirty(inner.id)) {
            DirtyState::Dirty
        } else {
            DirtyState::Clean
        }
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Stop tracking dependencies. The last value stays readable.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.replace(true) {
            return;
        }

        let removed = inner
            .runtime
            .with_state(|state| state.graph.remove_node(inner.id));
        drop(removed);

        let cleanups = inner.cleanups.borrow().clone();
        cleanups.run_cleanups();
        debug!(computed = %inner.id, "computed disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.runtime.dependency_count(self.inner.id)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.runtime.subscriber_count(self.inner.id)
    }

    fn borrow_cached<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.borrow();
        f(value.as_ref().expect("refreshed computed should have a value"))
    }

    /// Recompute the value if it is missing or stale.
    fn refresh(&self) -> Result<(), ReactiveError> {
        let inner = &*self.inner;
        if inner.computing.get() {
            return Err(ReactiveError::CircularDependency(inner.id));
        }

        let stale = !inner.disposed.get()
            && inner
                .runtime
                .with_state(|state| state.graph.is_dirty(inner.id));
        if !stale && self.has_value() {
            return Ok(());
        }

        // Writes made by the derivation are flushed once it has finished.
        let _batch = BatchGuard::enter(&inner.runtime);
        let _computing = ComputingGuard::enter(inner);

        // Clean before running, so a write during the run dirties it again.
        inner
            .runtime
            .with_state(|state| state.graph.mark_clean(inner.id));

        let previous = inner.cleanups.replace(ScopeHandle::owned_by(&inner.runtime));
        previous.run_cleanups();
        let scope = inner.cleanups.borrow().clone();

        trace!(computed = %inner.id, "recomputing");
        let value = {
            let _contexts = SnapshotGuard::install(&inner.runtime, &inner.context);
            if inner.disposed.get() {
                let _untracked = ObserverGuard::untracked(&inner.runtime);
                (inner.derive)()
            } else {
                let _frame = ObserverGuard::observe(&inner.runtime, inner.id, scope);
                (inner.derive)()
            }
        };

        let replaced = inner.value.replace(Some(value));
        drop(replaced);
        Ok(())
    }
}

/// Clears the computing flag. A derivation that panics leaves the node dirty
/// so the next read tries again.
struct ComputingGuard<'a, T> {
    inner: &'a ComputedInner<T>,
}

impl<'a, T> ComputingGuard<'a, T> {
    fn enter(inner: &'a ComputedInner<T>) -> Self {
        inner.computing.set(true);
        Self { inner }
    }
}

impl<T> Drop for ComputingGuard<'_, T> {
    fn drop(&mut self) {
        self.inner.computing.set(false);
        if std::thread::panicking() {
            let id = self.inner.id;
            self.inner
                .runtime
                .with_state(|state| state.graph.mark_dirty(id));
        }
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Computed");
        s.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.field("disposed", &self.is_disposed()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
