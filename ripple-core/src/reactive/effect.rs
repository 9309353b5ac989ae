//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the runtime queues the effect. The queue
//!    is flushed right away, or when the outermost batch exits.
//!
//! 3. Before re-running, the effect runs the cleanups registered by its
//!    previous run and drops all of its old dependencies. The reads of the new
//!    run become its dependencies once the run ends.
//!
//! # Use Cases
//!
//! Effects are used to synchronize reactive state with the outside world:
//!
//! - Updating the DOM when state changes
//! - Logging state changes
//! - Making network requests
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! Cleanups registered with [`on_cleanup`](crate::scope::on_cleanup) while the
//! effect runs are called before the effect re-runs and when it is disposed.
//! Effects created while another effect runs are owned by that run and are
//! disposed with it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use super::batch::BatchGuard;
use super::runtime::Runtime;
use super::tracking::ObserverGuard;
use crate::context::{ContextSnapshot, SnapshotGuard};
use crate::graph::{NodeId, NodeKind, Reaction};
use crate::scope::ScopeHandle;

/// Disposes the effect it was returned for. Calling it again does nothing.
pub type DisposeFn = Box<dyn Fn()>;

struct EffectInner {
    id: NodeId,
    runtime: Runtime,
    callback: Box<dyn Fn()>,

    /// Context captured at creation, installed around every run.
    context: ContextSnapshot,

    /// Cleanups registered by the current run.
    cleanups: RefCell<ScopeHandle>,

    disposed: Cell<bool>,
    running: Cell<bool>,
    run_count: Cell<usize>,
}

impl EffectInner {
    fn run_once(&self) {
        let _running = RunningGuard::enter(&self.running);

        let previous = self.cleanups.replace(ScopeHandle::owned_by(&self.runtime));
        previous.run_cleanups();

        // Unsubscribe before running; the run's reads are committed after.
        self.runtime
            .with_state(|state| state.graph.clear_dependencies(self.id));

        let scope = self.cleanups.borrow().clone();
        {
            let _contexts = SnapshotGuard::install(&self.runtime, &self.context);
            let _frame = ObserverGuard::observe(&self.runtime, self.id, scope);
            (self.callback)();
        }
        self.run_count.set(self.run_count.get() + 1);

        // Disposed mid-run: anything registered after the dispose still runs.
        if self.disposed.get() {
            let late = self.cleanups.borrow().clone();
            late.run_cleanups();
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        let removed = self
            .runtime
            .with_state(|state| state.graph.remove_node(self.id));
        drop(removed);

        let cleanups = self.cleanups.borrow().clone();
        cleanups.run_cleanups();
        debug!(effect = %self.id, runs = self.run_count.get(), "effect disposed");
    }
}

impl Reaction for EffectInner {
    fn execute(&self) {
        if self.disposed.get() || self.running.get() {
            return;
        }

        trace!(effect = %self.id, run = self.run_count.get() + 1, "effect run");
        // Writes made by the callback are flushed once it returns.
        let _batch = BatchGuard::enter(&self.runtime);
        self.run_once();
    }
}

struct RunningGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The runtime keeps the effect alive until it is disposed; dropping the
/// handle does not stop it.
///
/// # Example
///
/// ```rust,ignore
/// let count = signal(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect on the current runtime.
    ///
    /// The function runs immediately to establish dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::create(&Runtime::current(), run)
    }

    pub(crate) fn create<F>(runtime: &Runtime, run: F) -> Self
    where
        F: Fn() + 'static,
    {
        let id = runtime.register_node(NodeKind::Effect);
        let inner = Rc::new(EffectInner {
            id,
            runtime: runtime.clone(),
            callback: Box::new(run),
            context: runtime.snapshot_context(),
            cleanups: RefCell::new(ScopeHandle::owned_by(runtime)),
            disposed: Cell::new(false),
            running: Cell::new(false),
            run_count: Cell::new(0),
        });

        let reaction: Rc<dyn Reaction> = inner.clone();
        runtime.with_state(|state| state.graph.attach_reaction(id, reaction));

        // The enclosing scope, if any, owns this effect's lifetime.
        let weak = Rc::downgrade(&inner);
        runtime.try_on_cleanup(move || {
            if let Some(inner) = weak.upgrade() {
                inner.dispose();
            }
        });

        inner.execute();
        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Dispose of the effect.
    ///
    /// Removes its subscriptions, drops a queued re-run and calls its pending
    /// cleanups. After disposal, the effect will not run again.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.runtime.dependency_count(self.inner.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
