//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects. It owns the dependency graph, the tracking stack, the
//! disposal scope stack, the context stacks and the effect queue.
//!
//! # How It Works
//!
//! 1. When a signal, computed or effect is created, it registers a node with
//!    the runtime.
//!
//! 2. When a computed or effect reads a signal, the runtime records the read
//!    in the innermost tracking frame. The frame's reads replace the
//!    observer's edges when it finishes.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks dependent computeds dirty, transitively
//!    b. Queues the effects reached, skipping any effect that is running
//!    c. Flushes the queue unless a batch is open
//!    d. Computeds recompute on their next read
//!
//! # Threading
//!
//! A runtime is confined to one thread. Every thread lazily creates its own
//! default runtime, reachable through [`Runtime::current`]; the free
//! functions of this crate operate on it. Independent runtimes can be built
//! with [`Runtime::new`] and used through their methods.
//!
//! No user callback is ever invoked while the runtime's state is borrowed.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, error, trace};

use super::batch::BatchGuard;
use super::computed::Computed;
use super::effect::{DisposeFn, Effect};
use super::equality::{self, Equality};
use super::signal::Signal;
use super::tracking::{ObserverGuard, TrackingFrame};
use crate::config::RuntimeConfig;
use crate::context::{Context, ContextSnapshot, ContextStacks, ProvideGuard, SnapshotGuard};
use crate::error::{DisposalScopeError, ReactiveError};
use crate::graph::{NodeId, NodeKind, UpdateScheduler};
use crate::scope::{PopScopeGuard, ScopeHandle};

/// Mutable state shared by everything created on one runtime.
pub(crate) struct RuntimeState {
    pub(crate) graph: UpdateScheduler,
    pub(crate) tracking: SmallVec<[TrackingFrame; 8]>,
    pub(crate) scopes: SmallVec<[ScopeHandle; 8]>,
    pub(crate) contexts: ContextStacks,
    pub(crate) batch_depth: usize,
    pub(crate) flushing: bool,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            graph: UpdateScheduler::new(),
            tracking: SmallVec::new(),
            scopes: SmallVec::new(),
            contexts: ContextStacks::default(),
            batch_depth: 0,
            flushing: false,
        }
    }

    /// Whether `node` has a frame on the tracking stack.
    fn is_running(&self, node: NodeId) -> bool {
        self.tracking.iter().any(|frame| frame.observer == Some(node))
    }
}

struct RuntimeInner {
    state: RefCell<RuntimeState>,

    /// Nodes whose handles were dropped while the state was borrowed.
    orphans: RefCell<Vec<NodeId>>,

    config: RuntimeConfig,
}

/// Handle to a reactive runtime. Clones share the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning reference to a runtime, held by scope handles.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

thread_local! {
    static CURRENT: Runtime = Runtime::new();
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                state: RefCell::new(RuntimeState::new()),
                orphans: RefCell::new(Vec::new()),
                config,
            }),
        }
    }

    /// The default runtime of the calling thread.
    pub fn current() -> Self {
        CURRENT.with(Runtime::clone)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether both handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut RuntimeState) -> R) -> R {
        f(&mut self.inner.state.borrow_mut())
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Create a signal compared with [`PartialEq`].
    pub fn signal<T>(&self, initial: T) -> Signal<T>
    where
        T: PartialEq + 'static,
    {
        Signal::create(self, initial, equality::partial_eq())
    }

    /// Create a signal with a custom equality policy.
    pub fn signal_with_equality<T: 'static>(&self, initial: T, equality: Equality<T>) -> Signal<T> {
        Signal::create(self, initial, equality)
    }

    pub fn computed<T, F>(&self, derive: F) -> Computed<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        Computed::create(self, derive)
    }

    /// Create an effect and return its dispose function.
    pub fn effect<F>(&self, run: F) -> DisposeFn
    where
        F: Fn() + 'static,
    {
        let effect = Effect::create(self, run);
        Box::new(move || effect.dispose())
    }

    /// Effect variant used by render-target primitives. Same scheduling.
    pub fn dom_effect<F>(&self, run: F) -> DisposeFn
    where
        F: Fn() + 'static,
    {
        self.effect(run)
    }

    /// Run `callback` whenever the value produced by `source` changes.
    ///
    /// Only `source` is tracked. `callback` receives the new value and the
    /// previous one (`None` on the first run) and runs untracked.
    pub fn watch<T, S, C>(&self, source: S, callback: C) -> DisposeFn
    where
        T: 'static,
        S: Fn() -> T + 'static,
        C: Fn(&T, Option<&T>) + 'static,
    {
        let runtime = self.clone();
        let previous: RefCell<Option<T>> = RefCell::new(None);
        self.effect(move || {
            let value = source();
            runtime.untrack(|| callback(&value, previous.borrow().as_ref()));
            *previous.borrow_mut() = Some(value);
        })
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Run `f` without recording any reads as dependencies.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _untracked = ObserverGuard::untracked(self);
        f()
    }

    /// Whether reads are currently attributed to an observer.
    pub fn is_tracking(&self) -> bool {
        self.current_observer().is_some()
    }

    /// The node that reads are currently attributed to, if any.
    pub fn current_observer(&self) -> Option<NodeId> {
        self.with_state(|state| state.tracking.last().and_then(|frame| frame.observer))
    }

    /// Record a read of `source` by the current observer.
    pub(crate) fn track(&self, source: NodeId) {
        self.with_state(|state| {
            if let Some(frame) = state.tracking.last_mut() {
                frame.record(source);
            }
        });
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Run `f` as one batch. Queued effects run when the outermost batch exits.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _batch = BatchGuard::enter(self);
        f()
    }

    pub fn is_batching(&self) -> bool {
        self.with_state(|state| state.batch_depth > 0)
    }

    /// Propagate a change of `source` and run the affected effects.
    pub(crate) fn notify(&self, source: NodeId) {
        self.sweep_orphans();

        let flush_now = self.with_state(|state| {
            let reached = state.graph.mark_changed(source);
            let mut queued = 0usize;
            for effect in reached {
                if state.is_running(effect) {
                    trace!(%source, %effect, "skipping notification of running effect");
                    continue;
                }
                if state.graph.schedule(effect) {
                    queued += 1;
                }
            }
            trace!(%source, queued, depth = state.batch_depth, "signal changed");
            state.batch_depth == 0
        });

        if flush_now {
            self.flush();
        }
    }

    /// Run queued effects until the queue is empty.
    ///
    /// Does nothing inside a batch or when a flush is already in progress;
    /// the outer flush picks up anything queued meanwhile. An effect that runs
    /// more than `rerun_limit` times is skipped for the rest of the flush; the
    /// other queued effects still run.
    pub(crate) fn flush(&self) {
        let start = self.with_state(|state| {
            if state.flushing || state.batch_depth > 0 {
                false
            } else {
                state.flushing = true;
                true
            }
        });
        if !start {
            return;
        }

        let _flushing = FlushGuard { runtime: self };
        let limit = self.inner.config.rerun_limit;
        let mut runs: HashMap<NodeId, usize> = HashMap::new();
        let mut halted: HashSet<NodeId> = HashSet::new();

        while let Some((node, reaction)) = self.with_state(|state| state.graph.next_pending()) {
            if halted.contains(&node) {
                continue;
            }
            let count = runs.entry(node).or_default();
            *count += 1;
            if *count > limit {
                let err = ReactiveError::RerunLimitExceeded { node, limit };
                error!(%err, "halting effect for the rest of this flush");
                halted.insert(node);
                continue;
            }

            trace!(%node, "running effect");
            reaction.execute();
        }

        self.sweep_orphans();
    }

    /// Number of effects waiting to run.
    pub fn pending_effects(&self) -> usize {
        self.with_state(|state| state.graph.pending_count())
    }

    // ------------------------------------------------------------------
    // Graph bookkeeping
    // ------------------------------------------------------------------

    pub(crate) fn register_node(&self, kind: NodeKind) -> NodeId {
        self.with_state(|state| state.graph.add_node(kind))
    }

    /// Remove a node whose last handle is gone.
    ///
    /// Called from `Drop` impls, which may run while the state is borrowed;
    /// in that case removal is deferred to the next notification.
    pub(crate) fn release_node(&self, node: NodeId) {
        let removed = match self.inner.state.try_borrow_mut() {
            Ok(mut state) => state.graph.remove_node(node),
            Err(_) => {
                self.inner.orphans.borrow_mut().push(node);
                None
            }
        };
        drop(removed);
    }

    fn sweep_orphans(&self) {
        let orphans = std::mem::take(&mut *self.inner.orphans.borrow_mut());
        if orphans.is_empty() {
            return;
        }
        let removed: Vec<_> = self.with_state(|state| {
            orphans
                .iter()
                .filter_map(|node| state.graph.remove_node(*node))
                .collect()
        });
        debug!(count = removed.len(), "released orphaned nodes");
    }

    /// Total number of live nodes in this runtime's graph.
    pub fn node_count(&self) -> usize {
        self.with_state(|state| state.graph.node_count())
    }

    /// Number of observers currently subscribed to `node`.
    pub fn subscriber_count(&self, node: NodeId) -> usize {
        self.with_state(|state| state.graph.dependent_count(node))
    }

    /// Number of nodes `node` currently depends on.
    pub fn dependency_count(&self, node: NodeId) -> usize {
        self.with_state(|state| state.graph.dependencies_of(node).len())
    }

    // ------------------------------------------------------------------
    // Disposal scopes
    // ------------------------------------------------------------------

    /// Push a new disposal scope and return its handle.
    pub fn push_scope(&self) -> ScopeHandle {
        let handle = ScopeHandle::owned_by(self);
        self.with_state(|state| state.scopes.push(handle.clone()));
        handle
    }

    /// Pop the innermost disposal scope.
    pub fn pop_scope(&self) -> Result<ScopeHandle, DisposalScopeError> {
        let handle = self
            .with_state(|state| state.scopes.pop())
            .ok_or(DisposalScopeError::NoActiveScope)?;
        debug!(pending = handle.len(), "popped disposal scope");
        Ok(handle)
    }

    /// Register `cleanup` with the innermost disposal scope.
    pub fn on_cleanup<F>(&self, cleanup: F) -> Result<(), DisposalScopeError>
    where
        F: FnOnce() + 'static,
    {
        let scope = self
            .with_state(|state| state.scopes.last().cloned())
            .ok_or(DisposalScopeError::NoActiveScope)?;
        scope.register(Box::new(cleanup));
        Ok(())
    }

    /// Register `cleanup` if a scope is active. Returns whether it was.
    pub fn try_on_cleanup<F>(&self, cleanup: F) -> bool
    where
        F: FnOnce() + 'static,
    {
        self.on_cleanup(cleanup).is_ok()
    }

    /// Run and clear the cleanups collected by `handle`.
    pub fn run_cleanups(&self, handle: &ScopeHandle) {
        handle.run_cleanups();
    }

    /// Hand the cleanups of `handle` to the innermost scope of this runtime.
    pub fn forward_to_parent(&self, handle: ScopeHandle) -> Result<(), DisposalScopeError> {
        self.on_cleanup(move || handle.run_cleanups())
    }

    /// Run `f` inside a fresh scope, popping it even if `f` unwinds.
    pub fn with_scope<R>(&self, f: impl FnOnce() -> R) -> (R, ScopeHandle) {
        let handle = self.push_scope();
        let value = {
            let _pop = PopScopeGuard {
                runtime: self,
                handle: handle.clone(),
            };
            f()
        };
        (value, handle)
    }

    // ------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------

    /// Provide `value` for `context` while `f` runs.
    pub fn provide<T, R>(&self, context: &Context<T>, value: T, f: impl FnOnce() -> R) -> R
    where
        T: Clone + 'static,
    {
        let id = context.id();
        self.with_state(|state| state.contexts.push(id, Rc::new(value)));
        let _pop = ProvideGuard { runtime: self, id };
        f()
    }

    /// Read the innermost provided value of `context`, or its default.
    pub fn use_context<T>(&self, context: &Context<T>) -> Option<T>
    where
        T: Clone + 'static,
    {
        let provided = self.with_state(|state| {
            state
                .contexts
                .top(context.id())
                .and_then(|value| value.downcast_ref::<T>().cloned())
        });
        provided.or_else(|| context.default_value().cloned())
    }

    /// Capture the innermost value of every provided context.
    pub fn snapshot_context(&self) -> ContextSnapshot {
        self.with_state(|state| state.contexts.snapshot())
    }

    /// Run `f` with `snapshot` installed in place of the live context stacks.
    pub fn with_context_snapshot<R>(&self, snapshot: &ContextSnapshot, f: impl FnOnce() -> R) -> R {
        let _contexts = SnapshotGuard::install(self, snapshot);
        f()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.state.try_borrow() {
            Ok(state) => f
                .debug_struct("Runtime")
                .field("nodes", &state.graph.node_count())
                .field("pending", &state.graph.pending_count())
                .field("batch_depth", &state.batch_depth)
                .field("scopes", &state.scopes.len())
                .finish(),
            Err(_) => f.write_str("Runtime { <borrowed> }"),
        }
    }
}

/// Clears the flushing flag, including when an effect panics mid-flush.
struct FlushGuard<'a> {
    runtime: &'a Runtime,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.runtime.with_state(|state| state.flushing = false);
    }
}

/// Create a signal on the current runtime.
pub fn signal<T>(initial: T) -> Signal<T>
where
    T: PartialEq + 'static,
{
    Runtime::current().signal(initial)
}

/// Create a computed value on the current runtime.
pub fn computed<T, F>(derive: F) -> Computed<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Runtime::current().computed(derive)
}

/// Create an effect on the current runtime.
pub fn effect<F>(run: F) -> DisposeFn
where
    F: Fn() + 'static,
{
    Runtime::current().effect(run)
}

/// Create a render-target effect on the current runtime.
pub fn dom_effect<F>(run: F) -> DisposeFn
where
    F: Fn() + 'static,
{
    Runtime::current().dom_effect(run)
}

/// Watch `source` on the current runtime. See [`Runtime::watch`].
pub fn watch<T, S, C>(source: S, callback: C) -> DisposeFn
where
    T: 'static,
    S: Fn() -> T + 'static,
    C: Fn(&T, Option<&T>) + 'static,
{
    Runtime::current().watch(source, callback)
}

/// Run `f` on the current runtime without tracking reads.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().untrack(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn current_runtime_is_shared_per_thread() {
        let a = Runtime::current();
        let b = Runtime::current();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Runtime::new()));
    }

    #[test]
    fn runtimes_do_not_share_scopes() {
        let first = Runtime::new();
        let second = Runtime::new();

        let _scope = first.push_scope();
        assert!(first.try_on_cleanup(|| {}));
        assert!(!second.try_on_cleanup(|| {}));
    }

    #[test]
    fn runtime_notifies_and_flushes() {
        let runtime = Runtime::new();
        let count = runtime.signal(0);
        let runs = Rc::new(Cell::new(0));

        let _dispose = runtime.effect({
            let count = count.clone();
            let runs = runs.clone();
            move || {
                count.get();
                runs.set(runs.get() + 1);
            }
        });

        assert_eq!(runs.get(), 1);
        count.set(1);
        assert_eq!(runs.get(), 2);
        assert_eq!(runtime.pending_effects(), 0);
    }

    #[test]
    fn dropped_signal_leaves_graph() {
        let runtime = Runtime::new();
        let before = runtime.node_count();
        let value = runtime.signal(1);
        assert_eq!(runtime.node_count(), before + 1);
        drop(value);
        assert_eq!(runtime.node_count(), before);
    }

    #[test]
    fn rerun_limit_halts_only_the_runaway_effect() {
        let runtime = Runtime::with_config(RuntimeConfig::new().with_rerun_limit(3));
        let ping = runtime.signal(0);
        let pong = runtime.signal(0);
        let side = runtime.signal(0);
        let forward_runs = Rc::new(Cell::new(0));
        let back_runs = Rc::new(Cell::new(0));
        let side_seen = Rc::new(RefCell::new(Vec::new()));

        let _disposers = runtime.batch(|| {
            let forward = runtime.effect({
                let (ping, pong, side, runs) =
                    (ping.clone(), pong.clone(), side.clone(), forward_runs.clone());
                move || {
                    runs.set(runs.get() + 1);
                    let value = ping.get();
                    pong.set(value + 1);
                    side.set(value);
                }
            });
            let back = runtime.effect({
                let (ping, pong, runs) = (ping.clone(), pong.clone(), back_runs.clone());
                move || {
                    runs.set(runs.get() + 1);
                    ping.set(pong.get() + 1);
                }
            });
            // Created last, so it sits behind the cycle in the queue.
            let bystander = runtime.effect({
                let (side, seen) = (side.clone(), side_seen.clone());
                move || seen.borrow_mut().push(side.get())
            });
            [forward, back, bystander]
        });

        // One run each on creation, then `limit` runs each in the flush.
        assert_eq!(forward_runs.get(), 4);
        assert_eq!(back_runs.get(), 4);
        assert_eq!(*side_seen.borrow(), vec![0, 6]);
        assert_eq!(runtime.pending_effects(), 0);
        assert!(!runtime.with_state(|state| state.flushing));

        // The halted effect stays subscribed; the next write starts a new budget.
        ping.set(100);
        assert_eq!(forward_runs.get(), 7);
        assert_eq!(back_runs.get(), 7);
        assert_eq!(*side_seen.borrow(), vec![0, 6, 104]);
    }

    #[test]
    fn dom_effect_reruns_and_disposes_like_effect() {
        let runtime = Runtime::new();
        let text = runtime.signal(String::from("a"));
        let rendered = Rc::new(RefCell::new(Vec::new()));

        let dispose = runtime.dom_effect({
            let (text, rendered) = (text.clone(), rendered.clone());
            move || rendered.borrow_mut().push(text.get())
        });
        assert_eq!(*rendered.borrow(), vec!["a"]);

        text.set(String::from("b"));
        assert_eq!(*rendered.borrow(), vec!["a", "b"]);

        dispose();
        text.set(String::from("c"));
        assert_eq!(*rendered.borrow(), vec!["a", "b"]);
        assert_eq!(text.subscriber_count(), 0);
    }

    #[test]
    fn debug_output_summarizes_state() {
        let runtime = Runtime::new();
        let _value = runtime.signal(1);
        let text = format!("{runtime:?}");
        assert!(text.contains("nodes: 1"));
    }
}
