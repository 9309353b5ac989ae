//! Context Propagation
//!
//! A [`Context`] is an identity-keyed ambient value. [`Context::provide`]
//! pushes a value for the dynamic extent of a closure; [`use_context`] reads
//! the innermost provided value, falling back to the context's default.
//!
//! # Replaying context
//!
//! Effects and computeds re-run long after the `provide` call that surrounded
//! their creation has returned. To keep reads stable they capture a
//! [`ContextSnapshot`] when created and install it around every later run.
//! [`ScopedFuture`] does the same for async continuations: each poll runs
//! under the snapshot taken when the future was wrapped.
//!
//! ```rust,ignore
//! let theme = create_context::<&str>(None);
//! let count = signal(0);
//! theme.provide("dark", || {
//!     effect(move || {
//!         count.get();
//!         println!("{:?}", use_context(&theme));
//!     });
//! });
//! count.set(1); // still prints Some("dark")
//! ```

mod future;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::reactive::Runtime;

pub use future::{InContext, ScopedFuture};

/// Identity of a context, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// An ambient value that can be provided to everything running underneath.
///
/// Two contexts never share values, even when they carry the same type.
#[derive(Clone)]
pub struct Context<T> {
    id: ContextId,
    default: Option<T>,
}

impl<T> Context<T>
where
    T: Clone + 'static,
{
    pub fn new(default: Option<T>) -> Self {
        Self {
            id: ContextId::new(),
            default,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn default_value(&self) -> Option<&T> {
        self.default.as_ref()
    }

    /// Provide `value` while `f` runs on the current runtime.
    ///
    /// The value is popped when `f` returns or unwinds.
    pub fn provide<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        Runtime::current().provide(self, value, f)
    }

    /// Read the innermost provided value, or the default.
    pub fn get(&self) -> Option<T> {
        Runtime::current().use_context(self)
    }
}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Create a new context with an optional default value.
pub fn create_context<T>(default: Option<T>) -> Context<T>
where
    T: Clone + 'static,
{
    Context::new(default)
}

/// Read `context` on the current runtime.
///
/// Returns `None` when nothing is provided and the context has no default.
/// Callers that require a provider decide for themselves whether that is an
/// error.
pub fn use_context<T>(context: &Context<T>) -> Option<T>
where
    T: Clone + 'static,
{
    Runtime::current().use_context(context)
}

type ContextValue = Rc<dyn Any>;

/// Per-runtime value stacks, one per provided context.
#[derive(Default)]
pub(crate) struct ContextStacks {
    stacks: HashMap<ContextId, Vec<ContextValue>>,
}

impl ContextStacks {
    pub(crate) fn push(&mut self, id: ContextId, value: ContextValue) {
        self.stacks.entry(id).or_default().push(value);
    }

    pub(crate) fn pop(&mut self, id: ContextId) -> Option<ContextValue> {
        let stack = self.stacks.get_mut(&id)?;
        let value = stack.pop();
        if stack.is_empty() {
            self.stacks.remove(&id);
        }
        value
    }

    pub(crate) fn top(&self, id: ContextId) -> Option<&ContextValue> {
        self.stacks.get(&id).and_then(|stack| stack.last())
    }

    pub(crate) fn snapshot(&self) -> ContextSnapshot {
        let values: Vec<_> = self
            .stacks
            .iter()
            .filter_map(|(id, stack)| stack.last().map(|value| (*id, Rc::clone(value))))
            .collect();
        ContextSnapshot {
            values: values.into(),
        }
    }

    pub(crate) fn from_snapshot(snapshot: &ContextSnapshot) -> Self {
        let stacks = snapshot
            .values
            .iter()
            .map(|(id, value)| (*id, vec![Rc::clone(value)]))
            .collect();
        Self { stacks }
    }
}

/// The innermost value of every context that was provided at capture time.
#[derive(Clone)]
pub struct ContextSnapshot {
    values: Rc<[(ContextId, ContextValue)]>,
}

impl ContextSnapshot {
    /// A snapshot with no provided values.
    pub fn empty() -> Self {
        Self {
            values: Rc::new([]),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the snapshot holds a provided value for `context`.
    pub fn contains<T>(&self, context: &Context<T>) -> bool {
        self.values.iter().any(|(id, _)| *id == context.id)
    }
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.values.iter().map(|(id, _)| id))
            .finish()
    }
}

/// Pops a provided value when dropped.
pub(crate) struct ProvideGuard<'a> {
    pub(crate) runtime: &'a Runtime,
    pub(crate) id: ContextId,
}

impl Drop for ProvideGuard<'_> {
    fn drop(&mut self) {
        let popped = self.runtime.with_state(|state| state.contexts.pop(self.id));
        // The value may own reactive handles; release it outside the borrow.
        drop(popped);
    }
}

/// Installs a snapshot in place of the live context stacks until dropped.
pub(crate) struct SnapshotGuard<'a> {
    runtime: &'a Runtime,
    saved: Option<ContextStacks>,
}

impl<'a> SnapshotGuard<'a> {
    pub(crate) fn install(runtime: &'a Runtime, snapshot: &ContextSnapshot) -> Self {
        let installed = ContextStacks::from_snapshot(snapshot);
        let saved = runtime.with_state(|state| std::mem::replace(&mut state.contexts, installed));
        Self {
            runtime,
            saved: Some(saved),
        }
    }
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            let replaced = self
                .runtime
                .with_state(|state| std::mem::replace(&mut state.contexts, saved));
            drop(replaced);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn default_is_returned_without_provider() {
        let theme = create_context(Some("light"));
        let locale = create_context::<String>(None);

        assert_eq!(use_context(&theme), Some("light"));
        assert_eq!(use_context(&locale), None);
    }

    #[test]
    fn nested_providers_shadow_and_restore() {
        let theme = create_context::<&'static str>(None);

        theme.provide("dark", || {
            let inner = theme.provide("blue", || use_context(&theme));
            assert_eq!(inner, Some("blue"));
            assert_eq!(use_context(&theme), Some("dark"));
        });

        assert_eq!(use_context(&theme), None);
    }

    #[test]
    fn contexts_with_same_type_are_independent() {
        let a = create_context::<i32>(None);
        let b = create_context::<i32>(Some(0));

        a.provide(1, || {
            assert_eq!(a.get(), Some(1));
            assert_eq!(b.get(), Some(0));
        });
    }

    #[test]
    fn provide_pops_on_panic() {
        let theme = create_context::<&'static str>(None);
        let handle = theme.clone();

        let result = panic::catch_unwind(move || {
            handle.provide("dark", || panic!("render failed"));
        });

        assert!(result.is_err());
        assert_eq!(use_context(&theme), None);
    }

    #[test]
    fn snapshot_keeps_innermost_values() {
        let theme = create_context::<&'static str>(None);
        let other = create_context::<u8>(None);
        let runtime = Runtime::current();

        let snapshot = theme.provide("dark", || {
            theme.provide("blue", || runtime.snapshot_context())
        });

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&theme));
        assert!(!snapshot.contains(&other));

        let seen = runtime.with_context_snapshot(&snapshot, || use_context(&theme));
        assert_eq!(seen, Some("blue"));
        assert_eq!(use_context(&theme), None);
    }
}
