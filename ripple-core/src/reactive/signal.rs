//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a tracking frame (computed/effect), the
//!    read is recorded and becomes a dependency edge when the frame ends.
//!
//! 2. When a signal's value changes, its runtime marks dependents dirty and
//!    re-runs the affected effects, immediately or at the end of the batch.
//!
//! 3. A write that the signal's equality policy considers equal to the
//!    current value is dropped. Nothing is notified.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A node id in its runtime's graph
//! - The value, behind a `RefCell`
//! - The equality policy
//!
//! Handles are reference counted; the node leaves the graph when the last
//! handle is dropped.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::trace;

use super::equality::{self, Equality};
use super::runtime::Runtime;
use crate::graph::{NodeId, NodeKind};

struct SignalInner<T> {
    id: NodeId,
    runtime: Runtime,
    value: RefCell<T>,
    equality: Equality<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        self.runtime.release_node(self.id);
    }
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a signal on the current runtime, compared with [`PartialEq`].
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Runtime::current().signal(value)
    }

    /// Create a signal on the current runtime with a custom comparator.
    pub fn with_equality<F>(value: T, eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Runtime::current().signal_with_equality(value, Equality::new(eq))
    }

    /// Create a signal that notifies on every write.
    pub fn always_notify(value: T) -> Self {
        Runtime::current().signal_with_equality(value, equality::never())
    }

    pub(crate) fn create(runtime: &Runtime, value: T, equality: Equality<T>) -> Self {
        let id = runtime.register_node(NodeKind::Source);
        Self {
            inner: Rc::new(SignalInner {
                id,
                runtime: runtime.clone(),
                value: RefCell::new(value),
                equality,
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Get the current value.
    ///
    /// If called within a tracking frame, this also registers the current
    /// computation as a subscriber.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    /// Borrow the current value, tracking the read.
    ///
    /// Writing to the same signal from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.runtime.track(self.inner.id);
        self.with_untracked(f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers.
    ///
    /// Returns `false` without notifying anyone when the value is equal to the
    /// current one under the signal's equality policy.
    pub fn set(&self, value: T) -> bool {
        let unchanged = {
            let current = self.inner.value.borrow();
            self.inner.equality.is_equal(&current, &value)
        };
        if unchanged {
            trace!(signal = %self.inner.id, "write skipped, value unchanged");
            return false;
        }

        let previous = self.inner.value.replace(value);
        drop(previous);
        self.inner.runtime.notify(self.inner.id);
        true
    }

    /// Mutate the value in place and notify subscribers.
    ///
    /// In-place mutation cannot be compared, so this always notifies.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut *self.inner.value.borrow_mut());
        self.inner.runtime.notify(self.inner.id);
        result
    }

    /// A read-only view of this signal.
    pub fn read_only(&self) -> ReadonlySignal<T> {
        ReadonlySignal {
            signal: self.clone(),
        }
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.runtime.subscriber_count(self.inner.id)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Signal");
        s.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.field("subscriber_count", &self.subscriber_count()).finish()
    }
}

/// A read-only view of a [`Signal`].
pub struct ReadonlySignal<T> {
    signal: Signal<T>,
}

impl<T: 'static> ReadonlySignal<T> {
    pub fn id(&self) -> NodeId {
        self.signal.id()
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.signal.get()
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.signal.get_untracked()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with_untracked(f)
    }
}

impl<T> Clone for ReadonlySignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: Debug + 'static> Debug for ReadonlySignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadonlySignal").field(&self.signal).finish()
    }
}

impl<T: 'static> From<Signal<T>> for ReadonlySignal<T> {
    fn from(signal: Signal<T>) -> Self {
        Self { signal }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
