//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds and
//! effects, plus the batching and tracking machinery that connects them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking frame (such as a computed or effect), the read registers
//! that frame's owner as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changed, and only once something reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as updating the DOM or logging.
//!
//! # Implementation Notes
//!
//! Every primitive belongs to a [`Runtime`]. The free functions in this
//! module use the calling thread's default runtime; tests and embedders that
//! need isolation create their own with [`Runtime::new`].
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod batch;
mod computed;
mod effect;
pub mod equality;
mod runtime;
mod signal;
mod tracking;

pub use batch::{batch, is_batching};
pub use computed::Computed;
pub use effect::{DisposeFn, Effect};
pub use equality::Equality;
pub use runtime::{computed, dom_effect, effect, signal, untrack, watch, Runtime};
pub use signal::{ReadonlySignal, Signal};

pub(crate) use runtime::WeakRuntime;
pub(crate) use tracking::ObserverGuard;
