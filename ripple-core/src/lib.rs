//! Ripple Core
//!
//! This crate provides the fine-grained reactive runtime of the Ripple UI
//! framework. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Push-then-pull change propagation over a dependency graph
//! - Batching of writes
//! - Disposal scopes that own cleanups and nested lifetimes
//! - Context values that follow effects and futures across re-runs
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and the runtime that drives them
//! - `graph`: Dependency graph and effect queue
//! - `scope`: Disposal scopes
//! - `context`: Ambient context values and async propagation
//! - `config`: Runtime tuning
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{computed, effect, signal};
//!
//! // Create a signal
//! let count = signal(0);
//!
//! // Create a derived value
//! let doubled = computed({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let dispose = effect({
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     move || println!("Count: {}, Doubled: {}", count.get(), doubled.get())
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//! dispose();
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod scope;

pub use config::RuntimeConfig;
pub use context::{create_context, use_context, Context, InContext, ScopedFuture};
pub use error::{DisposalScopeError, ReactiveError};
pub use reactive::*;
pub use scope::{
    on_cleanup, pop_scope, push_scope, run_cleanups, try_on_cleanup, with_scope, ScopeHandle,
};
