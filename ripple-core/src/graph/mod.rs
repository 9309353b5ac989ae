//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between signals, computeds and effects.
//!
//! # Overview
//!
//! - Nodes represent reactive values (signals, computeds) or effects.
//! - Edges represent dependencies: if A reads B, there is an edge from B to A.
//!
//! When a signal changes, the graph is walked to mark derived nodes dirty and
//! to collect the effects that must re-run.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized per runtime rather than spread over the
//!    individual signals, so disposing a node removes every edge it touches.
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. Both forward (dependencies) and reverse (dependents) edges are kept so
//!    re-tracking an observer can drop its stale edges without scanning
//!    every signal.

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeId, NodeKind};
pub(crate) use node::Reaction;
pub use scheduler::UpdateScheduler;
