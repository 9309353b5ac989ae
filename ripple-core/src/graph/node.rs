//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are handed out by the owning graph in increasing order, so comparing
/// two ids tells which node was registered first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node (computed). These have dependencies and may have
    /// dependents. They cache their value and recompute lazily.
    Derived,

    /// An effect node. These are leaves of the graph.
    /// They have dependencies but no dependents.
    Effect,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// A dependency changed since the node last ran.
    Dirty,
}

/// Something the scheduler can re-run when its dependencies change.
///
/// Only effects attach a reaction to their node; computeds are pulled on read.
pub(crate) trait Reaction {
    fn execute(&self);
}

/// A node in the dependency graph.
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    dirty: DirtyState,

    /// Nodes that this node reads from, in first-read order.
    dependencies: IndexSet<NodeId>,

    /// Nodes that read from this node, in subscription order.
    dependents: IndexSet<NodeId>,

    reaction: Option<Rc<dyn Reaction>>,
}

impl Node {
    /// Create a new node with the given kind.
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dirty: match kind {
                NodeKind::Source => DirtyState::Clean,
                // Start dirty to ensure first computation
                NodeKind::Derived => DirtyState::Dirty,
                NodeKind::Effect => DirtyState::Dirty,
            },
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            reaction: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    pub(crate) fn add_dependency(&mut self, node_id: NodeId) {
        self.dependencies.insert(node_id);
    }

    pub(crate) fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    pub(crate) fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub(crate) fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    pub(crate) fn take_dependencies(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.dependencies)
    }

    pub(crate) fn set_reaction(&mut self, reaction: Rc<dyn Reaction>) {
        self.reaction = Some(reaction);
    }

    pub(crate) fn reaction(&self) -> Option<&Rc<dyn Reaction>> {
        self.reaction.as_ref()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("dirty", &self.dirty)
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("has_reaction", &self.reaction.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_node_starts_clean() {
        let node = Node::new(NodeId::from_raw(0), NodeKind::Source);
        assert_eq!(node.kind(), NodeKind::Source);
        assert!(node.is_clean());
    }

    #[test]
    fn derived_node_starts_dirty() {
        let node = Node::new(NodeId::from_raw(1), NodeKind::Derived);
        assert_eq!(node.kind(), NodeKind::Derived);
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn dependencies_keep_insertion_order() {
        let mut node = Node::new(NodeId::from_raw(2), NodeKind::Effect);
        let a = NodeId::from_raw(10);
        let b = NodeId::from_raw(5);
        let c = NodeId::from_raw(7);

        node.add_dependency(a);
        node.add_dependency(b);
        node.add_dependency(a);
        node.add_dependency(c);

        let order: Vec<_> = node.dependencies().iter().copied().collect();
        assert_eq!(order, vec![a, b, c]);

        node.remove_dependency(b);
        let order: Vec<_> = node.dependencies().iter().copied().collect();
        assert_eq!(order, vec![a, c]);
    }

    #[test]
    fn dirty_state_transitions() {
        let mut node = Node::new(NodeId::from_raw(3), NodeKind::Derived);

        node.mark_clean();
        assert_eq!(node.dirty_state(), DirtyState::Clean);

        node.mark_dirty();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn node_ids_display_with_prefix() {
        assert_eq!(NodeId::from_raw(42).to_string(), "n42");
        assert!(NodeId::from_raw(1) < NodeId::from_raw(2));
    }
}
