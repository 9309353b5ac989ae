//! Update Scheduler
//!
//! The scheduler owns every node of a runtime's dependency graph together
//! with the queue of effects waiting to re-run.
//!
//! # Algorithm
//!
//! Propagation is push-then-pull:
//!
//! 1. When a source node changes, walk its dependents breadth-first.
//! 2. Derived nodes reached by the walk are marked dirty. Their own dependents
//!    are walked in turn. Nothing is recomputed here.
//! 3. Effect nodes reached by the walk are returned to the caller, which
//!    queues them.
//! 4. Effects run later in creation order. A dirty derived node recomputes
//!    only when something reads it.
//!
//! Every effect therefore runs at most once per flush and only ever observes
//! fully updated derived values.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use indexmap::IndexSet;

use super::node::{Node, NodeId, NodeKind, Reaction};

/// The update scheduler manages the dependency graph and coordinates updates.
pub struct UpdateScheduler {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,

    /// Effects waiting to run, ordered by node id (registration order).
    pending: BTreeSet<NodeId>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 0,
            pending: BTreeSet::new(),
        }
    }

    /// Add a node of the given kind and return its id.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_raw(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, kind));
        id
    }

    pub(crate) fn attach_reaction(&mut self, node_id: NodeId, reaction: Rc<dyn Reaction>) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.set_reaction(reaction);
        }
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node and drops it from the
    /// pending queue. The removed node is handed back so the caller can drop
    /// its reaction outside of any borrow of the graph.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;
        self.pending.remove(&node_id);

        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        Some(node)
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// Both nodes must exist; an edge to a removed node is never recorded.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) -> bool {
        if dependency == dependent
            || !self.nodes.contains_key(&dependency)
            || !self.nodes.contains_key(&dependent)
        {
            return false;
        }
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(dependency);
        }
        true
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Drop every edge from `node_id` to the nodes it reads.
    pub fn clear_dependencies(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        for dep_id in node.take_dependencies() {
            if let Some(dep) = self.nodes.get_mut(&dep_id) {
                dep.remove_dependent(node_id);
            }
        }
    }

    /// Replace the dependency set of `observer` with `dependencies`.
    ///
    /// Returns `false` when the observer is no longer part of the graph (it
    /// was disposed while running), in which case nothing is recorded.
    pub fn set_dependencies<I>(&mut self, observer: NodeId, dependencies: I) -> bool
    where
        I: IntoIterator<Item = NodeId>,
    {
        if !self.nodes.contains_key(&observer) {
            return false;
        }
        self.clear_dependencies(observer);
        for dependency in dependencies {
            self.add_edge(dependency, observer);
        }
        true
    }

    pub fn is_dirty(&self, node_id: NodeId) -> bool {
        self.nodes
            .get(&node_id)
            .map(|node| !node.is_clean())
            .unwrap_or(false)
    }

    pub fn mark_clean(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_clean();
        }
    }

    pub fn mark_dirty(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_dirty();
        }
    }

    /// Mark a source node as changed and propagate dirty flags.
    ///
    /// Returns the effect nodes reached, in the order they were discovered.
    pub fn mark_changed(&mut self, source_id: NodeId) -> Vec<NodeId> {
        let mut effects = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(source) = self.nodes.get(&source_id) {
            queue.extend(source.dependents().iter().copied());
        }

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }

            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };

            node.mark_dirty();
            match node.kind() {
                NodeKind::Effect => effects.push(node_id),
                NodeKind::Derived => queue.extend(node.dependents().iter().copied()),
                NodeKind::Source => {}
            }
        }

        effects
    }

    /// Queue an effect node. Returns `false` if it was already queued.
    pub fn schedule(&mut self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id) && self.pending.insert(node_id)
    }

    /// Remove the earliest-registered queued effect together with its reaction.
    ///
    /// Queued ids whose node has gone away are skipped.
    pub(crate) fn next_pending(&mut self) -> Option<(NodeId, Rc<dyn Reaction>)> {
        while let Some(node_id) = self.pending.pop_first() {
            if let Some(reaction) = self.nodes.get(&node_id).and_then(Node::reaction) {
                return Some((node_id, Rc::clone(reaction)));
            }
        }
        None
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn dependencies_of(&self, node_id: NodeId) -> IndexSet<NodeId> {
        self.nodes
            .get(&node_id)
            .map(|node| node.dependencies().clone())
            .unwrap_or_default()
    }

    pub fn dependent_count(&self, node_id: NodeId) -> usize {
        self.nodes
            .get(&node_id)
            .map(|node| node.dependents().len())
            .unwrap_or(0)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}
