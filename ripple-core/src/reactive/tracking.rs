//! Tracking Context
//!
//! The tracking context records which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read, the
//! runtime attributes the read to the innermost observer.
//!
//! # Implementation
//!
//! Each runtime keeps a stack of frames. Running a computed or an effect
//! pushes a frame naming it as the observer; [`untrack`](super::untrack)
//! pushes a frame with no observer, which swallows reads. When the frame is
//! popped, the reads it collected become the observer's dependency edges,
//! replacing whatever it depended on before.
//!
//! The frame is popped by a guard, so the stack and the graph stay
//! consistent even if the computation panics.

use smallvec::SmallVec;

use super::runtime::Runtime;
use crate::graph::NodeId;
use crate::scope::ScopeHandle;

/// An entry in the tracking stack.
#[derive(Debug, Clone)]
pub(crate) struct TrackingFrame {
    pub(crate) observer: Option<NodeId>,
    /// Nodes read during this frame, possibly with repeats.
    dependencies: SmallVec<[NodeId; 8]>,
}

impl TrackingFrame {
    fn new(observer: Option<NodeId>) -> Self {
        Self {
            observer,
            dependencies: SmallVec::new(),
        }
    }

    pub(crate) fn record(&mut self, source: NodeId) {
        match self.observer {
            Some(observer) if observer != source => self.dependencies.push(source),
            _ => {}
        }
    }

    pub(crate) fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }
}

/// Guard that pops the tracking frame when dropped.
///
/// For observer frames it also commits the collected reads to the graph and
/// pops the run's disposal scope.
pub(crate) struct ObserverGuard<'a> {
    runtime: &'a Runtime,
    observer: Option<NodeId>,
    owns_scope: bool,
}

impl<'a> ObserverGuard<'a> {
    /// Enter a frame in which reads are not tracked.
    pub(crate) fn untracked(runtime: &'a Runtime) -> Self {
        runtime.with_state(|state| state.tracking.push(TrackingFrame::new(None)));
        Self {
            runtime,
            observer: None,
            owns_scope: false,
        }
    }

    /// Enter a frame for `observer`, with `scope` collecting its cleanups.
    pub(crate) fn observe(runtime: &'a Runtime, observer: NodeId, scope: ScopeHandle) -> Self {
        runtime.with_state(|state| {
            state.tracking.push(TrackingFrame::new(Some(observer)));
            state.scopes.push(scope);
        });
        Self {
            runtime,
            observer: Some(observer),
            owns_scope: true,
        }
    }
}

impl Drop for ObserverGuard<'_> {
    fn drop(&mut self) {
        let popped_scope = self.runtime.with_state(|state| {
            let frame = state.tracking.pop();

            // Catch mismatched enter/exit pairs.
            debug_assert_eq!(
                frame.as_ref().map(|frame| frame.observer),
                Some(self.observer),
                "tracking frame mismatch"
            );

            if let (Some(frame), Some(observer)) = (frame, self.observer) {
                state
                    .graph
                    .set_dependencies(observer, frame.dependencies().iter().copied());
            }

            if self.owns_scope {
                state.scopes.pop()
            } else {
                None
            }
        });
        drop(popped_scope);
    }
}
