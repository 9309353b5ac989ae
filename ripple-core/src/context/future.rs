//! Context propagation for futures.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use super::{ContextSnapshot, SnapshotGuard};
use crate::reactive::{ObserverGuard, Runtime};

/// A future that polls its inner future under a captured context snapshot.
///
/// Code resumed after an `.await` no longer runs inside the `provide` call
/// that surrounded its creation. Wrapping the future keeps
/// [`use_context`](super::use_context) returning the values that were active
/// when it was wrapped. Polls are untracked, so signal reads inside the
/// future never subscribe whatever observer happens to be polling it.
pub struct ScopedFuture<F> {
    inner: Pin<Box<F>>,
    runtime: Runtime,
    snapshot: ContextSnapshot,
}

impl<F> ScopedFuture<F>
where
    F: Future,
{
    /// Wrap `future` under the current runtime's context.
    pub fn new(future: F) -> Self {
        let runtime = Runtime::current();
        let snapshot = runtime.snapshot_context();
        Self::with_snapshot(runtime, snapshot, future)
    }

    /// Wrap `future` under an explicit runtime and snapshot.
    pub fn with_snapshot(runtime: Runtime, snapshot: ContextSnapshot, future: F) -> Self {
        Self {
            inner: Box::pin(future),
            runtime,
            snapshot,
        }
    }

    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }
}

impl<F> Future for ScopedFuture<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let ScopedFuture {
            inner,
            runtime,
            snapshot,
        } = self.get_mut();

        let _contexts = SnapshotGuard::install(runtime, snapshot);
        let _untracked = ObserverGuard::untracked(runtime);
        inner.as_mut().poll(cx)
    }
}

/// Extension trait for carrying the current context through a future.
pub trait InContext: Future + Sized {
    /// Capture the current context and replay it on every poll.
    fn in_current_context(self) -> ScopedFuture<Self> {
        ScopedFuture::new(self)
    }
}

impl<F: Future> InContext for F {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{create_context, use_context};

    #[tokio::test(flavor = "current_thread")]
    async fn wrapped_future_sees_context_after_await() {
        let theme = create_context::<&'static str>(None);

        let future = theme.provide("dark", || {
            let theme = theme.clone();
            async move {
                tokio::task::yield_now().await;
                use_context(&theme)
            }
            .in_current_context()
        });

        assert_eq!(use_context(&theme), None);
        assert_eq!(future.await, Some("dark"));
        assert_eq!(use_context(&theme), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unwrapped_future_loses_context() {
        let theme = create_context::<&'static str>(None);

        let future = theme.provide("dark", || {
            let theme = theme.clone();
            async move {
                tokio::task::yield_now().await;
                use_context(&theme)
            }
        });

        assert_eq!(future.await, None);
    }
}
