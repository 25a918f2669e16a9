//! `Await`, §4.6. Waits for a user predicate to become true, re-evaluated
//! once per full dispatcher pass rather than on every wake — the spec's
//! way of keeping polling cheap and deterministic without tying the
//! predicate to any particular channel or future. Grounded on the
//! teacher's `when`/`observable` coroutine parameters, which re-check a
//! closure against the `World` each tick rather than subscribing to a
//! specific change event.

use std::future::Future as StdFuture;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use wf_core::CancelledError;

use crate::scope::{Scope, WaitingReason};

/// Suspends the calling coroutine until `predicate` returns `true`, or the
/// coroutine's context is cancelled. The dispatcher re-runs `predicate`
/// once after every full pass over the ready queue goes quiet (§4.6) —
/// from the coroutine's point of view this is indistinguishable from "the
/// predicate is checked again each time something interesting may have
/// changed".
pub fn await_until<'a, F>(scope: &'a Scope, predicate: F) -> AwaitFuture<'a, F>
where
    F: FnMut() -> bool + 'a,
{
    AwaitFuture { scope, predicate }
}

pub struct AwaitFuture<'a, F> {
    scope: &'a Scope,
    predicate: F,
}

impl<'a, F> StdFuture for AwaitFuture<'a, F>
where
    F: FnMut() -> bool + Unpin,
{
    type Output = Result<(), CancelledError>;

    fn poll(mut self: Pin<&mut Self>, _task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        if (self.predicate)() {
            return Poll::Ready(Ok(()));
        }
        if self.scope.context().is_cancelled() {
            return Poll::Ready(Err(CancelledError { cause: self.scope.context().cause().unwrap_or_default() }));
        }
        self.scope.record_blocked(WaitingReason::AwaitPredicate);
        Poll::Pending
    }
}
