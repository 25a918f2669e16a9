//! `Scope` is the single ambient handle threaded through every coroutine
//! body — the spec's Go/channel vocabulary needs something to spawn
//! children and create channels/futures/selectors from, the way the
//! teacher's `Fib` parameter is the handle through which a coroutine waits
//! on ticks, durations, and sub-coroutines. We generalize `Fib` into
//! `Scope`: instead of ECS primitives (`next_tick`, `change::<T>`) it offers
//! the workflow primitives (`channel`, `settable`, `selector`, `spawn`,
//! `await_until`) plus the current cancellation `Context`.

use std::cell::Cell;
use std::rc::Rc;

use wf_core::CoroutineId;

use crate::channel::Channel;
use crate::context::Context;
use crate::future::{Future as WfFuture, Settable};
use crate::selector::Selector;
use crate::window::DispatcherWindow;

/// Why a coroutine most recently returned `Pending`. Used for
/// `Dispatcher::stack_trace` (§4.2) and, for `Await`, to know which
/// predicates to re-check after a full dispatcher pass (§4.6).
#[derive(Clone)]
pub enum WaitingReason {
    ChannelSend(String),
    ChannelReceive(String),
    Selector,
    FutureGet,
    AwaitPredicate,
}

impl WaitingReason {
    pub fn describe(&self) -> String {
        match self {
            WaitingReason::ChannelSend(name) => format!("{name}.Send"),
            WaitingReason::ChannelReceive(name) => format!("{name}.Receive"),
            WaitingReason::Selector => "Selector".to_string(),
            WaitingReason::FutureGet => "Future.Get".to_string(),
            WaitingReason::AwaitPredicate => "Await".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Scope {
    pub(crate) coroutine: CoroutineId,
    pub(crate) window: DispatcherWindow,
    pub(crate) context: Context,
    pub(crate) blocked_reason: Rc<Cell<Option<WaitingReason>>>,
}

impl Scope {
    pub(crate) fn new(coroutine: CoroutineId, window: DispatcherWindow, context: Context) -> Self {
        Scope { coroutine, window, context, blocked_reason: Rc::new(Cell::new(None)) }
    }

    pub fn coroutine_id(&self) -> CoroutineId {
        self.coroutine
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn record_blocked(&self, reason: WaitingReason) {
        self.blocked_reason.set(Some(reason));
    }

    pub(crate) fn clear_blocked(&self) {
        self.blocked_reason.set(None);
    }

    pub(crate) fn blocked_reason(&self) -> Option<WaitingReason> {
        let reason = self.blocked_reason.take();
        self.blocked_reason.set(reason.clone());
        reason
    }

    pub fn channel<T: 'static>(&self, name: impl Into<String>, capacity: Option<usize>) -> Channel<T> {
        Channel::new_with_window(name.into(), capacity, self.window.clone())
    }

    pub fn future<T: 'static>(&self) -> (WfFuture<T>, Settable<T>) {
        crate::future::new_pair(self.window.clone())
    }

    pub fn selector<R>(&self) -> Selector<'_, R> {
        Selector::new(self)
    }

    /// Spawns a child coroutine. It is enqueued at the tail and runs only
    /// after `self` next yields (§4.2). `build` receives the child's own
    /// `Scope` to construct its future from.
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, build: F) -> CoroutineId
    where
        F: FnOnce(Scope) -> Fut,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        // SAFETY: spawn is only ever called while this coroutine is being
        // polled, i.e. while the dispatcher window is open.
        let dispatcher = unsafe { self.window.get() };
        dispatcher.spawn_child(name.into(), Some(self.coroutine), self.context.clone(), build)
    }
}
