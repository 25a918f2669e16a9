//! Selector, §4.4. A fluent multi-way wait: `add_receive`/`add_send`/
//! `add_future`/`add_default`, resolved by a single insertion-order scan
//! over its registered cases each time it is polled. Grounded on the
//! teacher's `par_or` (first of several sub-coroutines to finish wins) but
//! generalized from "first coroutine to complete" to "first *case* whose
//! channel/future is ready", with the tie-break the spec calls out as
//! load-bearing: ties go to whichever case was added earliest.

use std::future::Future as StdFuture;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use crate::channel::Channel;
use crate::future::Future as WfFuture;
use crate::scope::{Scope, WaitingReason};

/// One registered case. Each variant carries the closure that performs the
/// actual (non-blocking) action and produces the selector's output once
/// that case is chosen.
enum Case<'a, R> {
    Receive(Box<dyn Fn() -> Option<R> + 'a>, ReadyProbe<'a>),
    Send(Box<dyn Fn() -> Option<R> + 'a>, ReadyProbe<'a>),
    Future(Box<dyn Fn() -> Option<R> + 'a>, ReadyProbe<'a>),
}

type ReadyProbe<'a> = Box<dyn Fn() -> bool + 'a>;

impl<'a, R> Case<'a, R> {
    fn is_ready(&self) -> bool {
        match self {
            Case::Receive(_, probe) | Case::Send(_, probe) | Case::Future(_, probe) => probe(),
        }
    }

    fn fire(&self) -> Option<R> {
        match self {
            Case::Receive(f, _) | Case::Send(f, _) | Case::Future(f, _) => f(),
        }
    }
}

/// Builder/future combining any number of channel and future cases plus an
/// optional default. Call `.select(scope)` (or `.await` it directly, since
/// `Selector` itself implements `Future`) to run it.
pub struct Selector<'a, R = ()> {
    scope: &'a Scope,
    cases: Vec<Case<'a, R>>,
    default: Option<Box<dyn FnOnce() -> R + 'a>>,
}

impl<'a, R> Selector<'a, R> {
    pub(crate) fn new(scope: &'a Scope) -> Self {
        Selector { scope, cases: Vec::new(), default: None }
    }

    /// Registers a receive case. `on_value` is called with the received
    /// value (`None` if the channel was closed and drained) once this case
    /// wins the scan.
    pub fn add_receive<T: 'static>(mut self, channel: &Channel<T>, on_value: impl Fn(Option<T>) -> R + 'a) -> Self
    where
        T: Clone,
    {
        let ch = channel.clone();
        let probe_ch = channel.clone();
        let action: Box<dyn Fn() -> Option<R>> = Box::new(move || {
            let (value, more) = ch.receive_async_with_more();
            if value.is_some() || !more {
                Some(on_value(value))
            } else {
                None
            }
        });
        let probe: ReadyProbe<'a> = Box::new(move || probe_ch.is_receive_ready());
        self.cases.push(Case::Receive(action, probe));
        self
    }

    /// Registers a send case. `value` is taken exactly once, the first time
    /// this case's probe succeeds and it is chosen.
    pub fn add_send<T: 'static>(mut self, channel: &Channel<T>, value: T, on_sent: impl FnOnce() -> R + 'a) -> Self {
        let ch = channel.clone();
        let probe_ch = channel.clone();
        let value = std::cell::Cell::new(Some(value));
        let on_sent = std::cell::RefCell::new(Some(on_sent));
        let action: Box<dyn Fn() -> Option<R>> = Box::new(move || {
            let v = value.take()?;
            match ch.send_async(v) {
                Ok((true, _)) => on_sent.borrow_mut().take().map(|f| f()),
                Ok((false, returned)) => {
                    value.set(returned);
                    None
                }
                Err(_) => None,
            }
        });
        let probe: ReadyProbe<'a> = Box::new(move || probe_ch.is_send_ready());
        self.cases.push(Case::Send(action, probe));
        self
    }

    /// Registers a future-readiness case.
    pub fn add_future<T: Clone + 'static>(mut self, future: &WfFuture<T>, on_ready: impl Fn(Result<T, String>) -> R + 'a) -> Self {
        let f = future.clone();
        let probe_f = future.clone();
        let action: Box<dyn Fn() -> Option<R>> = Box::new(move || {
            if !f.is_ready() {
                return None;
            }
            // `Future::get` only ever returns Ready immediately here since
            // we already checked `is_ready`; build a throwaway scope-free
            // synchronous read via a zero-poll helper.
            Some(on_ready(crate::future::read_ready(&f)))
        });
        let probe: ReadyProbe<'a> = Box::new(move || probe_f.is_ready());
        self.cases.push(Case::Future(action, probe));
        self
    }

    /// If no case is ready on the first scan, run `f` immediately instead of
    /// blocking (§4.4).
    pub fn add_default(mut self, f: impl FnOnce() -> R + 'a) -> Self {
        self.default = Some(Box::new(f));
        self
    }

    fn scan(&self) -> Option<R> {
        for case in &self.cases {
            if case.is_ready() {
                if let Some(r) = case.fire() {
                    return Some(r);
                }
            }
        }
        None
    }
}

impl<'a, R> StdFuture for Selector<'a, R> {
    type Output = Result<R, wf_core::CancelledError>;

    fn poll(self: Pin<&mut Self>, _task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(r) = this.scan() {
            return Poll::Ready(Ok(r));
        }
        if let Some(f) = this.default.take() {
            return Poll::Ready(Ok(f()));
        }
        if this.scope.context().is_cancelled() {
            return Poll::Ready(Err(wf_core::CancelledError { cause: this.scope.context().cause().unwrap_or_default() }));
        }
        this.scope.record_blocked(WaitingReason::Selector);
        Poll::Pending
    }
}
