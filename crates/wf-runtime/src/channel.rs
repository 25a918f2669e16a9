//! Channel, §4.3. Buffered/unbuffered FIFO with blocking and non-blocking
//! send/receive, close semantics, and selector integration.
//!
//! Represented as `Rc`-shared inner state rather than a handle into a
//! central arena (see `ids` module doc): the channel is owned by whichever
//! coroutine created it and referenced by clone from anyone else holding it,
//! exactly as §3's ownership note describes.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};

use wf_core::{CancelledError, CoroutineId, FatalReason};

use crate::scope::{Scope, WaitingReason};
use crate::window::DispatcherWindow;

struct SendWaiter<T> {
    value: Cell<Option<T>>,
    coroutine: CoroutineId,
    outcome: Rc<Cell<SendOutcome>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SendOutcome {
    Pending,
    Sent,
    ChannelClosed,
}

struct RecvWaiter<T> {
    coroutine: CoroutineId,
    outcome: Rc<RefCell<RecvOutcome<T>>>,
}

enum RecvOutcome<T> {
    Pending,
    Value(T),
    NoMore,
}

struct Inner<T> {
    name: String,
    capacity: usize,
    buffer: VecDeque<T>,
    send_waiters: VecDeque<SendWaiter<T>>,
    recv_waiters: VecDeque<RecvWaiter<T>>,
    closed: bool,
}

pub(crate) enum TrySend<T> {
    Accepted,
    WouldBlock(T),
}

/// A FIFO channel. `T: 'static` so it can be carried across `.await` points
/// inside boxed coroutine futures.
pub struct Channel<T: 'static> {
    inner: Rc<RefCell<Inner<T>>>,
    window: DispatcherWindow,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel { inner: self.inner.clone(), window: self.window.clone() }
    }
}

impl<T: 'static> Channel<T> {
    pub(crate) fn new_with_window(name: String, capacity: Option<usize>, window: DispatcherWindow) -> Self {
        Channel {
            inner: Rc::new(RefCell::new(Inner {
                name,
                capacity: capacity.unwrap_or(0),
                buffer: VecDeque::new(),
                send_waiters: VecDeque::new(),
                recv_waiters: VecDeque::new(),
                closed: false,
            })),
            window,
        }
    }

    /// Constructs a standalone channel with no dispatcher wiring — used for
    /// `Context::done()`, whose only consumer polls `is_cancelled()` rather
    /// than relying on wake-up.
    pub(crate) fn new(name: String, capacity: Option<usize>) -> Self {
        Self::new_with_window(name, capacity, DispatcherWindow::closed())
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    fn wake(&self, coroutine: CoroutineId) {
        self.window.wake_if_open(coroutine);
    }

    fn try_send(&self, value: T) -> Result<TrySend<T>, FatalReason> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return Err(FatalReason::SendOnClosedChannel(inner.name.clone()));
        }
        if inner.buffer.len() < inner.capacity {
            inner.buffer.push_back(value);
            return Ok(TrySend::Accepted);
        }
        if let Some(recv) = inner.recv_waiters.pop_front() {
            *recv.outcome.borrow_mut() = RecvOutcome::Value(value);
            drop(inner);
            self.wake(recv.coroutine);
            return Ok(TrySend::Accepted);
        }
        Ok(TrySend::WouldBlock(value))
    }

    /// Non-blocking send (§4.3 `SendAsync`). Returns `true` iff accepted;
    /// on `false` the caller still owns `value` — returned unchanged.
    pub fn send_async(&self, value: T) -> Result<(bool, Option<T>), FatalReason> {
        match self.try_send(value)? {
            TrySend::Accepted => Ok((true, None)),
            TrySend::WouldBlock(v) => Ok((false, Some(v))),
        }
    }

    fn try_receive(&self) -> (Option<T>, bool) {
        let mut inner = self.inner.borrow_mut();
        if let Some(v) = inner.buffer.pop_front() {
            Self::promote_one_sender(&mut inner, &self.window);
            return (Some(v), true);
        }
        if let Some(send) = inner.send_waiters.pop_front() {
            // SendWaiter::value is taken exactly once, right here, the moment it is dequeued.
            #[allow(clippy::expect_used)]
            let v = send.value.take().expect("send waiter value taken twice");
            send.outcome.set(SendOutcome::Sent);
            drop(inner);
            self.wake(send.coroutine);
            return (Some(v), true);
        }
        if inner.closed {
            return (None, false);
        }
        (None, true)
    }

    pub fn receive_async_with_more(&self) -> (Option<T>, bool) {
        self.try_receive()
    }

    pub fn receive_async(&self) -> Option<T> {
        self.try_receive().0
    }

    fn promote_one_sender(inner: &mut Inner<T>, window: &DispatcherWindow) {
        if inner.buffer.len() < inner.capacity {
            if let Some(send) = inner.send_waiters.pop_front() {
                // SendWaiter::value is taken exactly once, right here, the moment it is dequeued.
            #[allow(clippy::expect_used)]
            let v = send.value.take().expect("send waiter value taken twice");
                inner.buffer.push_back(v);
                send.outcome.set(SendOutcome::Sent);
                window.wake_if_open(send.coroutine);
            }
        }
    }

    pub fn close(&self) -> Result<(), FatalReason> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return Err(FatalReason::DoubleClose(inner.name.clone()));
        }
        inner.closed = true;
        let senders: Vec<_> = inner.send_waiters.drain(..).collect();
        let receivers: Vec<_> = inner.recv_waiters.drain(..).collect();
        drop(inner);
        for send in senders {
            send.outcome.set(SendOutcome::ChannelClosed);
            self.wake(send.coroutine);
        }
        for recv in receivers {
            *recv.outcome.borrow_mut() = RecvOutcome::NoMore;
            self.wake(recv.coroutine);
        }
        Ok(())
    }

    /// Used by `Context::done()`, which must not itself be fallible.
    pub(crate) fn close_best_effort(&self) {
        let _ = self.close();
    }

    pub fn send<'a>(&'a self, scope: &'a Scope, value: T) -> SendFuture<'a, T> {
        SendFuture { channel: self, scope, value: Cell::new(Some(value)), registered: RefCell::new(None) }
    }

    pub fn receive<'a>(&'a self, scope: &'a Scope) -> ReceiveFuture<'a, T> {
        ReceiveFuture { channel: self, scope, registered: RefCell::new(None) }
    }

    // --- non-blocking readiness probes used by the selector ---

    pub(crate) fn is_send_ready(&self) -> bool {
        let inner = self.inner.borrow();
        inner.closed || inner.buffer.len() < inner.capacity || !inner.recv_waiters.is_empty()
    }

    pub(crate) fn is_receive_ready(&self) -> bool {
        let inner = self.inner.borrow();
        !inner.buffer.is_empty() || !inner.send_waiters.is_empty() || inner.closed
    }
}

pub struct SendFuture<'a, T: 'static> {
    channel: &'a Channel<T>,
    scope: &'a Scope,
    value: Cell<Option<T>>,
    registered: RefCell<Option<Rc<Cell<SendOutcome>>>>,
}

impl<'a, T> Future for SendFuture<'a, T> {
    type Output = Result<(), FatalReason>;

    fn poll(self: Pin<&mut Self>, _task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.registered.borrow().clone() {
            return match outcome.get() {
                SendOutcome::Pending => {
                    if self.scope.context().is_cancelled() {
                        Poll::Ready(Ok(()))
                    } else {
                        self.scope.record_blocked(WaitingReason::ChannelSend(self.channel.name()));
                        Poll::Pending
                    }
                }
                SendOutcome::Sent => Poll::Ready(Ok(())),
                SendOutcome::ChannelClosed => {
                    Poll::Ready(Err(FatalReason::SendOnClosedChannel(self.channel.name())))
                }
            };
        }

        if self.scope.context().is_cancelled() {
            return Poll::Ready(Ok(()));
        }

        // Only reachable on the first poll, before `registered` is ever set.
        #[allow(clippy::expect_used)]
        let value = self.value.take().expect("SendFuture polled after completion");
        match self.channel.try_send(value) {
            Ok(TrySend::Accepted) => Poll::Ready(Ok(())),
            Ok(TrySend::WouldBlock(value)) => {
                let outcome = Rc::new(Cell::new(SendOutcome::Pending));
                self.channel.inner.borrow_mut().send_waiters.push_back(SendWaiter {
                    value: Cell::new(Some(value)),
                    coroutine: self.scope.coroutine_id(),
                    outcome: outcome.clone(),
                });
                *self.registered.borrow_mut() = Some(outcome);
                self.scope.record_blocked(WaitingReason::ChannelSend(self.channel.name()));
                Poll::Pending
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

pub struct ReceiveFuture<'a, T: 'static> {
    channel: &'a Channel<T>,
    scope: &'a Scope,
    registered: RefCell<Option<Rc<RefCell<RecvOutcome<T>>>>>,
}

/// `(value, more)` — `more` is `false` iff the channel is drained and closed.
pub type ReceiveResult<T> = Result<(Option<T>, bool), CancelledError>;

impl<'a, T> Future for ReceiveFuture<'a, T> {
    type Output = ReceiveResult<T>;

    fn poll(self: Pin<&mut Self>, _task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.registered.borrow().clone() {
            let mut slot = outcome.borrow_mut();
            return match &mut *slot {
                RecvOutcome::Pending => {
                    if self.scope.context().is_cancelled() {
                        Poll::Ready(Err(CancelledError { cause: self.scope.context().cause().unwrap_or_default() }))
                    } else {
                        self.scope.record_blocked(WaitingReason::ChannelReceive(self.channel.name()));
                        Poll::Pending
                    }
                }
                RecvOutcome::Value(_) => {
                    let RecvOutcome::Value(v) = std::mem::replace(&mut *slot, RecvOutcome::NoMore) else {
                        unreachable!()
                    };
                    Poll::Ready(Ok((Some(v), true)))
                }
                RecvOutcome::NoMore => Poll::Ready(Ok((None, false))),
            };
        }

        if self.scope.context().is_cancelled() {
            return Poll::Ready(Err(CancelledError { cause: self.scope.context().cause().unwrap_or_default() }));
        }

        let (value, more) = self.channel.try_receive();
        if value.is_some() || !more {
            return Poll::Ready(Ok((value, more)));
        }

        let outcome = Rc::new(RefCell::new(RecvOutcome::Pending));
        self.channel
            .inner
            .borrow_mut()
            .recv_waiters
            .push_back(RecvWaiter { coroutine: self.scope.coroutine_id(), outcome: outcome.clone() });
        *self.registered.borrow_mut() = Some(outcome);
        self.scope.record_blocked(WaitingReason::ChannelReceive(self.channel.name()));
        Poll::Pending
    }
}
