//! Future / Settable, §4.5. A single-assignment value-or-error slot with
//! chaining and lazy decode, paired with a write capability (`Settable`).
//! Grounded on the teacher's single-assignment coroutine primitives
//! (`YieldChannel` and friends) in spirit, reimplemented on a plain
//! `Rc<RefCell<Inner<T>>>` slot rather than a oneshot channel: §4.5 requires
//! repeatable `Get`s on an already-ready future and fan-out via `Chain`,
//! neither of which a single-consumer oneshot channel can express (see
//! DESIGN.md's note on dropping the `oneshot` dependency).

use std::cell::RefCell;
use std::future::Future as StdFuture;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};

use wf_core::{CoroutineId, FatalReason};

use crate::scope::{Scope, WaitingReason};
use crate::window::DispatcherWindow;

#[derive(Clone)]
enum Slot<T> {
    Empty,
    /// `Chain` was called on the settable: readiness now mirrors the source.
    Chained,
    Ready { value: Option<T>, error: Option<String> },
}

struct Inner<T> {
    slot: Slot<T>,
    waiters: Vec<CoroutineId>,
    /// Other (future, window) pairs chained onto this one; resolved the
    /// moment this slot becomes `Ready`.
    forward_to: Vec<(Rc<RefCell<Inner<T>>>, DispatcherWindow)>,
}

fn resolve<T: Clone>(inner_rc: &Rc<RefCell<Inner<T>>>, window: &DispatcherWindow, value: Option<T>, error: Option<String>) {
    let (waiters, forwards) = {
        let mut inner = inner_rc.borrow_mut();
        inner.slot = Slot::Ready { value: value.clone(), error: error.clone() };
        (std::mem::take(&mut inner.waiters), std::mem::take(&mut inner.forward_to))
    };
    for w in waiters {
        window.wake_if_open(w);
    }
    for (target, target_window) in forwards {
        resolve(&target, &target_window, value.clone(), error.clone());
    }
}

/// The read side.
pub struct Future<T: 'static> {
    inner: Rc<RefCell<Inner<T>>>,
    window: DispatcherWindow,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future { inner: self.inner.clone(), window: self.window.clone() }
    }
}

/// The write side. Intentionally not `Clone`: exactly one owner (typically
/// a decision state machine's completion callback, §9) should ever resolve
/// a given future.
pub struct Settable<T: 'static> {
    inner: Rc<RefCell<Inner<T>>>,
    window: DispatcherWindow,
}

pub(crate) fn new_pair<T: 'static>(window: DispatcherWindow) -> (Future<T>, Settable<T>) {
    let inner = Rc::new(RefCell::new(Inner { slot: Slot::Empty, waiters: Vec::new(), forward_to: Vec::new() }));
    (Future { inner: inner.clone(), window: window.clone() }, Settable { inner, window })
}

impl<T: Clone + 'static> Settable<T> {
    pub fn set_value(&self, value: T) -> Result<(), FatalReason> {
        self.set(Some(value), None)
    }

    pub fn set_error(&self, error: impl Into<String>) -> Result<(), FatalReason> {
        self.set(None, Some(error.into()))
    }

    pub fn set(&self, value: Option<T>, error: Option<String>) -> Result<(), FatalReason> {
        match self.inner.borrow().slot {
            Slot::Empty => {}
            Slot::Chained | Slot::Ready { .. } => return Err(FatalReason::DoubleSetFuture),
        }
        resolve(&self.inner, &self.window, value, error);
        Ok(())
    }

    /// Forwards readiness from `source`: this future becomes ready exactly
    /// when `source` does, and with the same value/error. Calling `Set` on
    /// a settable that has already been chained — or chaining one that was
    /// already set directly — is fatal (§4.5).
    pub fn chain(&self, source: &Future<T>) -> Result<(), FatalReason> {
        match self.inner.borrow().slot {
            Slot::Empty => {}
            Slot::Chained | Slot::Ready { .. } => return Err(FatalReason::ChainAfterSet),
        }
        self.inner.borrow_mut().slot = Slot::Chained;

        let already_ready = if let Slot::Ready { value, error } = &source.inner.borrow().slot {
            Some((value.clone(), error.clone()))
        } else {
            None
        };
        if let Some((value, error)) = already_ready {
            resolve(&self.inner, &self.window, value, error);
        } else {
            source.inner.borrow_mut().forward_to.push((self.inner.clone(), self.window.clone()));
        }
        Ok(())
    }
}

impl<T: Clone + 'static> Future<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self.inner.borrow().slot, Slot::Ready { .. })
    }

    pub fn get<'a>(&'a self, scope: &'a Scope, out: Option<Rc<RefCell<Option<T>>>>) -> GetFuture<'a, T> {
        GetFuture { future: self, scope, out, registered: false }
    }
}

/// Synchronously reads an already-`is_ready()` future, for the selector's
/// `add_future` case, which only calls this after its own probe confirmed
/// readiness.
pub(crate) fn read_ready<T: Clone>(future: &Future<T>) -> Result<T, String> {
    match &future.inner.borrow().slot {
        Slot::Ready { value, error } => {
            if let Some(e) = error {
                Err(e.clone())
            } else {
                match value {
                    Some(v) => Ok(v.clone()),
                    None => unreachable!("ready future with neither value nor error"),
                }
            }
        }
        _ => unreachable!("read_ready called on a future that was not ready"),
    }
}

pub struct GetFuture<'a, T: 'static> {
    future: &'a Future<T>,
    scope: &'a Scope,
    out: Option<Rc<RefCell<Option<T>>>>,
    registered: bool,
}

impl<'a, T: Clone> StdFuture for GetFuture<'a, T> {
    type Output = Result<(), String>;

    fn poll(mut self: Pin<&mut Self>, _task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        if self.scope.context().is_cancelled() {
            return Poll::Ready(Err(self.scope.context().cause().unwrap_or_default()));
        }
        let ready = {
            let inner = self.future.inner.borrow();
            if let Slot::Ready { value, error } = &inner.slot {
                Some((value.clone(), error.clone()))
            } else {
                None
            }
        };
        if let Some((value, error)) = ready {
            if let Some(out) = &self.out {
                *out.borrow_mut() = value;
            }
            return Poll::Ready(error.map_or(Ok(()), Err));
        }
        if !self.registered {
            self.future.inner.borrow_mut().waiters.push(self.scope.coroutine_id());
            self.as_mut().get_mut().registered = true;
        }
        self.scope.record_blocked(WaitingReason::FutureGet);
        Poll::Pending
    }
}
