//! Context graph, §4.1. A tree of cancellable, value-carrying scopes,
//! modelled the Go `context.Context` way the spec's vocabulary (`WithCancel`,
//! `WithValue`, `WithDeadline`/`WithTimeout`, a lazily-created "Done"
//! channel) borrows from. Ownership is `Rc`-shared rather than arena-indexed
//! (see `ids` module doc) since a context's lifetime is exactly the lifetime
//! of the coroutines holding a clone of it.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wf_core::ContextId;

use crate::channel::Channel;

struct Node {
    id: ContextId,
    parent: Option<Context>,
    cancelled: Cell<bool>,
    cause: RefCell<Option<String>>,
    /// `WithValue` attaches exactly one key per derived node; lookups walk
    /// the chain, so the nearest ancestor's key shadows further ones.
    value: Option<(&'static str, Rc<dyn Any>)>,
    /// Populated on first call to `done()` — "lazily created", per §4.1.
    done: RefCell<Option<Channel<()>>>,
    /// Informational only; the core never reads wall-clock time (§6). An
    /// embedder that wants deadline-triggered cancellation wires a Timer
    /// decision and calls `fire_deadline` when it fires.
    deadline: Option<std::time::Duration>,
}

/// A node in the cancellation tree. Cheap to clone (bumps an `Rc`).
#[derive(Clone)]
pub struct Context(Rc<Node>);

/// Returned by `with_cancel`/`with_deadline`/`with_timeout`: calling it
/// cancels the context and all its descendants. Idempotent.
#[derive(Clone)]
pub struct CancelFn(Context);

impl CancelFn {
    pub fn cancel(&self, cause: impl Into<String>) {
        self.0.cancel_with(cause.into());
    }
}

impl Context {
    pub(crate) fn root(id: ContextId) -> Self {
        Context(Rc::new(Node {
            id,
            parent: None,
            cancelled: Cell::new(false),
            cause: RefCell::new(None),
            value: None,
            done: RefCell::new(None),
            deadline: None,
        }))
    }

    pub fn id(&self) -> ContextId {
        self.0.id
    }

    fn child(&self, id: ContextId, value: Option<(&'static str, Rc<dyn Any>)>, deadline: Option<std::time::Duration>) -> Context {
        Context(Rc::new(Node {
            id,
            parent: Some(self.clone()),
            cancelled: Cell::new(false),
            cause: RefCell::new(None),
            value,
            done: RefCell::new(None),
            deadline,
        }))
    }

    pub fn with_cancel(&self, id: ContextId) -> (Context, CancelFn) {
        let child = self.child(id, None, None);
        (child.clone(), CancelFn(child))
    }

    pub fn with_value<T: 'static>(&self, id: ContextId, key: &'static str, value: T) -> Context {
        self.child(id, Some((key, Rc::new(value))), None)
    }

    pub fn with_deadline(&self, id: ContextId, deadline: std::time::Duration) -> (Context, CancelFn) {
        let child = self.child(id, None, Some(deadline));
        (child.clone(), CancelFn(child))
    }

    pub fn with_timeout(&self, id: ContextId, timeout: std::time::Duration) -> (Context, CancelFn) {
        self.with_deadline(id, timeout)
    }

    pub fn deadline(&self) -> Option<std::time::Duration> {
        self.0.deadline
    }

    pub fn value<T: 'static>(&self, key: &str) -> Option<Rc<T>> {
        let mut node = self.0.clone();
        loop {
            if let Some((k, v)) = &node.value {
                if *k == key {
                    return v.clone().downcast::<T>().ok();
                }
            }
            match &node.parent {
                Some(p) => node = p.0.clone(),
                None => return None,
            }
        }
    }

    /// True if this context or any ancestor has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        let mut node = &self.0;
        loop {
            if node.cancelled.get() {
                return true;
            }
            match &node.parent {
                Some(p) => node = &p.0,
                None => return false,
            }
        }
    }

    pub fn cause(&self) -> Option<String> {
        let mut node = &self.0;
        loop {
            if node.cancelled.get() {
                return node.cause.borrow().clone();
            }
            match &node.parent {
                Some(p) => node = &p.0,
                None => return None,
            }
        }
    }

    fn cancel_with(&self, cause: String) {
        if self.0.cancelled.replace(true) {
            return; // idempotent
        }
        *self.0.cause.borrow_mut() = Some(cause);
        if let Some(done) = self.0.done.borrow().as_ref() {
            done.close_best_effort();
        }
        // Cancellation propagates top-down: descendants are reached not by
        // walking down (we hold no child list) but because `is_cancelled`
        // walks *up* the chain; every live descendant Context will observe
        // this flag the next time it checks. We still need to wake anyone
        // already blocked with a clone of a *descendant* context, so the
        // descendant's own `done` channel (if created) is closed lazily by
        // whichever primitive is polling it — see `Context::done`.
    }

    /// The lazily-created Done channel (§4.1, §5: "suspension points... are
    /// exactly: ... Context.Done observation").
    pub fn done(&self) -> Channel<()> {
        if self.is_cancelled() {
            let ch = Channel::new("ctx.done".to_string(), Some(0));
            ch.close_best_effort();
            return ch;
        }
        let mut slot = self.0.done.borrow_mut();
        if let Some(ch) = slot.as_ref() {
            return ch.clone();
        }
        let ch = Channel::new("ctx.done".to_string(), Some(0));
        *slot = Some(ch.clone());
        ch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_shadows_by_nearest_ancestor() {
        let root = Context::root(ContextId::from_raw(0));
        let a = root.with_value(ContextId::from_raw(1), "k", 1u32);
        let b = a.with_value(ContextId::from_raw(2), "k", 2u32);
        assert_eq!(*b.value::<u32>("k").unwrap(), 2);
        assert_eq!(*a.value::<u32>("k").unwrap(), 1);
    }

    #[test]
    fn cancel_is_idempotent_and_propagates_to_children() {
        let root = Context::root(ContextId::from_raw(0));
        let (child, cancel) = root.with_cancel(ContextId::from_raw(1));
        let grandchild = child.with_value(ContextId::from_raw(2), "k", 0u32);
        assert!(!grandchild.is_cancelled());
        cancel.cancel("bye");
        cancel.cancel("bye again");
        assert!(grandchild.is_cancelled());
        assert_eq!(grandchild.cause().as_deref(), Some("bye"));
    }
}
