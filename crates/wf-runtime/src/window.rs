//! A scoped raw-pointer window onto the [`Dispatcher`], opened only while a
//! coroutine is being polled and closed immediately after — the same
//! technique the teacher uses for `world_window: Rc<Cell<Option<*mut World>>>`
//! to let coroutine parameters reach back into the `World` during `resume`
//! without the `Dispatcher` and its coroutines holding live `&mut` borrows
//! of each other (which the cyclic ownership in §3's data model and §9's
//! "cyclic references" note both rule out in safe Rust).
//!
//! Safety argument: the dispatcher is never polled reentrantly (§4.2's
//! scheduling contract — "the dispatcher's step itself is not reentrant"),
//! so at most one `Dispatcher` pointer is ever live through this window at
//! a time, and it is always valid for the duration of the `scope` call that
//! set it.

use crate::dispatcher::Dispatcher;
use std::cell::Cell;
use std::rc::Rc;
use wf_core::CoroutineId;

#[derive(Clone)]
pub(crate) struct DispatcherWindow(Rc<Cell<Option<*mut Dispatcher>>>);

impl DispatcherWindow {
    pub(crate) fn closed() -> Self {
        Self(Rc::new(Cell::new(None)))
    }

    pub(crate) fn scope<R>(&self, dispatcher: &mut Dispatcher, f: impl FnOnce() -> R) -> R {
        let previous = self.0.replace(Some(dispatcher as *mut Dispatcher));
        let result = f();
        self.0.set(previous);
        result
    }

    /// # Safety
    /// Must only be called from within a `scope()` call on this same window.
    pub(crate) unsafe fn get(&self) -> &mut Dispatcher {
        // Callers only ever reach this from inside a `scope()` call (Channel,
        // Future, Scope::spawn) — the window is guaranteed open there.
        #[allow(clippy::expect_used)]
        let ptr = self.0.get().expect("dispatcher window accessed outside of a poll");
        &mut *ptr
    }

    /// Wakes `coroutine` if a dispatcher window is currently open (i.e. we
    /// are being called from inside somebody's `resume`). A closed window
    /// (standalone channels such as `Context::done()`) makes this a no-op —
    /// there is nothing to mark runnable.
    pub(crate) fn wake_if_open(&self, coroutine: CoroutineId) {
        if let Some(ptr) = self.0.get() {
            // SAFETY: non-null means we are nested inside a live `scope()`.
            unsafe { (*ptr).wake(coroutine) };
        }
    }
}
