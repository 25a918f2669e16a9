//! A no-op [`Waker`]. The dispatcher drives every coroutine's future by
//! polling it directly inside [`crate::dispatcher::Dispatcher::execute_until_all_blocked`]
//! rather than waiting for a real reactor to call `wake()`; internal
//! suspension points (channel, selector, future, await) record *why* they
//! returned `Pending` through [`crate::scope::Scope`] instead. Grounded on
//! the teacher's `coroutine::waker` module, which does exactly this for the
//! same reason (polling is driven by the ECS schedule, not a runtime).

use std::task::{RawWaker, RawWakerVTable, Waker};

unsafe fn clone(data: *const ()) -> RawWaker {
    RawWaker::new(data, &VTABLE)
}

unsafe fn do_nothing(_data: *const ()) {}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, do_nothing, do_nothing, do_nothing);

pub fn create() -> Waker {
    let raw = RawWaker::new(std::ptr::null(), &VTABLE);
    // SAFETY: every function in VTABLE is a no-op; the waker never touches
    // `data`, so handing out a dangling/null pointer is sound.
    unsafe { Waker::from_raw(raw) }
}
