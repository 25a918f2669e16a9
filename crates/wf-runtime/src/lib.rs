//! The deterministic, single-threaded coroutine runtime: contexts,
//! channels, futures, selectors, predicate waits, and the dispatcher that
//! schedules them all. This crate knows nothing about workflow history or
//! commands (that's `wf-decision`/`wf-engine`) — it is the cooperative
//! concurrency substrate those crates are built on, the same way the
//! teacher's `coroutine`/`executor` modules know nothing about the game
//! built on top of them.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod await_;
mod channel;
mod context;
mod dispatcher;
mod future;
mod scope;
mod selector;
mod waker;
mod window;

pub use await_::{await_until, AwaitFuture};
pub use channel::{Channel, ReceiveFuture, ReceiveResult, SendFuture};
pub use context::{CancelFn, Context};
pub use dispatcher::Dispatcher;
pub use future::{Future, GetFuture, Settable};
pub use scope::{Scope, WaitingReason};
pub use selector::Selector;
