//! Dispatcher, §4.2. Owns every coroutine spawned in one workflow run and
//! drives them cooperatively to a fixed point: `execute_until_all_blocked`
//! repeatedly drains the ready queue, then re-checks `Await` predicates
//! once per quiescent point (§4.6), until a full pass produces no new
//! wake-ups. Grounded on the teacher's `Executor::run_schedule`/`tick_all`
//! loop in `executor.rs`, generalized from "every coroutine advances once
//! per ECS tick" to "every coroutine advances until the whole graph is
//! blocked" — there is no external tick source here, only cooperative
//! yields.

use std::collections::{HashMap, VecDeque};
use std::future::Future as StdFuture;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use wf_core::{CoreError, CoroutineId, IdAllocator};

use crate::context::{CancelFn, Context};
use crate::scope::Scope;
use crate::waker;
use crate::window::DispatcherWindow;

#[derive(PartialEq, Eq, Clone, Copy)]
enum CoroState {
    Ready,
    Waiting,
    Done,
}

struct CoroutineSlot {
    name: String,
    #[allow(dead_code)] // kept for future parent-aware bookkeeping (e.g. cascading cancel on parent completion)
    parent: Option<CoroutineId>,
    scope: Scope,
    future: Option<Pin<Box<dyn StdFuture<Output = ()>>>>,
    state: CoroState,
}

/// Owns and schedules every coroutine of one workflow run.
pub struct Dispatcher {
    window: DispatcherWindow,
    coroutine_ids: IdAllocator,
    context_ids: IdAllocator,
    order: Vec<CoroutineId>,
    coroutines: HashMap<CoroutineId, CoroutineSlot>,
    ready: VecDeque<CoroutineId>,
    root_context: Context,
    root_cancel: CancelFn,
    /// Set by `wake` whenever a genuine external event (not our own
    /// await-predicate recheck) makes a waiting coroutine runnable again;
    /// used to detect true quiescence in `execute_until_all_blocked`.
    dirty: bool,
}

impl Dispatcher {
    pub fn new() -> Self {
        let mut context_ids = IdAllocator::new();
        let root = Context::root(wf_core::ContextId::from_raw(context_ids.alloc()));
        let (root_context, root_cancel) = root.with_cancel(wf_core::ContextId::from_raw(context_ids.alloc()));
        Dispatcher {
            window: DispatcherWindow::closed(),
            coroutine_ids: IdAllocator::new(),
            context_ids,
            order: Vec::new(),
            coroutines: HashMap::new(),
            ready: VecDeque::new(),
            root_context,
            root_cancel,
            dirty: false,
        }
    }

    pub fn root_context(&self) -> &Context {
        &self.root_context
    }

    pub fn alloc_context_id(&mut self) -> wf_core::ContextId {
        wf_core::ContextId::from_raw(self.context_ids.alloc())
    }

    /// Creates a channel wired into this run's dispatcher window, without
    /// requiring a coroutine's `Scope` — for run-level plumbing such as the
    /// signal-delivery channel an embedder feeds from outside any coroutine.
    pub fn create_channel<T: 'static>(&self, name: impl Into<String>, capacity: Option<usize>) -> crate::channel::Channel<T> {
        crate::channel::Channel::new_with_window(name.into(), capacity, self.window.clone())
    }

    /// Spawns a top-level coroutine under the run's root context. `build`
    /// receives the coroutine's own `Scope` — not yet available before the
    /// coroutine id exists — and returns the future that `Scope` will drive.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, build: F) -> CoroutineId
    where
        F: FnOnce(Scope) -> Fut,
        Fut: StdFuture<Output = ()> + 'static,
    {
        let context = self.root_context.clone();
        self.spawn_child(name.into(), None, context, build)
    }

    /// Like [`Dispatcher::spawn`], but under a caller-supplied context
    /// (typically a value-bearing derivative of [`Dispatcher::root_context`])
    /// rather than the bare root — for embedders (e.g. `wf-engine`) that
    /// stash their own state into the context's value map before the root
    /// coroutine starts.
    pub fn spawn_with_context<F, Fut>(&mut self, name: impl Into<String>, context: Context, build: F) -> CoroutineId
    where
        F: FnOnce(Scope) -> Fut,
        Fut: StdFuture<Output = ()> + 'static,
    {
        self.spawn_child(name.into(), None, context, build)
    }

    pub(crate) fn spawn_child<F, Fut>(&mut self, name: String, parent: Option<CoroutineId>, context: Context, build: F) -> CoroutineId
    where
        F: FnOnce(Scope) -> Fut,
        Fut: StdFuture<Output = ()> + 'static,
    {
        let id = CoroutineId::from_raw(self.coroutine_ids.alloc());
        let scope = Scope::new(id, self.window.clone(), context);
        let future = build(scope.clone());
        let slot = CoroutineSlot {
            name: name.clone(),
            parent,
            scope,
            future: Some(Box::pin(future)),
            state: CoroState::Ready,
        };
        self.order.push(id);
        self.coroutines.insert(id, slot);
        self.ready.push_back(id);
        self.dirty = true;
        tracing::trace!(coroutine = ?id, name, parent = ?parent, "coroutine spawned");
        id
    }

    /// Marks `coroutine` runnable again. A no-op if it is already running,
    /// already queued, or finished. Called either directly by the dispatcher
    /// (self-resume bookkeeping) or, far more often, through a
    /// [`DispatcherWindow`] from inside a `Channel`/`Future` operation.
    pub(crate) fn wake(&mut self, coroutine: CoroutineId) {
        if let Some(slot) = self.coroutines.get_mut(&coroutine) {
            if slot.state == CoroState::Waiting {
                slot.state = CoroState::Ready;
                self.ready.push_back(coroutine);
                self.dirty = true;
            }
        }
    }

    fn resume(&mut self, id: CoroutineId) -> Result<(), CoreError> {
        let Some(slot) = self.coroutines.get_mut(&id) else { return Ok(()) };
        if slot.state == CoroState::Done {
            return Ok(());
        }
        slot.scope.clear_blocked();
        let Some(mut future) = slot.future.take() else { return Ok(()) };
        let name = slot.name.clone();

        let window = self.window.clone();
        let waker = waker::create();
        let result = window.scope(self, || {
            let mut cx = TaskContext::from_waker(&waker);
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| future.as_mut().poll(&mut cx))).map(|poll| (poll, future))
        });

        match result {
            Ok((Poll::Ready(()), _)) => {
                if let Some(slot) = self.coroutines.get_mut(&id) {
                    slot.state = CoroState::Done;
                }
                tracing::trace!(coroutine = ?id, name, "coroutine finished");
                Ok(())
            }
            Ok((Poll::Pending, future)) => {
                if let Some(slot) = self.coroutines.get_mut(&id) {
                    slot.future = Some(future);
                    slot.state = CoroState::Waiting;
                }
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(&payload);
                let stack_trace = self.stack_trace().join("\n");
                tracing::error!(coroutine = ?id, name, message, "workflow coroutine panicked");
                Err(CoreError::Panic(wf_core::WorkflowPanic { coroutine: id, coroutine_name: name, message, stack_trace }))
            }
        }
    }

    /// Every coroutine still blocked, regardless of what it is blocked on.
    /// Re-polled every quiescent pass (§4.2, §4.6) because none of our
    /// blocking primitives rely solely on `wake` to notice progress: `Await`
    /// predicates are re-evaluated from scratch, a cancelled context's
    /// check runs on every poll, and a channel/future/selector whose value
    /// was deposited from outside a `resume()` call (e.g. a decision
    /// completion applied by the engine between dispatcher passes, which
    /// never opens a window and so can't itself call `wake`) reads that
    /// value straight off its own state the next time it is polled either
    /// way. Rechecking everyone is the only way to guarantee that class of
    /// out-of-band completion is ever observed.
    fn waiting_coroutines(&self) -> Vec<CoroutineId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.coroutines.get(id).is_some_and(|slot| slot.state == CoroState::Waiting))
            .collect()
    }

    /// Drives every coroutine to a fixed point: the ready queue empties and
    /// a recheck pass over every still-blocked coroutine produces no
    /// further progress (§4.2, §4.6).
    #[tracing::instrument(skip(self))]
    pub fn execute_until_all_blocked(&mut self) -> Result<(), CoreError> {
        loop {
            self.dirty = false;
            while let Some(id) = self.ready.pop_front() {
                self.resume(id)?;
            }

            let recheck = self.waiting_coroutines();
            if recheck.is_empty() {
                break;
            }
            tracing::trace!(count = recheck.len(), "rechecking blocked coroutines");
            for id in recheck {
                self.ready.push_back(id);
            }
            while let Some(id) = self.ready.pop_front() {
                self.resume(id)?;
            }

            if !self.dirty {
                break;
            }
        }
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.coroutines.values().all(|slot| slot.state == CoroState::Done)
    }

    /// One line per still-running coroutine, insertion order, naming what
    /// it is blocked on (§4.2 "StackTrace").
    pub fn stack_trace(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|id| {
                let slot = self.coroutines.get(id)?;
                if slot.state == CoroState::Done {
                    return None;
                }
                let reason = slot.scope.blocked_reason().map(|r| r.describe()).unwrap_or_else(|| "running".to_string());
                Some(format!("{}: blocked on {}", slot.name, reason))
            })
            .collect()
    }

    /// Cancels the run's root context and gives every coroutine one more
    /// chance to observe it and unwind (§4.2 "Close").
    pub fn close(&mut self) -> Result<(), CoreError> {
        self.root_cancel.cancel("dispatcher closed");
        self.execute_until_all_blocked()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "workflow code panicked with a non-string payload".to_string()
    }
}
