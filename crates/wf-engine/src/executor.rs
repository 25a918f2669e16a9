//! Workflow executor, §4.9. Replays (or live-drives) one workflow task:
//! feeds history events into the decision registry, spawns the root
//! workflow coroutine on `WorkflowExecutionStarted`, drains the dispatcher
//! to quiescence, and turns the result into a `TaskOutcome`. Grounded on
//! `alfredjeanlab-oddjobs::engine::executor::Executor::execute`'s
//! single-entry-point, `tracing`-instrumented run loop.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wf_core::payload::Payload;
use wf_core::wire::{Command, EventId, HistoryEvent, QueryDescriptor, QueryOutcome, TaskOutcome, WorkflowTask};
use wf_core::{ActivityError, CoreError, HistoryError, NondeterminismError};
use wf_decision::{DecisionRegistry, TransitionError};
use wf_runtime::{Dispatcher, Scope};

use crate::config::{ExecutorConfig, NondeterminismPolicy};
use crate::error::ExecutorError;
use crate::state::{EngineState, ENGINE_STATE_KEY};

/// A registered workflow's entry point: given the ambient `Scope` and the
/// `WorkflowExecutionStarted` input payloads, returns the coroutine body.
pub type WorkflowFn = Rc<dyn Fn(Scope, Vec<Payload>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Payload, ActivityError>>>>>;

/// Drives a single workflow run (one `WorkflowExecutor` per run, not per
/// task — the dispatcher and decision registry persist in memory across
/// however many `WorkflowTask`s of that run's history get replayed).
pub struct WorkflowExecutor {
    dispatcher: Dispatcher,
    config: ExecutorConfig,
    workflows: HashMap<String, WorkflowFn>,
    started: bool,
    engine_state: Option<Rc<RefCell<EngineState>>>,
    result_slot: Rc<RefCell<Option<Result<Payload, ActivityError>>>>,
}

impl WorkflowExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        WorkflowExecutor {
            dispatcher: Dispatcher::new(),
            config,
            workflows: HashMap::new(),
            started: false,
            engine_state: None,
            result_slot: Rc::new(RefCell::new(None)),
        }
    }

    pub fn register_workflow(&mut self, workflow_type: impl Into<String>, f: WorkflowFn) {
        self.workflows.insert(workflow_type.into(), f);
    }

    #[tracing::instrument(skip(self, task), fields(workflow_id = %task.workflow_id, run_id = %task.run_id))]
    pub fn execute_task(&mut self, task: WorkflowTask) -> TaskOutcome {
        match self.try_execute_task(&task) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(error = %err, "workflow task failed");
                TaskOutcome::Failed { cause: format!("{err:?}"), message: err.to_string(), failure_type: failure_type_of(&err), stack_trace: None }
            }
        }
    }

    fn try_execute_task(&mut self, task: &WorkflowTask) -> Result<TaskOutcome, ExecutorError> {
        if task.query.is_some() && !task.queries.is_empty() {
            return Err(ExecutorError::Core(CoreError::from(HistoryError::InvalidQueryTask)));
        }
        validate_history(&task.history, task.started_event_id).map_err(CoreError::from)?;

        for event in &task.history {
            if let Err(err) = self.process_event(event) {
                if let Some(outcome) = self.handle_nondeterminism(&err) {
                    return Ok(outcome);
                }
                return Err(err);
            }
            if matches!(event, HistoryEvent::WorkflowTaskStarted { .. }) {
                if let Err(core_err) = self.dispatcher.execute_until_all_blocked() {
                    let err = self.classify(core_err);
                    if let Some(outcome) = self.handle_nondeterminism(&err) {
                        return Ok(outcome);
                    }
                    return Err(err);
                }
            }
        }

        let commands = self.drain_commands();
        let query_results = self.answer_queries(task);
        Ok(TaskOutcome::Completed { commands, query_results })
    }

    /// Converts a `CoreError` into an `ExecutorError`, logging the
    /// blocking-on-nondeterminism case distinctly (§7 "Nondeterminism").
    fn classify(&self, err: CoreError) -> ExecutorError {
        if matches!(err, CoreError::Nondeterminism(_)) && self.config.nondeterminism_policy == NondeterminismPolicy::BlockWorkflow {
            tracing::error!(error = %err, "blocking workflow task on apparent nondeterminism");
        }
        ExecutorError::Core(err)
    }

    /// Under `NondeterminismPolicy::FailWorkflow`, turns a nondeterminism
    /// error into a completed task carrying a `FailWorkflowExecution`
    /// command instead of propagating it (§4.9.3). Returns `None` for any
    /// other error, or under `BlockWorkflow`, leaving the caller to
    /// propagate it untouched.
    fn handle_nondeterminism(&mut self, err: &ExecutorError) -> Option<TaskOutcome> {
        let ExecutorError::Core(CoreError::Nondeterminism(nd)) = err else { return None };
        if self.config.nondeterminism_policy != NondeterminismPolicy::FailWorkflow {
            return None;
        }
        let commands = vec![Command::FailWorkflowExecution { message: format!("FailWorkflow: {}", nd.message), failure_type: "nondeterministic".to_string() }];
        Some(TaskOutcome::Completed { commands, query_results: HashMap::new() })
    }

    fn process_event(&mut self, event: &HistoryEvent) -> Result<(), ExecutorError> {
        if let HistoryEvent::WorkflowExecutionStarted { workflow_type, input, .. } = event {
            self.start_workflow(workflow_type, event.event_id(), input.clone())?;
            return Ok(());
        }

        if let Some(state) = &self.engine_state {
            // Resyncs the correlation-id predictor to the real stream position
            // on every event, not just the decision-correlated ones — a
            // `WorkflowTaskScheduled`/`Completed` consumes an event id too.
            state.borrow_mut().registry.observe_event_id(event.event_id());
        }

        if let HistoryEvent::WorkflowExecutionSignaled { signal_name, input, .. } = event {
            if let Some(state) = &self.engine_state {
                state.borrow().signals.send_async((signal_name.clone(), input.clone())).map_err(CoreError::from)?;
            }
            return Ok(());
        }

        if let HistoryEvent::WorkflowTaskCompleted { binary_checksum: Some(checksum), .. } = event {
            if let Some(state) = &self.engine_state {
                state.borrow_mut().binary_checksums.push(checksum.clone());
            }
            return Ok(());
        }

        if matches!(
            event,
            HistoryEvent::WorkflowTaskScheduled { .. } | HistoryEvent::WorkflowTaskStarted { .. } | HistoryEvent::WorkflowTaskCompleted { .. } | HistoryEvent::WorkflowTaskFailed { .. }
        ) {
            return Ok(());
        }

        let Some(key) = correlation_key(event) else { return Ok(()) };
        let Some(state) = &self.engine_state else { return Ok(()) };
        let mut state = state.borrow_mut();
        let decision_id = state.registry.resolve_correlation_id(key).map_err(CoreError::from)?;
        let outcome = {
            let Some(machine) = state.registry.lookup_touch(decision_id) else { return Ok(()) };
            machine.apply_event(event).map_err(|e| match e {
                TransitionError::Fatal(f) => CoreError::from(f),
                TransitionError::Nondeterminism(message) => CoreError::from(NondeterminismError { message }),
            })?
        };
        if let Some(outcome) = outcome {
            if let Some(cb) = state.completions.get_mut(&decision_id) {
                cb(outcome);
            }
            let terminal = state.registry.get(decision_id).map(|m| m.is_terminal()).unwrap_or(true);
            if terminal {
                state.completions.remove(&decision_id);
                state.registry.extract(decision_id);
            }
        }
        Ok(())
    }

    fn start_workflow(&mut self, workflow_type: &str, started_event_id: EventId, input: Vec<Payload>) -> Result<(), ExecutorError> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        let workflow_fn = self.workflows.get(workflow_type).cloned().ok_or_else(|| ExecutorError::UnknownWorkflowType(workflow_type.to_string()))?;

        let root = self.dispatcher.root_context().clone();
        let signals = self.dispatcher.create_channel("wf.signals", Some(usize::MAX));
        let registry = DecisionRegistry::new(started_event_id + 1);
        let state = Rc::new(RefCell::new(EngineState {
            registry,
            commands: Vec::new(),
            completions: HashMap::new(),
            signals,
            binary_checksums: Vec::new(),
            query_handlers: HashMap::new(),
        }));
        let context_id = self.dispatcher.alloc_context_id();
        let root_with_state = root.with_value(context_id, ENGINE_STATE_KEY, state.clone());
        self.engine_state = Some(state.clone());

        let result_slot = self.result_slot.clone();
        self.dispatcher.spawn_with_context("workflow-root", root_with_state, move |scope| {
            let workflow_fut = workflow_fn(scope, input);
            async move {
                let outcome = workflow_fut.await;
                let command = match &outcome {
                    Ok(payload) => Command::CompleteWorkflowExecution { result: payload.clone() },
                    Err(err) => Command::FailWorkflowExecution { message: err.to_string(), failure_type: "ActivityError".to_string() },
                };
                state.borrow_mut().commands.push(command);
                *result_slot.borrow_mut() = Some(outcome);
            }
        });
        Ok(())
    }

    fn drain_commands(&mut self) -> Vec<Command> {
        match &self.engine_state {
            Some(state) => std::mem::take(&mut state.borrow_mut().commands),
            None => Vec::new(),
        }
    }

    /// Answers every query attached to the task, whether carried in the
    /// legacy single-query slot or the multi-query list (never both — that
    /// case is rejected up front in `try_execute_task`). Each query is
    /// answered synchronously against whatever handler the workflow
    /// registered for its `query_type`; an unregistered type answers with an
    /// error rather than failing the whole task.
    fn answer_queries(&mut self, task: &WorkflowTask) -> HashMap<String, QueryOutcome> {
        let queries: Vec<&QueryDescriptor> = task.query.iter().chain(task.queries.iter()).collect();
        let Some(state) = &self.engine_state else {
            return queries.into_iter().map(|q| (q.query_id.clone(), QueryOutcome::Error("workflow never started".to_string()))).collect();
        };
        let state = state.borrow();
        queries
            .into_iter()
            .map(|q| {
                let outcome = match state.query_handlers.get(&q.query_type) {
                    Some(handler) => match handler(q.args.clone()) {
                        Ok(payload) => QueryOutcome::Answer(payload),
                        Err(message) => QueryOutcome::Error(message),
                    },
                    None => QueryOutcome::Error(format!("unknown queryType {}", q.query_type)),
                };
                (q.query_id.clone(), outcome)
            })
            .collect()
    }
}

/// Validates that `history` has no gaps or duplicate event ids (§4.9.2) and
/// that it actually reaches `started_event_id` before ending (§4.9.2's
/// truncation check) — a page that stops short of the task's own declared
/// started-event-id is a premature end of stream, not a clean task boundary.
fn validate_history(history: &[HistoryEvent], started_event_id: EventId) -> Result<(), HistoryError> {
    let mut prev: Option<EventId> = None;
    for event in history {
        let id = event.event_id();
        if let Some(prev_id) = prev {
            let expected = prev_id + 1;
            if id != expected {
                return Err(HistoryError::MissingEvents { expected, got: id });
            }
        }
        prev = Some(id);
    }
    match history.last() {
        Some(last) if last.event_id() >= started_event_id => Ok(()),
        _ => Err(HistoryError::PrematureEndOfStream { started_event_id }),
    }
}

fn correlation_key(event: &HistoryEvent) -> Option<EventId> {
    use HistoryEvent::*;
    match event {
        ActivityTaskScheduled { event_id, .. } => Some(*event_id),
        ActivityTaskStarted { scheduled_event_id, .. }
        | ActivityTaskCompleted { scheduled_event_id, .. }
        | ActivityTaskFailed { scheduled_event_id, .. }
        | ActivityTaskTimedOut { scheduled_event_id, .. }
        | ActivityTaskCancelRequested { scheduled_event_id, .. }
        | ActivityTaskCanceled { scheduled_event_id, .. } => Some(*scheduled_event_id),

        TimerStarted { event_id, .. } => Some(*event_id),
        TimerFired { started_event_id, .. } | TimerCanceled { started_event_id, .. } => Some(*started_event_id),

        MarkerRecorded { event_id, .. } => Some(*event_id),
        UpsertWorkflowSearchAttributes { event_id, .. } => Some(*event_id),

        StartChildWorkflowExecutionInitiated { event_id, .. } => Some(*event_id),
        ChildWorkflowExecutionStarted { initiated_event_id, .. }
        | ChildWorkflowExecutionCompleted { initiated_event_id, .. }
        | ChildWorkflowExecutionFailed { initiated_event_id, .. }
        | ChildWorkflowExecutionCanceled { initiated_event_id, .. }
        | ChildWorkflowExecutionTimedOut { initiated_event_id, .. } => Some(*initiated_event_id),

        RequestCancelExternalWorkflowExecutionInitiated { event_id, .. } => Some(*event_id),
        ExternalWorkflowExecutionCancelRequested { initiated_event_id, .. } => Some(*initiated_event_id),
        SignalExternalWorkflowExecutionInitiated { event_id, .. } => Some(*event_id),
        SignalExternalWorkflowExecutionFailed { initiated_event_id, .. } => Some(*initiated_event_id),

        WorkflowExecutionStarted { .. }
        | WorkflowTaskScheduled { .. }
        | WorkflowTaskStarted { .. }
        | WorkflowTaskCompleted { .. }
        | WorkflowTaskFailed { .. }
        | WorkflowExecutionSignaled { .. } => None,
    }
}

fn failure_type_of(err: &ExecutorError) -> String {
    match err {
        ExecutorError::Core(CoreError::Nondeterminism(_)) => "Nondeterminism".to_string(),
        ExecutorError::Core(CoreError::Fatal(_)) => "Fatal".to_string(),
        ExecutorError::Core(CoreError::Panic(_)) => "Panic".to_string(),
        ExecutorError::Core(CoreError::Cancelled(_)) => "Cancelled".to_string(),
        ExecutorError::Core(CoreError::History(_)) => "History".to_string(),
        ExecutorError::UnknownWorkflowType(_) => "UnknownWorkflowType".to_string(),
        ExecutorError::MissingWorkflowStart => "MissingWorkflowStart".to_string(),
    }
}
