//! The user-facing workflow operation API (§4.7): functions a workflow
//! coroutine calls to schedule an activity, start a timer, record a
//! marker, and so on. Each one registers a decision state machine, emits
//! its command, and hands back a `wf_runtime::Future` that resolves when
//! the matching history event (replayed or live) arrives.

use std::collections::HashMap;

use wf_core::ids::DecisionId;
use wf_core::payload::Payload;
use wf_core::wire::{Command, MarkerKind};
use wf_core::ActivityError;
use wf_decision::{DecisionKind, Outcome};
use wf_runtime::{Future as WfFuture, Scope};

use crate::state::{EngineHandle, ENGINE_STATE_KEY};

fn engine(scope: &Scope) -> EngineHandle {
    scope
        .context()
        .value::<EngineHandle>(ENGINE_STATE_KEY)
        .map(|rc| (*rc).clone())
        .unwrap_or_else(|| panic!("workflow operation used outside of a wf-engine-managed run"))
}

/// Registers a new decision, binds its predicted correlation id, emits the
/// matching command, and returns the id plus a settable-completion
/// registration closure the caller fills in. `tag` is the attribute (activity
/// type / timer id / child workflow type) checked against history on replay
/// (§4.9.3); kinds with no single comparable attribute pass `None`.
fn begin<F>(scope: &Scope, kind: DecisionKind, tag: Option<String>, command: Command, mut on_outcome: F) -> DecisionId
where
    F: FnMut(Outcome) + 'static,
{
    let handle = engine(scope);
    let mut state = handle.borrow_mut();
    let id = state.registry.add_with_tag(kind, tag);
    let event_id = state.registry.predict_next_event_id();
    if let Err(e) = state.registry.bind_correlation_id(event_id, id) {
        tracing::error!(error = %e, "duplicate decision correlation id");
    }
    state.registry.advance_predicted_event_id(1);
    if let Some(machine) = state.registry.lookup_touch(id) {
        if let Err(e) = machine.on_command_emitted() {
            tracing::error!(error = %e, "illegal decision transition on command emission");
        }
    }
    state.commands.push(command);
    state.completions.insert(id, Box::new(move |outcome| on_outcome(outcome)));
    id
}

/// Schedules an activity and returns a future resolving to its result.
pub fn schedule_activity(scope: &Scope, activity_type: impl Into<String>, input: Vec<Payload>) -> WfFuture<Result<Payload, ActivityError>> {
    let (future, settable) = scope.future::<Result<Payload, ActivityError>>();
    let activity_type = activity_type.into();
    let activity_id_handle = engine(scope);
    let activity_id = activity_id_handle.borrow().registry.predict_next_event_id().to_string();
    begin(
        scope,
        DecisionKind::Activity,
        Some(activity_type.clone()),
        Command::ScheduleActivityTask { activity_id, activity_type, input },
        move |outcome| match outcome {
            Outcome::ActivityCompleted(payload) => {
                let _ = settable.set_value(Ok(payload));
            }
            Outcome::ActivityFailed(err) => {
                let _ = settable.set_value(Err(err));
            }
            _ => {}
        },
    );
    future
}

/// Requests cancellation of an in-flight activity. `activity_id` is the id
/// returned by the original `ScheduleActivityTask` command — the same
/// string used to correlate its decision (§4.7's cancel transition table).
pub fn request_cancel_activity(scope: &Scope, activity_id: impl Into<String>) {
    let activity_id = activity_id.into();
    let handle = engine(scope);
    let mut state = handle.borrow_mut();
    let Ok(event_id) = activity_id.parse::<wf_core::wire::EventId>() else {
        tracing::warn!(activity_id, "request_cancel_activity: not a recognised activity id");
        return;
    };
    let Ok(decision_id) = state.registry.resolve_correlation_id(event_id) else {
        tracing::warn!(activity_id, "request_cancel_activity: no in-flight activity with this id");
        return;
    };
    let Some(machine) = state.registry.lookup_touch(decision_id) else { return };
    match machine.on_cancel_requested() {
        Ok(()) => state.commands.push(Command::RequestCancelActivityTask { activity_id }),
        Err(e) => tracing::error!(error = %e, "illegal decision transition on cancel request"),
    }
}

/// Starts a timer and returns a future resolving once it fires (or is
/// canceled, surfaced as an `ActivityError::Canceled`-shaped error string
/// via the future's error slot).
pub fn start_timer(scope: &Scope, timer_id: impl Into<String>, duration_ms: u64) -> WfFuture<Result<(), String>> {
    let (future, settable) = scope.future::<Result<(), String>>();
    let timer_id = timer_id.into();
    begin(scope, DecisionKind::Timer, Some(timer_id.clone()), Command::StartTimer { timer_id, duration_ms }, move |outcome| match outcome {
        Outcome::TimerFired => {
            let _ = settable.set_value(Ok(()));
        }
        Outcome::TimerCanceled => {
            let _ = settable.set_value(Err("timer canceled".to_string()));
        }
        _ => {}
    });
    future
}

pub fn cancel_timer(scope: &Scope, timer_id: impl Into<String>) {
    let timer_id = timer_id.into();
    let handle = engine(scope);
    let mut state = handle.borrow_mut();
    let Some(decision_id) = state.registry.find_by_tag(DecisionKind::Timer, &timer_id) else {
        tracing::warn!(timer_id, "cancel_timer: no in-flight timer with this id");
        return;
    };
    let Some(machine) = state.registry.lookup_touch(decision_id) else { return };
    match machine.on_cancel_requested() {
        Ok(()) => state.commands.push(Command::CancelTimer { timer_id }),
        Err(e) => tracing::error!(error = %e, "illegal decision transition on cancel request"),
    }
}

/// Records a marker (side effect / version / local activity / mutable side
/// effect) and returns a future resolving to whatever details replay
/// supplies — on first execution the caller supplies `details` themselves
/// via the command; on replay the recorded details from history win.
pub fn record_marker(scope: &Scope, marker_name: MarkerKind, details: HashMap<String, Payload>) -> WfFuture<HashMap<String, Payload>> {
    let (future, settable) = scope.future::<HashMap<String, Payload>>();
    begin(scope, DecisionKind::Marker, None, Command::RecordMarker { marker_name, details }, move |outcome| {
        if let Outcome::MarkerRecorded(details) = outcome {
            let _ = settable.set_value(details);
        }
    });
    future
}

pub fn upsert_search_attributes(scope: &Scope, search_attributes: HashMap<String, Payload>) {
    begin(scope, DecisionKind::UpsertSearchAttributes, None, Command::UpsertWorkflowSearchAttributes { search_attributes }, |_| {});
}

pub struct ChildWorkflowHandle {
    pub started: WfFuture<()>,
    pub result: WfFuture<Result<Payload, ActivityError>>,
}

pub fn start_child_workflow(scope: &Scope, workflow_id: impl Into<String>, workflow_type: impl Into<String>, input: Vec<Payload>) -> ChildWorkflowHandle {
    let (started, started_set) = scope.future::<()>();
    let (result, result_set) = scope.future::<Result<Payload, ActivityError>>();
    let workflow_type = workflow_type.into();
    begin(
        scope,
        DecisionKind::ChildWorkflow,
        Some(workflow_type.clone()),
        Command::StartChildWorkflowExecution { workflow_id: workflow_id.into(), workflow_type, input },
        move |outcome| match outcome {
            Outcome::ChildWorkflowStarted => {
                let _ = started_set.set_value(());
            }
            Outcome::ChildWorkflowCompleted(payload) => {
                let _ = result_set.set_value(Ok(payload));
            }
            Outcome::ChildWorkflowFailed(err) => {
                let _ = result_set.set_value(Err(err));
            }
            Outcome::ChildWorkflowCanceled(details) => {
                let _ = result_set.set_value(Err(ActivityError::Canceled { details }));
            }
            Outcome::ChildWorkflowTimedOut => {
                let _ = result_set.set_value(Err(ActivityError::Timeout { timeout_type: "child_workflow".into(), last_heartbeat_details: None }));
            }
            _ => {}
        },
    );
    ChildWorkflowHandle { started, result }
}

pub fn request_cancel_external_workflow(scope: &Scope, workflow_id: impl Into<String>) -> WfFuture<()> {
    let (future, settable) = scope.future::<()>();
    begin(
        scope,
        DecisionKind::CancelExternal,
        None,
        Command::RequestCancelExternalWorkflowExecution { workflow_id: workflow_id.into() },
        move |outcome| {
            if let Outcome::ExternalCancelRequested = outcome {
                let _ = settable.set_value(());
            }
        },
    );
    future
}

pub fn signal_external_workflow(scope: &Scope, workflow_id: impl Into<String>, signal_name: impl Into<String>, input: Vec<Payload>) -> WfFuture<Result<(), String>> {
    let (future, settable) = scope.future::<Result<(), String>>();
    begin(
        scope,
        DecisionKind::SignalExternal,
        None,
        Command::SignalExternalWorkflowExecution { workflow_id: workflow_id.into(), signal_name: signal_name.into(), input },
        move |outcome| match outcome {
            Outcome::SignalSent => {
                let _ = settable.set_value(Ok(()));
            }
            Outcome::SignalFailed(cause) => {
                let _ = settable.set_value(Err(cause));
            }
            _ => {}
        },
    );
    future
}

/// The channel every incoming `WorkflowExecutionSignaled` event is
/// delivered onto, as `(signal_name, input)` pairs, in history order.
pub fn signals(scope: &Scope) -> wf_runtime::Channel<(String, Vec<Payload>)> {
    engine(scope).borrow().signals.clone()
}

/// The `binary_checksum` of every `WorkflowTaskCompleted` event replayed so
/// far, in history order — for workflows that track worker-version history
/// (§4.9's BinaryChecksum seed scenario).
pub fn seen_binary_checksums(scope: &Scope) -> Vec<String> {
    engine(scope).borrow().binary_checksums.clone()
}

/// Registers a synchronous query handler for `query_type`. Queries are
/// answered against whatever workflow state `handler` closes over, outside
/// the decision/command pipeline entirely (§4.9.4) — registering the same
/// `query_type` twice replaces the earlier handler.
pub fn set_query_handler<F>(scope: &Scope, query_type: impl Into<String>, handler: F)
where
    F: Fn(Vec<Payload>) -> Result<Payload, String> + 'static,
{
    engine(scope).borrow_mut().query_handlers.insert(query_type.into(), Box::new(handler));
}
