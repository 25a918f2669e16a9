//! Decision state machines, §4.7. Each user-visible operation (schedule an
//! activity, start a timer, record a marker, ...) has a small state machine
//! tracking the command it emitted and the history events that correlate
//! back to it. Illegal event/state combinations are a nondeterminism
//! signal, not a panic — raised as [`FatalReason::IllegalTransition`] the
//! same way `wf-core::error` frames every other internal invariant
//! violation, so the one designated panic boundary (§9) stays the only
//! place user-code panics actually surface.
//!
//! Grounded conceptually on `alfredjeanlab-oddjobs`'s `WalError`/typed
//! state enums (match-driven transition functions returning a typed error
//! on an unexpected branch) even though no single pack example models a
//! Temporal-style correlation table directly — this is the "enrich from
//! the rest of the pack" case SPEC_FULL.md calls out.

use std::collections::HashMap;

use wf_core::error::FatalReason;
use wf_core::ids::DecisionId;
use wf_core::payload::Payload;
use wf_core::wire::HistoryEvent;
use wf_core::ActivityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    Activity,
    Timer,
    ChildWorkflow,
    Marker,
    CancelExternal,
    SignalExternal,
    UpsertSearchAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    New,
    CommandEmitted,
    Initiated,
    Started,
    CancelRequested,
    Completed,
    Failed,
    TimedOut,
    Canceled,
}

impl MachineState {
    fn name(self) -> &'static str {
        match self {
            MachineState::New => "New",
            MachineState::CommandEmitted => "CommandEmitted",
            MachineState::Initiated => "Initiated",
            MachineState::Started => "Started",
            MachineState::CancelRequested => "CancelRequested",
            MachineState::Completed => "Completed",
            MachineState::Failed => "Failed",
            MachineState::TimedOut => "TimedOut",
            MachineState::Canceled => "Canceled",
        }
    }
}

/// What a terminal (or otherwise interesting) transition produces, for the
/// caller to forward into whatever future/settable it has paired with this
/// machine. `wf-decision` has no notion of futures itself (no `wf-runtime`
/// dependency) — that wiring belongs to `wf-engine`.
#[derive(Debug, Clone)]
pub enum Outcome {
    ActivityCompleted(Payload),
    ActivityFailed(ActivityError),
    TimerFired,
    TimerCanceled,
    ChildWorkflowStarted,
    ChildWorkflowCompleted(Payload),
    ChildWorkflowFailed(ActivityError),
    ChildWorkflowCanceled(Option<Payload>),
    ChildWorkflowTimedOut,
    MarkerRecorded(HashMap<String, Payload>),
    ExternalCancelRequested,
    SignalSent,
    SignalFailed(String),
}

/// Either an internal sequencing bug (§7 "Fatal") or a genuine replay
/// mismatch between what user code is doing now and what history recorded
/// (§7 "Nondeterminism", §4.9.3) — kept distinct because the executor
/// handles them under different policies.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransitionError {
    #[error(transparent)]
    Fatal(#[from] FatalReason),
    #[error("nondeterministic workflow definition: {0}")]
    Nondeterminism(String),
}

pub struct DecisionStateMachine {
    pub id: DecisionId,
    pub kind: DecisionKind,
    state: MachineState,
    history_seen: Vec<&'static str>,
    /// The attribute (activity type / timer id / child workflow type / ...)
    /// user code supplied when it emitted the command, checked against the
    /// matching history event's own attribute the first time it correlates
    /// (§4.9.3 "compare attributes under a per-kind equivalence function").
    /// `None` for kinds that carry no single comparable tag.
    expected_tag: Option<String>,
}

fn event_name(event: &HistoryEvent) -> &'static str {
    use HistoryEvent::*;
    match event {
        WorkflowExecutionStarted { .. } => "WorkflowExecutionStarted",
        WorkflowTaskScheduled { .. } => "WorkflowTaskScheduled",
        WorkflowTaskStarted { .. } => "WorkflowTaskStarted",
        WorkflowTaskCompleted { .. } => "WorkflowTaskCompleted",
        WorkflowTaskFailed { .. } => "WorkflowTaskFailed",
        ActivityTaskScheduled { .. } => "ActivityTaskScheduled",
        ActivityTaskStarted { .. } => "ActivityTaskStarted",
        ActivityTaskCompleted { .. } => "ActivityTaskCompleted",
        ActivityTaskFailed { .. } => "ActivityTaskFailed",
        ActivityTaskTimedOut { .. } => "ActivityTaskTimedOut",
        ActivityTaskCancelRequested { .. } => "ActivityTaskCancelRequested",
        ActivityTaskCanceled { .. } => "ActivityTaskCanceled",
        TimerStarted { .. } => "TimerStarted",
        TimerFired { .. } => "TimerFired",
        TimerCanceled { .. } => "TimerCanceled",
        MarkerRecorded { .. } => "MarkerRecorded",
        WorkflowExecutionSignaled { .. } => "WorkflowExecutionSignaled",
        StartChildWorkflowExecutionInitiated { .. } => "StartChildWorkflowExecutionInitiated",
        ChildWorkflowExecutionStarted { .. } => "ChildWorkflowExecutionStarted",
        ChildWorkflowExecutionCompleted { .. } => "ChildWorkflowExecutionCompleted",
        ChildWorkflowExecutionFailed { .. } => "ChildWorkflowExecutionFailed",
        ChildWorkflowExecutionCanceled { .. } => "ChildWorkflowExecutionCanceled",
        ChildWorkflowExecutionTimedOut { .. } => "ChildWorkflowExecutionTimedOut",
        RequestCancelExternalWorkflowExecutionInitiated { .. } => "RequestCancelExternalWorkflowExecutionInitiated",
        ExternalWorkflowExecutionCancelRequested { .. } => "ExternalWorkflowExecutionCancelRequested",
        SignalExternalWorkflowExecutionInitiated { .. } => "SignalExternalWorkflowExecutionInitiated",
        SignalExternalWorkflowExecutionFailed { .. } => "SignalExternalWorkflowExecutionFailed",
        UpsertWorkflowSearchAttributes { .. } => "UpsertWorkflowSearchAttributes",
    }
}

impl DecisionStateMachine {
    pub fn new(id: DecisionId, kind: DecisionKind) -> Self {
        Self::new_with_tag(id, kind, None)
    }

    pub fn new_with_tag(id: DecisionId, kind: DecisionKind, expected_tag: Option<String>) -> Self {
        DecisionStateMachine { id, kind, state: MachineState::New, history_seen: Vec::new(), expected_tag }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    fn illegal(&self, event: &HistoryEvent) -> FatalReason {
        FatalReason::IllegalTransition {
            decision_id: self.id,
            state: self.state.name().to_string(),
            event: event_name(event).to_string(),
            history: self.history_seen.clone().into_iter().map(String::from).collect(),
        }
    }

    /// Checks the incoming correlating event's tag (activity type / timer id
    /// / child workflow type / ...) against what user code scheduled. `None`
    /// expected means this kind doesn't carry a comparable tag.
    fn check_tag(&self, actual: &str) -> Result<(), TransitionError> {
        match &self.expected_tag {
            Some(expected) if expected != actual => {
                tracing::warn!(decision_id = %self.id, kind = ?self.kind, expected, actual, "decision attribute mismatch on replay");
                Err(TransitionError::Nondeterminism(format!(
                    "decision {} ({:?}) was scheduled as {:?} but history recorded {:?}",
                    self.id, self.kind, expected, actual
                )))
            }
            _ => Ok(()),
        }
    }

    /// Called the moment the matching command is added to the outgoing
    /// command batch, before any correlating event has replayed.
    pub fn on_command_emitted(&mut self) -> Result<(), FatalReason> {
        match self.state {
            MachineState::New => {
                self.state = MachineState::CommandEmitted;
                Ok(())
            }
            _ => Err(FatalReason::IllegalTransition {
                decision_id: self.id,
                state: self.state.name().to_string(),
                event: "CommandEmitted".to_string(),
                history: self.history_seen.clone().into_iter().map(String::from).collect(),
            }),
        }
    }

    /// Called when user code requests cancellation of an in-flight
    /// activity/timer/child workflow. Legal from any non-terminal state
    /// once a command has been emitted.
    pub fn on_cancel_requested(&mut self) -> Result<(), FatalReason> {
        match self.state {
            MachineState::CommandEmitted | MachineState::Initiated | MachineState::Started => {
                self.state = MachineState::CancelRequested;
                tracing::debug!(decision_id = %self.id, kind = ?self.kind, "cancellation requested");
                Ok(())
            }
            _ => Err(FatalReason::IllegalTransition {
                decision_id: self.id,
                state: self.state.name().to_string(),
                event: "CancelRequested".to_string(),
                history: self.history_seen.clone().into_iter().map(String::from).collect(),
            }),
        }
    }

    /// Feeds one history event into the machine. Returns `Some(Outcome)` on
    /// a terminal (or otherwise result-bearing) transition.
    pub fn apply_event(&mut self, event: &HistoryEvent) -> Result<Option<Outcome>, TransitionError> {
        use HistoryEvent::*;
        use MachineState::*;

        let outcome = match (self.kind, self.state, event) {
            (DecisionKind::Activity, CommandEmitted, ActivityTaskScheduled { activity_type, .. }) => {
                self.check_tag(activity_type)?;
                self.state = Initiated;
                None
            }
            (DecisionKind::Activity, Initiated, ActivityTaskStarted { .. }) => {
                self.state = Started;
                None
            }
            (DecisionKind::Activity, Initiated | Started, ActivityTaskCompleted { result, .. }) => {
                self.state = Completed;
                Some(Outcome::ActivityCompleted(result.clone()))
            }
            (DecisionKind::Activity, Initiated | Started, ActivityTaskFailed { failure, .. }) => {
                self.state = Failed;
                Some(Outcome::ActivityFailed(failure.clone()))
            }
            (DecisionKind::Activity, Initiated | Started, ActivityTaskTimedOut { timeout_type, .. }) => {
                self.state = TimedOut;
                Some(Outcome::ActivityFailed(ActivityError::Timeout { timeout_type: timeout_type.clone(), last_heartbeat_details: None }))
            }
            (DecisionKind::Activity, CancelRequested, ActivityTaskCancelRequested { .. }) => None,
            (DecisionKind::Activity, Initiated | Started | CancelRequested, ActivityTaskCanceled { details, .. }) => {
                self.state = Canceled;
                Some(Outcome::ActivityFailed(ActivityError::Canceled { details: details.clone() }))
            }

            (DecisionKind::Timer, CommandEmitted, TimerStarted { timer_id, .. }) => {
                self.check_tag(timer_id)?;
                self.state = Initiated;
                None
            }
            (DecisionKind::Timer, Initiated, TimerFired { .. }) => {
                self.state = Completed;
                Some(Outcome::TimerFired)
            }
            (DecisionKind::Timer, Initiated | CancelRequested, TimerCanceled { .. }) => {
                self.state = Canceled;
                Some(Outcome::TimerCanceled)
            }

            (DecisionKind::Marker, CommandEmitted, MarkerRecorded { details, .. }) => {
                self.state = Completed;
                Some(Outcome::MarkerRecorded(details.clone()))
            }

            (DecisionKind::ChildWorkflow, CommandEmitted, StartChildWorkflowExecutionInitiated { workflow_type, .. }) => {
                self.check_tag(workflow_type)?;
                self.state = Initiated;
                None
            }
            (DecisionKind::ChildWorkflow, Initiated, ChildWorkflowExecutionStarted { .. }) => {
                self.state = Started;
                Some(Outcome::ChildWorkflowStarted)
            }
            (DecisionKind::ChildWorkflow, Started, ChildWorkflowExecutionCompleted { result, .. }) => {
                self.state = Completed;
                Some(Outcome::ChildWorkflowCompleted(result.clone()))
            }
            (DecisionKind::ChildWorkflow, Started, ChildWorkflowExecutionFailed { failure, .. }) => {
                self.state = Failed;
                Some(Outcome::ChildWorkflowFailed(failure.clone()))
            }
            (DecisionKind::ChildWorkflow, Started | CancelRequested, ChildWorkflowExecutionCanceled { details, .. }) => {
                self.state = Canceled;
                Some(Outcome::ChildWorkflowCanceled(details.clone()))
            }
            (DecisionKind::ChildWorkflow, Started, ChildWorkflowExecutionTimedOut { .. }) => {
                self.state = TimedOut;
                Some(Outcome::ChildWorkflowTimedOut)
            }

            (DecisionKind::CancelExternal, CommandEmitted, RequestCancelExternalWorkflowExecutionInitiated { .. }) => {
                self.state = Initiated;
                None
            }
            (DecisionKind::CancelExternal, Initiated, ExternalWorkflowExecutionCancelRequested { .. }) => {
                self.state = Completed;
                Some(Outcome::ExternalCancelRequested)
            }

            // A signal has no dedicated success event (§6's event list has
            // no `SignalExternalWorkflowExecutionCompleted`), so we resolve
            // it successful as soon as its Initiated event correlates, and
            // treat a later Failed event (keyed by the same
            // `initiated_event_id`) as downgrading that already-resolved
            // outcome — see DESIGN.md's Open Question writeup.
            (DecisionKind::SignalExternal, CommandEmitted, SignalExternalWorkflowExecutionInitiated { .. }) => {
                self.state = Completed;
                Some(Outcome::SignalSent)
            }
            (DecisionKind::SignalExternal, Completed, SignalExternalWorkflowExecutionFailed { cause, .. }) => {
                self.state = Failed;
                Some(Outcome::SignalFailed(cause.clone()))
            }

            (DecisionKind::UpsertSearchAttributes, CommandEmitted, UpsertWorkflowSearchAttributes { .. }) => {
                self.state = Completed;
                None
            }

            _ => {
                let reason = self.illegal(event);
                tracing::error!(decision_id = %self.id, kind = ?self.kind, state = self.state.name(), event = event_name(event), "illegal decision transition");
                return Err(reason.into());
            }
        };

        self.history_seen.push(event_name(event));
        tracing::trace!(decision_id = %self.id, kind = ?self.kind, event = event_name(event), state = self.state.name(), "decision transition applied");
        Ok(outcome)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, MachineState::Completed | MachineState::Failed | MachineState::TimedOut | MachineState::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::payload::Payload;

    #[test]
    fn activity_happy_path() {
        let mut m = DecisionStateMachine::new(DecisionId::from_raw(0), DecisionKind::Activity);
        m.on_command_emitted().unwrap();
        assert!(m
            .apply_event(&HistoryEvent::ActivityTaskScheduled {
                event_id: 1,
                scheduled_event_id: 1,
                activity_type: "do_thing".into(),
                input: vec![]
            })
            .unwrap()
            .is_none());
        let outcome = m
            .apply_event(&HistoryEvent::ActivityTaskCompleted { event_id: 2, scheduled_event_id: 1, result: Payload::from_bytes(vec![1]) })
            .unwrap();
        assert!(matches!(outcome, Some(Outcome::ActivityCompleted(_))));
        assert!(m.is_terminal());
    }

    #[test]
    fn activity_out_of_order_event_is_fatal() {
        let mut m = DecisionStateMachine::new(DecisionId::from_raw(0), DecisionKind::Activity);
        m.on_command_emitted().unwrap();
        let err = m
            .apply_event(&HistoryEvent::ActivityTaskCompleted { event_id: 2, scheduled_event_id: 1, result: Payload::from_bytes(vec![]) })
            .unwrap_err();
        assert!(matches!(err, TransitionError::Fatal(FatalReason::IllegalTransition { .. })));
    }

    #[test]
    fn activity_type_mismatch_is_nondeterminism() {
        let mut m = DecisionStateMachine::new_with_tag(DecisionId::from_raw(0), DecisionKind::Activity, Some("Greeter_Activity".to_string()));
        m.on_command_emitted().unwrap();
        let err = m
            .apply_event(&HistoryEvent::ActivityTaskScheduled {
                event_id: 1,
                scheduled_event_id: 1,
                activity_type: "some-other-activity".into(),
                input: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, TransitionError::Nondeterminism(_)));
    }
}
