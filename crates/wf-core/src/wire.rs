//! External interfaces, §6. The core doesn't define a wire protocol — these
//! are the typed structures a transport layer maps to and from the
//! orchestrator's actual RPC. Tagged the way every wire-facing enum in the
//! pack is tagged (`alfredjeanlab-oddjobs::event::Event` uses
//! `#[serde(tag = "type")]` per-variant renames; we follow the same shape).

use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type EventId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HistoryEvent {
    WorkflowExecutionStarted { event_id: EventId, workflow_type: String, input: Vec<Payload> },
    WorkflowTaskScheduled { event_id: EventId },
    WorkflowTaskStarted { event_id: EventId },
    WorkflowTaskCompleted { event_id: EventId, binary_checksum: Option<String> },
    WorkflowTaskFailed { event_id: EventId, cause: String },

    ActivityTaskScheduled { event_id: EventId, scheduled_event_id: EventId, activity_type: String, input: Vec<Payload> },
    ActivityTaskStarted { event_id: EventId, scheduled_event_id: EventId },
    ActivityTaskCompleted { event_id: EventId, scheduled_event_id: EventId, result: Payload },
    ActivityTaskFailed { event_id: EventId, scheduled_event_id: EventId, failure: crate::error::ActivityError },
    ActivityTaskTimedOut { event_id: EventId, scheduled_event_id: EventId, timeout_type: String },
    ActivityTaskCancelRequested { event_id: EventId, scheduled_event_id: EventId },
    ActivityTaskCanceled { event_id: EventId, scheduled_event_id: EventId, details: Option<Payload> },

    TimerStarted { event_id: EventId, timer_id: String, started_event_id: EventId },
    TimerFired { event_id: EventId, timer_id: String, started_event_id: EventId },
    TimerCanceled { event_id: EventId, timer_id: String, started_event_id: EventId },

    MarkerRecorded { event_id: EventId, marker_name: MarkerKind, details: HashMap<String, Payload> },

    WorkflowExecutionSignaled { event_id: EventId, signal_name: String, input: Vec<Payload> },

    StartChildWorkflowExecutionInitiated { event_id: EventId, workflow_id: String, workflow_type: String, input: Vec<Payload> },
    ChildWorkflowExecutionStarted { event_id: EventId, initiated_event_id: EventId },
    ChildWorkflowExecutionCompleted { event_id: EventId, initiated_event_id: EventId, result: Payload },
    ChildWorkflowExecutionFailed { event_id: EventId, initiated_event_id: EventId, failure: crate::error::ActivityError },
    ChildWorkflowExecutionCanceled { event_id: EventId, initiated_event_id: EventId, details: Option<Payload> },
    ChildWorkflowExecutionTimedOut { event_id: EventId, initiated_event_id: EventId },

    RequestCancelExternalWorkflowExecutionInitiated { event_id: EventId, initiated_event_id: EventId, workflow_id: String },
    ExternalWorkflowExecutionCancelRequested { event_id: EventId, initiated_event_id: EventId },
    SignalExternalWorkflowExecutionInitiated { event_id: EventId, initiated_event_id: EventId, workflow_id: String, signal_name: String },
    SignalExternalWorkflowExecutionFailed { event_id: EventId, initiated_event_id: EventId, cause: String },

    UpsertWorkflowSearchAttributes { event_id: EventId, search_attributes: HashMap<String, Payload> },
}

impl HistoryEvent {
    pub fn event_id(&self) -> EventId {
        use HistoryEvent::*;
        match self {
            WorkflowExecutionStarted { event_id, .. }
            | WorkflowTaskScheduled { event_id }
            | WorkflowTaskStarted { event_id }
            | WorkflowTaskCompleted { event_id, .. }
            | WorkflowTaskFailed { event_id, .. }
            | ActivityTaskScheduled { event_id, .. }
            | ActivityTaskStarted { event_id, .. }
            | ActivityTaskCompleted { event_id, .. }
            | ActivityTaskFailed { event_id, .. }
            | ActivityTaskTimedOut { event_id, .. }
            | ActivityTaskCancelRequested { event_id, .. }
            | ActivityTaskCanceled { event_id, .. }
            | TimerStarted { event_id, .. }
            | TimerFired { event_id, .. }
            | TimerCanceled { event_id, .. }
            | MarkerRecorded { event_id, .. }
            | WorkflowExecutionSignaled { event_id, .. }
            | StartChildWorkflowExecutionInitiated { event_id, .. }
            | ChildWorkflowExecutionStarted { event_id, .. }
            | ChildWorkflowExecutionCompleted { event_id, .. }
            | ChildWorkflowExecutionFailed { event_id, .. }
            | ChildWorkflowExecutionCanceled { event_id, .. }
            | ChildWorkflowExecutionTimedOut { event_id, .. }
            | RequestCancelExternalWorkflowExecutionInitiated { event_id, .. }
            | ExternalWorkflowExecutionCancelRequested { event_id, .. }
            | SignalExternalWorkflowExecutionInitiated { event_id, .. }
            | SignalExternalWorkflowExecutionFailed { event_id, .. }
            | UpsertWorkflowSearchAttributes { event_id, .. } => *event_id,
        }
    }

    pub fn is_workflow_task_completed(&self) -> bool {
        matches!(self, HistoryEvent::WorkflowTaskCompleted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    SideEffect,
    Version,
    LocalActivity,
    MutableSideEffect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    ScheduleActivityTask { activity_id: String, activity_type: String, input: Vec<Payload> },
    RequestCancelActivityTask { activity_id: String },
    StartTimer { timer_id: String, duration_ms: u64 },
    CancelTimer { timer_id: String },
    StartChildWorkflowExecution { workflow_id: String, workflow_type: String, input: Vec<Payload> },
    RequestCancelExternalWorkflowExecution { workflow_id: String },
    SignalExternalWorkflowExecution { workflow_id: String, signal_name: String, input: Vec<Payload> },
    RecordMarker { marker_name: MarkerKind, details: HashMap<String, Payload> },
    UpsertWorkflowSearchAttributes { search_attributes: HashMap<String, Payload> },
    CompleteWorkflowExecution { result: Payload },
    FailWorkflowExecution { message: String, failure_type: String },
    CancelWorkflowExecution,
    ContinueAsNewWorkflowExecution { workflow_type: String, input: Vec<Payload> },
}

/// One query attached to a task (single- or multi-query payload, §4.9.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub query_id: String,
    pub query_type: String,
    pub args: Vec<Payload>,
}

#[derive(Debug, Clone)]
pub struct WorkflowTask {
    pub workflow_type: String,
    pub workflow_id: String,
    pub run_id: String,
    pub previous_started_event_id: Option<EventId>,
    pub started_event_id: EventId,
    pub history: Vec<HistoryEvent>,
    /// Callback-shaped rather than a single token: calling it fetches the
    /// next page, mirroring the source's paginated history fetch.
    pub next_page: Option<NextPageToken>,
    /// Legacy single-query slot. A task with both this and a non-empty
    /// `queries` populated is a malformed task (§4.9.4 "mixed single/multi
    /// query").
    pub query: Option<QueryDescriptor>,
    pub queries: Vec<QueryDescriptor>,
}

#[derive(Debug, Clone)]
pub struct NextPageToken(pub Vec<u8>);

#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Answer(Payload),
    Error(String),
}

#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed {
        commands: Vec<Command>,
        query_results: HashMap<String, QueryOutcome>,
    },
    Failed {
        cause: String,
        message: String,
        failure_type: String,
        stack_trace: Option<Payload>,
    },
}
