//! Error taxonomy, §7. `thiserror` the way `alfredjeanlab-oddjobs` and
//! `f-squirrel-nearcore` build their error enums — one variant per distinct
//! failure mode instead of a single opaque string, so callers can match on
//! what actually happened.

use crate::ids::{CoroutineId, DecisionId};

/// Internal invariant violations (§7 "Fatal (illegal state)"). The source
/// raises these as panics; re-expressed here as a typed, unrecoverable
/// error bubbled through the one designated boundary — the dispatcher's
/// coroutine-resume step — rather than an actual Rust panic propagating
/// through the whole call stack (DESIGN NOTES §9, "Panic as control flow").
#[derive(Debug, thiserror::Error, Clone)]
pub enum FatalReason {
    #[error("send on closed channel {0:?}")]
    SendOnClosedChannel(String),

    #[error("channel {0:?} closed twice")]
    DoubleClose(String),

    #[error("future set twice")]
    DoubleSetFuture,

    #[error("Chain() called on a settable that was already set directly")]
    ChainAfterSet,

    #[error("illegal decision state transition: {decision_id} received {event} while in state {state}; history: {history:?}")]
    IllegalTransition { decision_id: DecisionId, state: String, event: String, history: Vec<String> },

    #[error("duplicate decision id {0}")]
    DuplicateDecisionId(DecisionId),

    #[error("no id->string mapping for scheduled event id {0}")]
    MissingIdMapping(i64),

    #[error("a coroutine yielded without a recognised blocking reason; did it await a foreign future?")]
    UnrecognisedYield,
}

/// A caught panic from user workflow code (§7 "User panics").
#[derive(Debug, Clone)]
pub struct WorkflowPanic {
    pub coroutine: CoroutineId,
    pub coroutine_name: String,
    pub message: String,
    pub stack_trace: String,
}

impl std::fmt::Display for WorkflowPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "panic in coroutine {} ({}): {}", self.coroutine_name, self.coroutine, self.message)
    }
}

impl std::error::Error for WorkflowPanic {}

/// Raised by `Context` cancellation at a suspension point (§7 "Cancellation").
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("context cancelled: {cause}")]
pub struct CancelledError {
    pub cause: String,
}

/// History replay anomalies (§7 "History anomalies").
#[derive(Debug, thiserror::Error, Clone)]
pub enum HistoryError {
    #[error("missing history events: expected next event id {expected}, got {got}")]
    MissingEvents { expected: i64, got: i64 },

    #[error("premature end of stream: history ends before started-event-id {started_event_id}")]
    PrematureEndOfStream { started_event_id: i64 },

    #[error("invalid query workflow task")]
    InvalidQueryTask,
}

/// §7 "Nondeterminism": command/event mismatch detected during replay.
#[derive(Debug, thiserror::Error, Clone)]
#[error("nondeterministic workflow definition: {message}")]
pub struct NondeterminismError {
    pub message: String,
}

/// §7 "Async activity outcomes": typed errors surfaced through a future's
/// error slot.
#[derive(Debug, Clone, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum ActivityError {
    #[error("{message}")]
    Generic { message: String },

    #[error("{reason}")]
    Custom { reason: String, details: Vec<crate::payload::Payload> },

    #[error("activity timed out ({timeout_type})")]
    Timeout { timeout_type: String, last_heartbeat_details: Option<crate::payload::Payload> },

    #[error("activity canceled")]
    Canceled { details: Option<crate::payload::Payload> },
}

/// The umbrella error type most core operations return.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Fatal(#[from] FatalReason),
    #[error(transparent)]
    Cancelled(#[from] CancelledError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Nondeterminism(#[from] NondeterminismError),
    #[error("workflow panicked: {0}")]
    Panic(WorkflowPanic),
}

impl From<WorkflowPanic> for CoreError {
    fn from(p: WorkflowPanic) -> Self {
        CoreError::Panic(p)
    }
}
