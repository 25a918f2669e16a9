//! Shared data model for the workflow worker runtime: opaque payloads, id
//! newtypes, the wire-facing history/command structures, and the error
//! taxonomy every other crate in the workspace builds on.

pub mod error;
pub mod ids;
pub mod payload;
pub mod wire;

pub use error::{ActivityError, CancelledError, CoreError, FatalReason, HistoryError, NondeterminismError, WorkflowPanic};
pub use ids::{ContextId, CoroutineId, DecisionId, IdAllocator};
pub use payload::{CodecError, JsonCodec, Payload, PayloadCodec};
