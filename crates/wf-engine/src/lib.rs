//! The workflow executor: replays history into the decision registry,
//! drives the `wf-runtime` dispatcher, and exposes the high-level
//! operation API (`ops`) workflow coroutines call to schedule activities,
//! timers, child workflows, and the rest of §4.7.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod config;
mod error;
mod executor;
mod ops;
mod state;

pub use config::{ExecutorConfig, NondeterminismPolicy};
pub use error::ExecutorError;
pub use executor::{WorkflowExecutor, WorkflowFn};
pub use ops::{
    cancel_timer, record_marker, request_cancel_activity, request_cancel_external_workflow, schedule_activity, seen_binary_checksums,
    set_query_handler, signal_external_workflow, signals, start_child_workflow, start_timer, upsert_search_attributes, ChildWorkflowHandle,
};
