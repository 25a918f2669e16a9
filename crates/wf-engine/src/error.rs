//! Executor-level errors. Wraps `wf_core::CoreError` (the runtime/decision
//! layer's taxonomy) the way `f-squirrel-nearcore`'s higher-level errors
//! wrap its lower-level ones with `#[from]` rather than flattening
//! everything into one enum.

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Core(#[from] wf_core::CoreError),

    #[error("workflow task references a workflow type with no registered definition: {0}")]
    UnknownWorkflowType(String),

    #[error("workflow task had no WorkflowExecutionStarted event and no running workflow instance")]
    MissingWorkflowStart,
}
