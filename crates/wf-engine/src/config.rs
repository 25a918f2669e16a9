//! Ambient executor configuration. Grounded on `alfredjeanlab-oddjobs`'s
//! `Executor`/`ExecutorConfig`-style struct of small, independently
//! toggleable knobs rather than one constructor with a long positional
//! argument list.

/// What to do when a replayed command doesn't match what history actually
/// recorded (§7 "Nondeterminism").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NondeterminismPolicy {
    /// Suspend the workflow task without completing it — the orchestrator
    /// will keep retrying until a worker with compatible code picks it up.
    BlockWorkflow,
    /// Fail the workflow task outright, surfacing the mismatch to the user.
    FailWorkflow,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub nondeterminism_policy: NondeterminismPolicy,
    /// When true, a second `UpsertWorkflowSearchAttributes` command with
    /// keys absent from the first is treated as a nondeterminism error
    /// rather than silently merged (§4.7's UpsertSearchAttributes kind).
    pub strict_search_attributes: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig { nondeterminism_policy: NondeterminismPolicy::BlockWorkflow, strict_search_attributes: false }
    }
}
