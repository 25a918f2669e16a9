//! The bridge between `wf-runtime`'s generic `Context` value map and
//! `wf-decision`'s registry: a single piece of per-run state, stashed into
//! the run's root `Context` under a well-known key so any coroutine can
//! reach it through `Scope::context().value(...)` without `wf-runtime`
//! itself needing to know `wf-decision` exists. Mirrors how the teacher's
//! `Fib` carries a raw pointer back to `World` for the same reason: the
//! thing a coroutine parameter needs live across the crate boundary the
//! dispatcher was built without knowledge of.

use std::collections::HashMap;
use std::rc::Rc;

use wf_core::payload::Payload;
use wf_core::wire::Command;
use wf_core::ids::DecisionId;
use wf_decision::{DecisionRegistry, Outcome};
use wf_runtime::Channel;

pub(crate) const ENGINE_STATE_KEY: &str = "wf_engine::state";

pub(crate) type Completion = Box<dyn FnMut(Outcome)>;

/// A registered query handler: a synchronous function of whatever workflow
/// state the registering closure captured, not of replay history (§4.9.4).
pub(crate) type QueryHandler = Box<dyn Fn(Vec<Payload>) -> Result<Payload, String>>;

pub(crate) struct EngineState {
    pub registry: DecisionRegistry,
    pub commands: Vec<Command>,
    pub completions: HashMap<DecisionId, Completion>,
    pub signals: Channel<(String, Vec<Payload>)>,
    /// `binary_checksum`s carried by every `WorkflowTaskCompleted` event
    /// replayed so far, in history order — exposed to workflow code via
    /// `ops::seen_binary_checksums` for workflows that track them (§4.9's
    /// BinaryChecksum seed scenario).
    pub binary_checksums: Vec<String>,
    /// Handlers registered by the workflow coroutine via
    /// `ops::set_query_handler`, keyed by query type.
    pub query_handlers: HashMap<String, QueryHandler>,
}

pub(crate) type EngineHandle = Rc<std::cell::RefCell<EngineState>>;
