//! Decision state machines and the registry correlating them with replayed
//! history, §4.7–§4.8. Deliberately has no dependency on `wf-runtime`: a
//! machine only knows command/event correlation, never how its outcome
//! gets delivered back into a coroutine — `wf-engine` wires the two
//! together.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod machine;
mod registry;

pub use machine::{DecisionKind, DecisionStateMachine, MachineState, Outcome, TransitionError};
pub use registry::DecisionRegistry;
