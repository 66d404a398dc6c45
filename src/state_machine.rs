//! Agent turn state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub mod step;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{FailureReason, ToolCall, ToolResult, TurnContext, TurnState, DEFAULT_MAX_ROUNDS};
pub use step::{StepEvent, StepKind};
pub use transition::{transition, TransitionError};
