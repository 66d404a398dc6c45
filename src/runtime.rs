//! Runtime for executing agent turns

mod executor;
mod stream;
mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{TurnOptions, TurnRuntime};
pub use stream::{stream_turn, StepStream};

use crate::llm::LlmError;
use crate::state_machine::{FailureReason, TransitionError};
use std::fmt::Display;
use thiserror::Error;

/// Why a turn produced no answer
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{0}")]
    Model(LlmError),
    #[error("Agent stopped after {max_rounds} model rounds without a final answer")]
    MaxRoundsExceeded { max_rounds: u32 },
    #[error("Agent loop error: {0}")]
    Transition(#[from] TransitionError),
    #[error("Turn cancelled")]
    Cancelled,
    #[error("Agent not initialized")]
    NotInitialized,
    #[error("Agent setup failed: {0}")]
    Setup(String),
}

impl From<FailureReason> for AgentError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Model { message, kind } => AgentError::Model(LlmError::new(kind, message)),
            FailureReason::MaxRoundsExceeded { max_rounds } => AgentError::MaxRoundsExceeded { max_rounds },
        }
    }
}

/// User-facing text for a turn that failed
pub fn failure_text(error: &dyn Display) -> String {
    format!("Error running agent: {error}")
}
