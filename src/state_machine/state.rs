//! Turn state types

use crate::llm::{ContentBlock, LlmErrorKind};
use serde_json::Value;

// ============================================================================
// Tool Call - A tool invocation request from the model
// ============================================================================

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Opaque call identifier, unique within a turn
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Outcome of dispatching one [`ToolCall`]
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            is_error: true,
        }
    }

    pub fn to_content_block(&self) -> ContentBlock {
        ContentBlock::tool_result(self.call_id.clone(), self.output.clone(), self.is_error)
    }
}

// ============================================================================
// Turn State
// ============================================================================

/// Why a turn stopped without a final answer
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The model invocation itself failed
    Model { message: String, kind: LlmErrorKind },
    /// The model kept requesting tools on the last permitted round
    MaxRoundsExceeded { max_rounds: u32 },
}

/// State of one turn
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TurnState {
    /// No question yet
    #[default]
    Idle,

    /// Model request in flight for `round` (1-based)
    AwaitingModel { round: u32 },

    /// Tools requested by the model in `round` are being dispatched
    DispatchingTools {
        round: u32,
        /// Assistant content that carried the requests, appended to history once all results arrive
        assistant: Vec<ContentBlock>,
        /// Requests in the order the model issued them
        requested: Vec<ToolCall>,
        /// Results received so far, in arrival order
        completed: Vec<ToolResult>,
    },

    /// Model answered without requesting tools
    Done { answer: String },

    /// Turn aborted
    Failed { reason: FailureReason },
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Done { .. } | TurnState::Failed { .. })
    }
}

/// Default cap on model rounds per turn
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Immutable configuration of one turn
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub turn_id: String,
    /// A turn performs at most this many model invocations
    pub max_rounds: u32,
    /// Dispatch all tools of a round at once instead of one after another
    pub parallel_tools: bool,
}

impl TurnContext {
    pub fn new(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            parallel_tools: false,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_parallel_tools(mut self, parallel: bool) -> Self {
        self.parallel_tools = parallel;
        self
    }
}
