//! Events that can occur during a turn

use crate::llm::{ContentBlock, LlmError, LlmResponse};
use crate::state_machine::state::{ToolCall, ToolResult};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// The user's question opens the turn
    UserQuestion { text: String },

    // LLM events
    ModelResponded {
        content: Vec<ContentBlock>,
        /// Tool calls extracted from the content
        tool_calls: Vec<ToolCall>,
    },
    ModelFailed { error: LlmError },

    // Tool events
    ToolCompleted { result: ToolResult },
}

impl Event {
    pub fn from_response(response: LlmResponse) -> Self {
        let tool_calls = response
            .tool_uses()
            .into_iter()
            .map(|(id, name, input)| ToolCall::new(id, name, input.clone()))
            .collect();
        Event::ModelResponded {
            content: response.content,
            tool_calls,
        }
    }
}
