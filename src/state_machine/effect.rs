//! Effects produced by state transitions

use crate::llm::LlmMessage;
use crate::state_machine::state::ToolCall;
use crate::state_machine::step::StepEvent;

/// Effects to be executed after state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Append messages to the turn's history
    AppendHistory { messages: Vec<LlmMessage> },

    /// Make an LLM request with the current history
    InvokeModel,

    /// Dispatch a single tool
    ExecuteTool { tool: ToolCall },

    /// Dispatch a batch of tools concurrently; results are reported in request order
    ExecuteTools { tools: Vec<ToolCall> },

    /// Publish a step to the streaming consumer, if any
    EmitStep { step: StepEvent },
}

impl Effect {
    pub fn append(messages: Vec<LlmMessage>) -> Self {
        Effect::AppendHistory { messages }
    }

    pub fn emit(step: StepEvent) -> Self {
        Effect::EmitStep { step }
    }

    pub fn execute_tool(tool: ToolCall) -> Self {
        Effect::ExecuteTool { tool }
    }
}
