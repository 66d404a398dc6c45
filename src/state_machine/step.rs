//! Step events published while a turn streams

use crate::state_machine::state::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Classification of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Unclassified model round
    #[allow(dead_code)] // Part of the wire vocabulary; every round here is classified
    ModelCall,
    /// Model round that requested tools
    ToolDecision,
    /// One tool dispatch
    ToolExecution,
    /// Model round without tool requests
    FinalAnswer,
    /// Turn failed before a final answer
    Error,
}

/// One published step of a streamed turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub task_name: String,
    pub content: String,
    pub step_kind: StepKind,
    pub is_final: bool,
}

impl StepEvent {
    pub fn tool_decision(calls: &[ToolCall]) -> Self {
        let mut content = String::from("Thinking and deciding which tools to use...");
        for call in calls {
            let _ = write!(content, "\n\nTool: {}\nArguments: {}", call.name, call.input);
        }
        Self {
            task_name: "call_model".to_string(),
            content,
            step_kind: StepKind::ToolDecision,
            is_final: false,
        }
    }

    pub fn tool_execution(result: &ToolResult) -> Self {
        Self {
            task_name: "call_tool".to_string(),
            content: format!("Executing tool...\n\nResult:\n{}", result.output),
            step_kind: StepKind::ToolExecution,
            is_final: false,
        }
    }

    pub fn final_answer(answer: impl Into<String>) -> Self {
        Self {
            task_name: "call_model".to_string(),
            content: answer.into(),
            step_kind: StepKind::FinalAnswer,
            is_final: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            task_name: "error".to_string(),
            content: message.into(),
            step_kind: StepKind::Error,
            is_final: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_decision_lists_every_call() {
        let calls = vec![
            ToolCall::new("a", "fda_adverse_events_tool", json!({"drug_name": "TRAMADOL"})),
            ToolCall::new("b", "pdf_search_tool", json!({"question": "revenue"})),
        ];
        let step = StepEvent::tool_decision(&calls);
        assert_eq!(step.step_kind, StepKind::ToolDecision);
        assert!(!step.is_final);
        assert!(step.content.contains("Tool: fda_adverse_events_tool"));
        assert!(step.content.contains("Tool: pdf_search_tool"));
        assert!(step.content.contains("TRAMADOL"));
    }

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(StepEvent::final_answer("done")).unwrap();
        assert_eq!(value["step_kind"], "final_answer");
        assert_eq!(value["is_final"], true);
        assert_eq!(value["task_name"], "call_model");
    }
}
