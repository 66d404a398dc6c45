//! Pure state transition function

use super::state::{FailureReason, ToolCall, ToolResult, TurnContext, TurnState};
use super::step::StepEvent;
use super::{Effect, Event};
use crate::llm::{text_content, ContentBlock, LlmMessage};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("Tool result for unknown call id: {0}")]
    UnexpectedToolResult(String),
    #[error("Duplicate tool result for call id: {0}")]
    DuplicateToolResult(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs this always produces the same outputs with no I/O.
pub fn transition(
    state: &TurnState,
    context: &TurnContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Question
        // ============================================================
        (TurnState::Idle, Event::UserQuestion { text }) => {
            Ok(TransitionResult::new(TurnState::AwaitingModel { round: 1 })
                .with_effect(Effect::append(vec![LlmMessage::user(vec![ContentBlock::text(text)])]))
                .with_effect(Effect::InvokeModel))
        }

        // ============================================================
        // Model responses
        // ============================================================

        // No tool requests: the text is the answer and the history is left alone
        (TurnState::AwaitingModel { .. }, Event::ModelResponded { content, tool_calls })
            if tool_calls.is_empty() =>
        {
            let answer = text_content(&content);
            Ok(TransitionResult::new(TurnState::Done {
                answer: answer.clone(),
            })
            .with_effect(Effect::emit(StepEvent::final_answer(answer))))
        }

        // Tool requests on the last permitted round can never be followed by an answer
        (TurnState::AwaitingModel { round }, Event::ModelResponded { .. })
            if *round >= context.max_rounds =>
        {
            Ok(TransitionResult::new(TurnState::Failed {
                reason: FailureReason::MaxRoundsExceeded {
                    max_rounds: context.max_rounds,
                },
            }))
        }

        (TurnState::AwaitingModel { round }, Event::ModelResponded { content, tool_calls }) => {
            let decision = Effect::emit(StepEvent::tool_decision(&tool_calls));
            let dispatch = if context.parallel_tools {
                Effect::ExecuteTools {
                    tools: tool_calls.clone(),
                }
            } else {
                Effect::execute_tool(tool_calls[0].clone())
            };

            Ok(TransitionResult::new(TurnState::DispatchingTools {
                round: *round,
                assistant: content,
                requested: tool_calls,
                completed: vec![],
            })
            .with_effect(decision)
            .with_effect(dispatch))
        }

        (TurnState::AwaitingModel { .. }, Event::ModelFailed { error }) => {
            Ok(TransitionResult::new(TurnState::Failed {
                reason: FailureReason::Model {
                    message: error.message,
                    kind: error.kind,
                },
            }))
        }

        // ============================================================
        // Tool completion
        // ============================================================
        (
            TurnState::DispatchingTools {
                round,
                assistant,
                requested,
                completed,
            },
            Event::ToolCompleted { result },
        ) => {
            if !requested.iter().any(|call| call.id == result.call_id) {
                return Err(TransitionError::UnexpectedToolResult(result.call_id));
            }
            if completed.iter().any(|done| done.call_id == result.call_id) {
                return Err(TransitionError::DuplicateToolResult(result.call_id));
            }

            let step = Effect::emit(StepEvent::tool_execution(&result));
            let mut completed = completed.clone();
            completed.push(result);

            if completed.len() < requested.len() {
                let mut next = TransitionResult::new(TurnState::DispatchingTools {
                    round: *round,
                    assistant: assistant.clone(),
                    requested: requested.clone(),
                    completed: completed.clone(),
                })
                .with_effect(step);

                // Batches dispatch everything up front
                if !context.parallel_tools {
                    next = next.with_effect(Effect::execute_tool(requested[completed.len()].clone()));
                }
                return Ok(next);
            }

            let results = order_by_request(requested, &completed);
            Ok(TransitionResult::new(TurnState::AwaitingModel { round: round + 1 }).with_effects([
                step,
                Effect::append(vec![
                    LlmMessage::assistant(assistant.clone()),
                    LlmMessage::user(results.iter().map(ToolResult::to_content_block).collect()),
                ]),
                Effect::InvokeModel,
            ]))
        }

        // ============================================================
        // Everything else
        // ============================================================
        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {state:?} with event {event:?}"
        ))),
    }
}

/// Results in the order their calls were requested, whatever order they arrived in
fn order_by_request(requested: &[ToolCall], completed: &[ToolResult]) -> Vec<ToolResult> {
    requested
        .iter()
        .filter_map(|call| completed.iter().find(|r| r.call_id == call.id).cloned())
        .collect()
}
