//! Property-based tests for the turn state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use super::*;
use crate::llm::{ContentBlock, LlmError, MessageRole};
use crate::tools::MANIFEST;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context(max_rounds: u32, parallel: bool) -> TurnContext {
    TurnContext::new("test-turn")
        .with_max_rounds(max_rounds)
        .with_parallel_tools(parallel)
}

fn request_calls(calls: Vec<ToolCall>) -> Event {
    let content = calls
        .iter()
        .map(|c| ContentBlock::tool_use(c.id.clone(), c.name.clone(), c.input.clone()))
        .collect();
    Event::ModelResponded {
        content,
        tool_calls: calls,
    }
}

fn appended_result_ids(effects: &[Effect]) -> Option<Vec<String>> {
    effects.iter().find_map(|effect| match effect {
        Effect::AppendHistory { messages } => messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| {
                m.content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
                        _ => None,
                    })
                    .collect()
            }),
        _ => None,
    })
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_tool_name() -> impl Strategy<Value = String> {
    prop::sample::select(MANIFEST.to_vec()).prop_map(str::to_string)
}

/// Batches of calls with distinct ids
fn arb_tool_batch() -> impl Strategy<Value = Vec<ToolCall>> {
    proptest::collection::vec(arb_tool_name(), 1..6).prop_map(|names| {
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| ToolCall::new(format!("call_{i}"), name, json!({"question": "q"})))
            .collect()
    })
}

/// A batch together with a shuffled completion order
fn arb_batch_and_order() -> impl Strategy<Value = (Vec<ToolCall>, Vec<usize>)> {
    arb_tool_batch().prop_flat_map(|batch| {
        let order: Vec<usize> = (0..batch.len()).collect();
        (Just(batch), Just(order).prop_shuffle())
    })
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-z ]{1,20}".prop_map(|text| Event::UserQuestion { text }),
        "[a-z ]{0,20}".prop_map(|text| Event::ModelResponded {
            content: vec![ContentBlock::text(text)],
            tool_calls: vec![],
        }),
        arb_tool_batch().prop_map(request_calls),
        "[a-z ]{1,20}".prop_map(|m| Event::ModelFailed {
            error: LlmError::server_error(m)
        }),
        ("call_[0-5]", any::<bool>()).prop_map(|(id, ok)| Event::ToolCompleted {
            result: if ok {
                ToolResult::success(id, "ok")
            } else {
                ToolResult::error(id, "Error: failed")
            },
        }),
    ]
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Results are appended in request order regardless of arrival order
    #[test]
    fn prop_results_follow_request_order((batch, order) in arb_batch_and_order()) {
        let ctx = test_context(10, true);
        let mut state = transition(&TurnState::AwaitingModel { round: 1 }, &ctx, request_calls(batch.clone()))
            .unwrap()
            .new_state;

        let mut last_effects = vec![];
        for index in order {
            let result = transition(&state, &ctx, Event::ToolCompleted {
                result: ToolResult::success(batch[index].id.clone(), "out"),
            }).unwrap();
            state = result.new_state;
            last_effects = result.effects;
        }

        prop_assert_eq!(state, TurnState::AwaitingModel { round: 2 });
        let expected: Vec<String> = batch.iter().map(|c| c.id.clone()).collect();
        prop_assert_eq!(appended_result_ids(&last_effects), Some(expected));
    }

    // Generated calls only name registered tools
    #[test]
    fn prop_batches_use_manifest_names(batch in arb_tool_batch()) {
        for call in &batch {
            prop_assert!(MANIFEST.contains(&call.name.as_str()));
        }
    }

    // Sequential mode dispatches exactly one tool per effect list, in request order
    #[test]
    fn prop_sequential_dispatch_in_order(batch in arb_tool_batch()) {
        let ctx = test_context(10, false);
        let mut result = transition(&TurnState::AwaitingModel { round: 1 }, &ctx, request_calls(batch.clone())).unwrap();

        for call in &batch {
            let dispatched: Vec<_> = result.effects.iter().filter_map(|e| match e {
                Effect::ExecuteTool { tool } => Some(tool.id.clone()),
                _ => None,
            }).collect();
            prop_assert_eq!(dispatched, vec![call.id.clone()]);

            result = transition(&result.new_state, &ctx, Event::ToolCompleted {
                result: ToolResult::success(call.id.clone(), "out"),
            }).unwrap();
        }

        prop_assert!(matches!(result.effects.last(), Some(Effect::InvokeModel)));
    }

    // A model that never stops requesting tools is cut off after max_rounds invocations
    #[test]
    fn prop_round_cap_terminates(max_rounds in 1u32..8, batch in arb_tool_batch()) {
        let ctx = test_context(max_rounds, true);
        let mut state = transition(&TurnState::Idle, &ctx, Event::UserQuestion { text: "q".to_string() })
            .unwrap()
            .new_state;

        let mut invocations = 0u32;
        while !state.is_terminal() {
            invocations += 1;
            prop_assert!(invocations <= max_rounds);
            state = transition(&state, &ctx, request_calls(batch.clone())).unwrap().new_state;
            for call in &batch {
                if state.is_terminal() {
                    break;
                }
                state = transition(&state, &ctx, Event::ToolCompleted {
                    result: ToolResult::success(call.id.clone(), "out"),
                }).unwrap().new_state;
            }
        }

        prop_assert_eq!(invocations, max_rounds);
        prop_assert_eq!(state, TurnState::Failed {
            reason: FailureReason::MaxRoundsExceeded { max_rounds },
        });
    }

    // Terminal states never transition again, and at most one final-answer step is ever emitted
    #[test]
    fn prop_terminal_is_absorbing(events in proptest::collection::vec(arb_event(), 0..25), parallel in any::<bool>()) {
        let ctx = test_context(4, parallel);
        let mut state = TurnState::Idle;
        let mut final_steps = 0;

        for event in events {
            let was_terminal = state.is_terminal();
            match transition(&state, &ctx, event) {
                Ok(result) => {
                    prop_assert!(!was_terminal, "left terminal state {:?}", state);
                    final_steps += result.effects.iter().filter(|e| matches!(
                        e,
                        Effect::EmitStep { step } if step.is_final
                    )).count();
                    state = result.new_state;
                }
                Err(_) => { /* Invalid transition is OK */ }
            }
        }

        prop_assert!(final_steps <= 1);
        if final_steps == 1 {
            prop_assert!(matches!(state, TurnState::Done { .. }), "final step without Done: {:?}", state);
        }
    }
}
