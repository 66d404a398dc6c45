//! Turn executor
//!
//! Drives the pure transition function, performing each effect it returns
//! and feeding the resulting events back in until the turn is terminal.

use super::traits::ToolExecutor;
use super::AgentError;

use crate::llm::{LlmMessage, LlmRequest, LlmService, SystemContent, ToolDefinition};
use crate::state_machine::{
    transition, Effect, Event, StepEvent, ToolCall, ToolResult, TransitionError, TurnContext, TurnState,
    DEFAULT_MAX_ROUNDS,
};
use crate::tools::ToolContext;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Per-turn knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOptions {
    pub max_rounds: u32,
    pub parallel_tools: bool,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            parallel_tools: false,
        }
    }
}

/// Runs turns against one model and one set of tools
pub struct TurnRuntime {
    llm: Arc<dyn LlmService>,
    tools: Arc<dyn ToolExecutor>,
    system_prompt: String,
    options: TurnOptions,
}

impl TurnRuntime {
    pub fn new(
        llm: Arc<dyn LlmService>,
        tools: Arc<dyn ToolExecutor>,
        system_prompt: impl Into<String>,
        options: TurnOptions,
    ) -> Self {
        Self {
            llm,
            tools,
            system_prompt: system_prompt.into(),
            options,
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    /// Run one turn to completion and return the final answer.
    ///
    /// Steps are published to `steps` when given. A closed receiver cancels the turn.
    pub async fn run_turn(
        &self,
        question: &str,
        steps: Option<&mpsc::Sender<StepEvent>>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let context = TurnContext::new(turn_id.clone())
            .with_max_rounds(self.options.max_rounds)
            .with_parallel_tools(self.options.parallel_tools);

        self.drive(question, &context, steps, cancel)
            .instrument(tracing::info_span!("turn", turn_id = %turn_id))
            .await
    }

    async fn drive(
        &self,
        question: &str,
        context: &TurnContext,
        steps: Option<&mpsc::Sender<StepEvent>>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let start = Instant::now();
        let mut state = TurnState::Idle;
        let mut history: Vec<LlmMessage> = Vec::new();
        let mut pending = VecDeque::from([Event::UserQuestion {
            text: question.to_string(),
        }]);

        tracing::info!(max_rounds = context.max_rounds, "Turn started");

        while let Some(event) = pending.pop_front() {
            if cancel.is_cancelled() {
                tracing::info!("Turn cancelled");
                return Err(AgentError::Cancelled);
            }

            let result = transition(&state, context, event)?;
            state = result.new_state;

            for effect in result.effects {
                let events = self
                    .execute_effect(effect, &state, &mut history, context, steps, cancel)
                    .await?;
                pending.extend(events);
            }
        }

        let outcome = match state {
            TurnState::Done { answer } => Ok(answer),
            TurnState::Failed { reason } => Err(AgentError::from(reason)),
            other => Err(TransitionError::InvalidTransition(format!("Turn stalled in {other:?}")).into()),
        };

        match &outcome {
            Ok(_) => tracing::info!(duration_ms = %start.elapsed().as_millis(), "Turn completed"),
            Err(e) => tracing::warn!(duration_ms = %start.elapsed().as_millis(), error = %e, "Turn failed"),
        }
        outcome
    }

    async fn execute_effect(
        &self,
        effect: Effect,
        state: &TurnState,
        history: &mut Vec<LlmMessage>,
        context: &TurnContext,
        steps: Option<&mpsc::Sender<StepEvent>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>, AgentError> {
        match effect {
            Effect::AppendHistory { messages } => {
                history.extend(messages);
                Ok(vec![])
            }

            Effect::InvokeModel => {
                let round = match state {
                    TurnState::AwaitingModel { round } => *round,
                    _ => 0,
                };
                tracing::debug!(round, messages = history.len(), "Invoking model");

                let request = LlmRequest {
                    system: vec![SystemContent::new(&self.system_prompt)],
                    messages: history.clone(),
                    tools: self.tools.definitions(),
                    max_tokens: None,
                };

                tokio::select! {
                    biased;

                    () = cancel.cancelled() => Err(AgentError::Cancelled),

                    result = self.llm.complete(&request) => Ok(vec![match result {
                        Ok(response) => Event::from_response(response),
                        Err(error) => Event::ModelFailed { error },
                    }]),
                }
            }

            Effect::ExecuteTool { tool } => {
                let result = self.dispatch(tool, context, cancel).await;
                Ok(vec![Event::ToolCompleted { result }])
            }

            Effect::ExecuteTools { tools } => {
                // join_all keeps request order
                let results = join_all(tools.into_iter().map(|tool| self.dispatch(tool, context, cancel))).await;
                Ok(results
                    .into_iter()
                    .map(|result| Event::ToolCompleted { result })
                    .collect())
            }

            Effect::EmitStep { step } => {
                if let Some(tx) = steps {
                    if tx.send(step).await.is_err() {
                        tracing::info!("Step consumer dropped, cancelling turn");
                        cancel.cancel();
                        return Err(AgentError::Cancelled);
                    }
                }
                Ok(vec![])
            }
        }
    }

    async fn dispatch(&self, call: ToolCall, context: &TurnContext, cancel: &CancellationToken) -> ToolResult {
        let start = Instant::now();
        let ctx = ToolContext::new(cancel.child_token(), context.turn_id.clone());

        let result = tokio::select! {
            biased;

            () = cancel.cancelled() => ToolResult::error(&call.id, format!("Error: tool {} cancelled", call.name)),

            executed = self.tools.execute(&call.name, call.input, ctx) => match executed {
                Ok(output) if output.success => ToolResult::success(&call.id, output.output),
                Ok(output) => ToolResult::error(&call.id, output.output),
                Err(unknown) => ToolResult::error(&call.id, format!("Error: {unknown}")),
            },
        };

        tracing::info!(
            tool = %call.name,
            call_id = %call.id,
            success = !result.is_error,
            duration_ms = %start.elapsed().as_millis(),
            "Tool dispatched"
        );
        result
    }
}
