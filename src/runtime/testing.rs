//! Mock implementations for testing
//!
//! These mocks enable turn-level testing without real I/O.

use super::traits::ToolExecutor;
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService, ToolDefinition};
use crate::tools::{ToolContext, ToolOutput, UnknownToolError, MANIFEST};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock LLM Service
// ============================================================================

/// Mock LLM service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    delay: Option<Duration>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Tool Executor
// ============================================================================

/// Mock executor knowing the manifest tools.
///
/// Unconfigured manifest tools succeed with `"<name> ok"`; other names are unknown.
#[derive(Default)]
pub struct MockToolExecutor {
    outputs: Mutex<HashMap<String, ToolOutput>>,
    /// Record of completed tool executions
    executions: Mutex<Vec<(String, Value)>>,
    delay: Option<Duration>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before completing each execution
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_output(&self, name: &str, output: &str) {
        self.outputs
            .lock()
            .unwrap()
            .insert(name.to_string(), ToolOutput::success(output));
    }

    pub fn set_error(&self, name: &str, message: &str) {
        self.outputs
            .lock()
            .unwrap()
            .insert(name.to_string(), ToolOutput::error(message));
    }

    /// Get recorded executions
    pub fn executed(&self) -> Vec<(String, Value)> {
        self.executions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(
        &self,
        name: &str,
        input: Value,
        _ctx: ToolContext,
    ) -> Result<ToolOutput, UnknownToolError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.executions.lock().unwrap().push((name.to_string(), input));
        if let Some(output) = self.outputs.lock().unwrap().get(name) {
            return Ok(output.clone());
        }
        if MANIFEST.contains(&name) {
            return Ok(ToolOutput::success(format!("{name} ok")));
        }
        Err(UnknownToolError(name.to_string()))
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        MANIFEST
            .iter()
            .map(|name| ToolDefinition {
                name: (*name).to_string(),
                description: format!("Mock {name}"),
                input_schema: serde_json::json!({ "type": "object", "properties": {} }),
            })
            .collect()
    }
}
