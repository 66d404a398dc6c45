//! LLM provider abstraction
//!
//! Provides a common interface for chat completions and embeddings.

mod embeddings;
mod error;
mod openai;
mod types;

pub use embeddings::{EmbeddingService, OpenAIEmbeddings};
pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAIService;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Default chat model for the agent and the tool pipelines
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    tool_calls = response.tool_uses().len(),
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Ask a model a single tool-less question and return its text.
///
/// Used by the graph and document pipelines to synthesize answers.
pub async fn complete_text(llm: &dyn LlmService, prompt: String) -> Result<String, LlmError> {
    let request = LlmRequest {
        system: vec![],
        messages: vec![LlmMessage::user(vec![ContentBlock::text(prompt)])],
        tools: vec![],
        max_tokens: None,
    };
    Ok(llm.complete(&request).await?.text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::MockLlmService;

    #[tokio::test]
    async fn test_complete_text_sends_bare_prompt() {
        let llm = MockLlmService::new("mock");
        llm.queue_response(LlmResponse::text_only("MATCH (d:Drug) RETURN d"));

        let text = complete_text(&llm, "Write Cypher".to_string()).await.unwrap();
        assert_eq!(text, "MATCH (d:Drug) RETURN d");

        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.is_empty());
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[0].messages.len(), 1);
    }
}
