//! Embedding provider used by the document retrieval pipeline

use super::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";

/// Inputs per embeddings request
const BATCH_SIZE: usize = 64;

/// Turns text into vectors
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed each input, returning one vector per input in the same order
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;
}

/// `OpenAI` embeddings endpoint client
pub struct OpenAIEmbeddings {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAIEmbeddings {
    pub fn new(api_key: String, base_url: &str) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: batch,
            })
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        let mut parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::unknown(format!("Failed to parse embeddings: {e}")))?;

        if parsed.data.len() != batch.len() {
            return Err(LlmError::unknown(format!(
                "Embeddings endpoint returned {} vectors for {} inputs",
                parsed.data.len(),
                batch.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingService for OpenAIEmbeddings {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
