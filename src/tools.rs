//! Tool implementations for the pharma assistant

mod adverse_events;
mod document_search;
mod knowledge_graph;

pub use adverse_events::{AdverseEventsTool, OpenFdaClient, DEFAULT_OPENFDA_BASE_URL};
pub use document_search::{resolve_corpus_path, DocumentIndex, DocumentSearchTool, DEFAULT_CORPUS_CANDIDATES};
pub use knowledge_graph::{GraphQa, GraphStore, KnowledgeGraphTool, Neo4jHttpGraph, DEFAULT_DATABASE};

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::llm::ToolDefinition;

pub const FDA_TOOL_NAME: &str = "fda_adverse_events_tool";
pub const GRAPH_TOOL_NAME: &str = "neo4j_query_tool";
pub const PDF_TOOL_NAME: &str = "pdf_search_tool";

/// Names every agent registry must provide, in manifest order
pub const MANIFEST: [&str; 3] = [FDA_TOOL_NAME, GRAPH_TOOL_NAME, PDF_TOOL_NAME];

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }
}

/// Failures inside a tool. Never leaves the tool: each one renders to a [`ToolOutput::error`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} returned HTTP {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Model call failed: {0}")]
    Model(#[from] crate::llm::LlmError),
    #[error("Document error: {0}")]
    Document(String),
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tool not found: {0}")]
pub struct UnknownToolError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    Duplicate(String),
    #[error("Manifest declares {0} but no implementation is registered")]
    MissingImplementation(String),
    #[error("Tool {0} is registered but not declared in the manifest")]
    Undeclared(String),
}

/// Context passed to every tool invocation
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Cancelled when the turn's consumer goes away; dispatch stops waiting on the tool
    pub cancel: CancellationToken,
    /// Turn the call belongs to, for log correlation
    pub turn_id: String,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, turn_id: impl Into<String>) -> Self {
        Self {
            cancel,
            turn_id: turn_id.into(),
        }
    }
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput;
}

/// Collection of tools available to an agent, keyed by name
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        if self.get(tool.name()).is_some() {
            return Err(RegistryError::Duplicate(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Check that registered tools and `manifest` name exactly the same set
    pub fn validate(&self, manifest: &[&str]) -> Result<(), RegistryError> {
        if let Some(missing) = manifest.iter().find(|name| self.get(name).is_none()) {
            return Err(RegistryError::MissingImplementation((*missing).to_string()));
        }
        if let Some(extra) = self.tools.iter().find(|t| !manifest.contains(&t.name())) {
            return Err(RegistryError::Undeclared(extra.name().to_string()));
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Get all tool definitions for LLM, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name.
    ///
    /// A panicking tool is reported as an error output like any other tool failure.
    pub async fn dispatch(
        &self,
        name: &str,
        input: Value,
        ctx: ToolContext,
    ) -> Result<ToolOutput, UnknownToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| UnknownToolError(name.to_string()))?;

        let cancel = ctx.cancel.clone();
        let turn_id = ctx.turn_id.clone();
        let run = AssertUnwindSafe(tool.run(input, ctx)).catch_unwind();

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::info!(tool = %name, turn_id = %turn_id, "Tool cancelled");
                Ok(ToolOutput::error(format!("Error: tool {name} cancelled")))
            }

            outcome = run => match outcome {
                Ok(output) => Ok(output),
                Err(_) => {
                    tracing::error!(tool = %name, turn_id = %turn_id, "Tool panicked");
                    Ok(ToolOutput::error(format!("Error: tool {name} failed unexpectedly")))
                }
            },
        }
    }
}

/// Deserialize tool input, mapping failures to [`ToolError::InvalidInput`]
pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}
