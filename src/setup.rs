//! Building a ready agent from configuration

use crate::config::{AgentConfig, AgentSettings};
use crate::llm::{EmbeddingService, LlmError, LlmService, LoggingService, OpenAIEmbeddings, OpenAIService};
use crate::runtime::{TurnOptions, TurnRuntime};
use crate::system_prompt::build_system_prompt;
use crate::tools::{
    resolve_corpus_path, AdverseEventsTool, DocumentIndex, DocumentSearchTool, GraphQa, GraphStore,
    KnowledgeGraphTool, Neo4jHttpGraph, OpenFdaClient, RegistryError, ToolError, ToolRegistry,
    DEFAULT_CORPUS_CANDIDATES, MANIFEST,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("LLM client: {0}")]
    Llm(#[from] LlmError),
    #[error("Tool registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("Tool setup: {0}")]
    Tool(#[from] ToolError),
}

/// Everything one initialized session needs to answer questions
pub struct ReadyAgent {
    pub runtime: Arc<TurnRuntime>,
    pub registry: Arc<ToolRegistry>,
    graph: Option<Arc<dyn GraphStore>>,
}

impl ReadyAgent {
    pub fn new(runtime: Arc<TurnRuntime>, registry: Arc<ToolRegistry>, graph: Option<Arc<dyn GraphStore>>) -> Self {
        Self {
            runtime,
            registry,
            graph,
        }
    }

    /// Release external connections
    pub async fn close(&self) {
        if let Some(graph) = &self.graph {
            graph.close().await;
        }
    }
}

/// Builds a [`ReadyAgent`]. Swapped out in tests to avoid the network.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn build(&self, config: &AgentConfig) -> Result<ReadyAgent, SetupError>;
}

/// Production factory: `OpenAI` for chat and embeddings, openFDA, Neo4j and the report PDF
pub struct DefaultAgentFactory {
    settings: AgentSettings,
}

impl DefaultAgentFactory {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    /// Graph tool, degraded to an uninitialized tool when the graph is unreachable
    async fn graph_tool(
        &self,
        config: &AgentConfig,
        llm: Arc<dyn LlmService>,
    ) -> (KnowledgeGraphTool, Option<Arc<dyn GraphStore>>) {
        let connected = Neo4jHttpGraph::connect(
            &config.graph_db_uri,
            &config.graph_db_username,
            &config.graph_db_password,
            &self.settings.neo4j_database,
        )
        .await;

        let graph: Arc<dyn GraphStore> = match connected {
            Ok(graph) => Arc::new(graph),
            Err(e) => {
                tracing::warn!(error = %e, uri = %config.graph_db_uri, "Neo4j initialization failed");
                return (KnowledgeGraphTool::uninitialized(), None);
            }
        };

        match GraphQa::new(llm, graph.clone()).await {
            Ok(qa) => (KnowledgeGraphTool::new(qa), Some(graph)),
            Err(e) => {
                tracing::warn!(error = %e, "Graph schema introspection failed");
                graph.close().await;
                (KnowledgeGraphTool::uninitialized(), None)
            }
        }
    }

    /// Document tool, degraded to an uninitialized tool when the corpus cannot be indexed
    async fn document_tool(&self, api_key: &str, llm: Arc<dyn LlmService>) -> Result<DocumentSearchTool, SetupError> {
        let embedder: Arc<dyn EmbeddingService> =
            Arc::new(OpenAIEmbeddings::new(api_key.to_string(), &self.settings.openai_base_url)?);

        let Some(path) = resolve_corpus_path(self.settings.pdf_path.as_deref(), &DEFAULT_CORPUS_CANDIDATES) else {
            tracing::warn!(tried = ?DEFAULT_CORPUS_CANDIDATES, "PDF file not found in any expected location");
            return Ok(DocumentSearchTool::uninitialized());
        };

        match DocumentIndex::from_pdf(&path, embedder.as_ref()).await {
            Ok(index) => Ok(DocumentSearchTool::new(Arc::new(index), embedder, llm)),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "PDF vector store initialization failed");
                Ok(DocumentSearchTool::uninitialized())
            }
        }
    }
}

#[async_trait]
impl AgentFactory for DefaultAgentFactory {
    async fn build(&self, config: &AgentConfig) -> Result<ReadyAgent, SetupError> {
        let openai = OpenAIService::new(
            config.llm_api_key.clone(),
            self.settings.model.clone(),
            &self.settings.openai_base_url,
        )?;
        let llm: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(openai)));

        let fda = AdverseEventsTool::new(OpenFdaClient::new(&self.settings.openfda_base_url)?);
        let (graph_tool, graph) = self.graph_tool(config, llm.clone()).await;
        let document_tool = self.document_tool(&config.llm_api_key, llm.clone()).await?;

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(fda))?;
        registry.register(Arc::new(graph_tool))?;
        registry.register(Arc::new(document_tool))?;
        registry.validate(&MANIFEST)?;
        let registry = Arc::new(registry);

        let system_prompt = build_system_prompt(&registry.definitions());
        let runtime = TurnRuntime::new(
            llm,
            registry.clone(),
            system_prompt,
            TurnOptions {
                max_rounds: self.settings.max_rounds,
                parallel_tools: self.settings.parallel_tools,
            },
        );

        tracing::info!(
            model = %self.settings.model,
            tools = ?registry.names(),
            graph_connected = graph.is_some(),
            "Agent initialized"
        );
        Ok(ReadyAgent::new(Arc::new(runtime), registry, graph))
    }
}
