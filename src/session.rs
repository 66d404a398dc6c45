//! Conversation session: lazy initialization, reset and the ask entry points

use crate::config::AgentConfig;
use crate::llm::ToolDefinition;
use crate::runtime::{failure_text, stream_turn, AgentError, StepStream};
use crate::setup::{AgentFactory, ReadyAgent};
use crate::state_machine::StepEvent;
use crate::tools::ToolRegistry;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Answer given when a question arrives before the agent can be built
pub const CONFIG_REQUIRED: &str = "Error: Agent not initialized. Please provide all configuration parameters.";

enum SessionState {
    Uninitialized,
    Ready(Arc<ReadyAgent>),
}

/// One agent session.
///
/// Initialization is idempotent: once ready, later configs are ignored until
/// [`Session::reset`].
pub struct Session {
    state: Mutex<SessionState>,
    factory: Arc<dyn AgentFactory>,
}

impl Session {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            state: Mutex::new(SessionState::Uninitialized),
            factory,
        }
    }

    /// Build the agent from `config` unless it is already built
    pub async fn initialize(&self, config: &AgentConfig) -> Result<(), AgentError> {
        self.ready(Some(config)).await.map(|_| ())
    }

    /// Drop the built agent and close its connections
    pub async fn reset(&self) {
        let previous = std::mem::replace(&mut *self.state.lock().await, SessionState::Uninitialized);
        if let SessionState::Ready(agent) = previous {
            agent.close().await;
            tracing::info!("Session reset");
        }
    }

    pub async fn is_initialized(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Ready(_))
    }

    /// Registry of the built agent
    pub async fn registry(&self) -> Option<Arc<ToolRegistry>> {
        match &*self.state.lock().await {
            SessionState::Ready(agent) => Some(agent.registry.clone()),
            SessionState::Uninitialized => None,
        }
    }

    /// Tools of the built agent, empty before initialization
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry()
            .await
            .map(|registry| registry.definitions())
            .unwrap_or_default()
    }

    /// Answer `question`, initializing from `config` first if needed.
    ///
    /// Never fails: every problem is rendered as answer text.
    pub async fn ask(&self, question: &str, config: Option<&AgentConfig>) -> String {
        let agent = match self.ready(config).await {
            Ok(agent) => agent,
            Err(AgentError::NotInitialized) => return CONFIG_REQUIRED.to_string(),
            Err(e) => return failure_text(&e),
        };

        let cancel = CancellationToken::new();
        let turn = agent.runtime.run_turn(question, None, &cancel);
        match AssertUnwindSafe(turn).catch_unwind().await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => failure_text(&e),
            Err(_) => {
                tracing::error!("Turn panicked");
                failure_text(&"internal error")
            }
        }
    }

    /// Like [`Session::ask`], publishing each step as it happens
    pub async fn ask_streaming(&self, question: &str, config: Option<&AgentConfig>) -> StepStream {
        match self.ready(config).await {
            Ok(agent) => stream_turn(agent.runtime.clone(), question.to_string()),
            Err(AgentError::NotInitialized) => StepStream::single(StepEvent::error(CONFIG_REQUIRED)),
            Err(e) => StepStream::single(StepEvent::error(failure_text(&e))),
        }
    }

    async fn ready(&self, config: Option<&AgentConfig>) -> Result<Arc<ReadyAgent>, AgentError> {
        let mut state = self.state.lock().await;
        if let SessionState::Ready(agent) = &*state {
            return Ok(agent.clone());
        }

        let Some(config) = config.filter(|c| c.is_complete()) else {
            return Err(AgentError::NotInitialized);
        };

        let agent = self
            .factory
            .build(&config.trimmed())
            .await
            .map_err(|e| AgentError::Setup(e.to_string()))?;
        let agent = Arc::new(agent);
        *state = SessionState::Ready(agent.clone());
        Ok(agent)
    }
}
