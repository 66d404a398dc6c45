//! API request and response types

use crate::config::AgentConfig;
use crate::llm::ToolDefinition;
use serde::{Deserialize, Serialize};

/// Request to ask a question, optionally carrying the config to initialize with
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub config: Option<AgentConfig>,
}

/// Response with the final answer or rendered error
#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

/// Response for configure and status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub initialized: bool,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Response for tool listing
#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDefinition>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
