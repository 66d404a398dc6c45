//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::llm::ToolDefinition;
use crate::tools::{ToolContext, ToolOutput, ToolRegistry, UnknownToolError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Executor for tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a tool by name
    async fn execute(
        &self,
        name: &str,
        input: Value,
        ctx: ToolContext,
    ) -> Result<ToolOutput, UnknownToolError>;

    /// Get tool definitions for LLM
    fn definitions(&self) -> Vec<ToolDefinition>;
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(
        &self,
        name: &str,
        input: Value,
        ctx: ToolContext,
    ) -> Result<ToolOutput, UnknownToolError> {
        self.dispatch(name, input, ctx).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        ToolRegistry::definitions(self)
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(
        &self,
        name: &str,
        input: Value,
        ctx: ToolContext,
    ) -> Result<ToolOutput, UnknownToolError> {
        (**self).execute(name, input, ctx).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }
}
