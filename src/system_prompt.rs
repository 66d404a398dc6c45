//! System prompt construction from the tool manifest

use crate::llm::ToolDefinition;
use std::fmt::Write;

/// Opening of the system prompt establishing the agent's role
const BASE_PROMPT: &str = "You are a helpful AI assistant for pharmaceutical research with access to specialized tools:";

const GUIDANCE: &str = "When a user asks a question, think about which tool(s) would be most helpful to answer it.
You can use multiple tools if needed to provide a comprehensive answer.

Always provide clear, helpful responses and explain what information you found.";

/// Build the system prompt listing each tool in manifest order
pub fn build_system_prompt(tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(BASE_PROMPT);
    prompt.push_str("\n\n");
    for (i, tool) in tools.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}: {}", i + 1, tool.name, tool.description);
    }
    prompt.push('\n');
    prompt.push_str(GUIDANCE);
    prompt
}
