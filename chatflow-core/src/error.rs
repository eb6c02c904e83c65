use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatflowError {
    #[error("LLM provider failed: {0}")]
    LlmProvider(String),
    #[error("Tool call failed for '{tool_name}': {reason}")]
    ToolCallFailed { tool_name: String, reason: String },
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
