use serde::{Deserialize, Serialize};

use crate::{ChatflowError, Message, ToolCall, ToolSpec};

/// Sampling parameters for one model invocation. Kept as plain data so a
/// node's configuration can be merged over global defaults without touching
/// the provider client itself.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LlmParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for LlmParams {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LlmRequest {
    pub params: LlmParams,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl LlmResponse {
    pub fn into_message(self) -> Message {
        Message {
            role: crate::Role::Assistant,
            content: self.content,
            name: None,
            tool_call_id: None,
            tool_calls: self.tool_calls,
        }
    }
}

/// Provider seam. One client is constructed per engine (not per node
/// invocation); per-node parameter overrides travel in the request.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, ChatflowError>;
}
