use std::sync::Arc;

use serde_json::json;

use chatflow_core::{
    ChatModel, ChatflowError, LlmParams, LlmRequest, Message, Role, Tool, ToolSpec,
};
use chatflow_graph::{GraphContext, GraphState, NodeOutput, StateUpdate, StepNode};

use crate::config::{LlmNodeConfig, NodeConfig};
use crate::error::EngineError;
use crate::model::GraphNodeDef;
use crate::state::{ChatDelta, ChatState};
use crate::tracker::ExecutionTracker;

use super::{HandlerDeps, NodeHandler};

/// Merges a node's configuration over the engine-wide defaults. Pure data:
/// the provider client itself is constructed once per engine, not per
/// invocation.
pub fn llm_params(config: &LlmNodeConfig, defaults: &LlmParams) -> LlmParams {
    LlmParams {
        model: if config.model == "default" {
            defaults.model.clone()
        } else {
            config.model.clone()
        },
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        top_p: config.top_p,
        frequency_penalty: config.frequency_penalty,
        presence_penalty: config.presence_penalty,
    }
}

pub struct LlmHandler {
    deps: HandlerDeps,
}

impl LlmHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait::async_trait]
impl NodeHandler for LlmHandler {
    async fn create_step(
        &self,
        node: &GraphNodeDef,
    ) -> Result<Box<dyn StepNode<ChatState>>, EngineError> {
        let resolved = self.deps.resolver.resolve(node);
        let config = match resolved.config {
            NodeConfig::Llm(config) => config,
            _ => LlmNodeConfig::default(),
        };
        let tools = self.deps.tools.resolve(&node.node_id).await?;
        Ok(Box::new(LlmStep {
            node_id: node.node_id.clone(),
            params: llm_params(&config, &self.deps.llm_defaults),
            system_prompt: config.system_prompt,
            tools,
            llm: Arc::clone(&self.deps.llm),
            tracker: Arc::clone(&self.deps.tracker),
        }))
    }
}

struct LlmStep {
    node_id: String,
    params: LlmParams,
    system_prompt: String,
    tools: Vec<Arc<dyn Tool>>,
    llm: Arc<dyn ChatModel>,
    tracker: Arc<ExecutionTracker>,
}

impl LlmStep {
    /// Node system prompt goes first, exactly once. If the state already
    /// leads with a system message it is replaced rather than doubled.
    fn prepare_messages(&self, state: &ChatState) -> Vec<Message> {
        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::system(self.system_prompt.clone()));
        let skip_leading = matches!(
            state.messages.first(),
            Some(message) if message.role == Role::System
        );
        let offset = usize::from(skip_leading);
        messages.extend_from_slice(&state.messages[offset.min(state.messages.len())..]);
        messages
    }

    fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.schema(),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl StepNode<ChatState> for LlmStep {
    async fn run(
        &self,
        state: GraphState<ChatState>,
        _context: &GraphContext,
    ) -> Result<NodeOutput<ChatState>, ChatflowError> {
        let record = self
            .tracker
            .node_running(
                state.data.execution_id,
                &self.node_id,
                Some(json!({ "message_count": state.data.messages.len() })),
            )
            .await;

        let messages = self.prepare_messages(&state.data);
        let input_tokens = messages.iter().map(|m| m.content.len() as u64).sum();
        let request = LlmRequest {
            params: self.params.clone(),
            messages,
            tools: self.tool_specs(),
        };

        match self.llm.invoke(request).await {
            Ok(response) => {
                let output_tokens = response.content.len() as u64;
                self.tracker
                    .node_completed(
                        record,
                        Some(json!({
                            "content_length": response.content.len(),
                            "tool_calls": response.tool_calls.len(),
                        })),
                        input_tokens,
                        output_tokens,
                    )
                    .await;
                Ok(NodeOutput::Update(StateUpdate::new(ChatDelta::messages(
                    vec![response.into_message()],
                ))))
            }
            Err(err) => {
                let message = format!("LLM node execution failed: {err}");
                tracing::error!(node_id = %self.node_id, error = %err, "llm invocation failed");
                self.tracker.node_failed(record, &message).await;
                Ok(NodeOutput::Update(StateUpdate::new(ChatDelta::error(
                    message,
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_merge_uses_default_model_from_engine() {
        let config = LlmNodeConfig::default();
        let defaults = LlmParams {
            model: "claude-x".to_string(),
            ..LlmParams::default()
        };
        let merged = llm_params(&config, &defaults);
        assert_eq!(merged.model, "claude-x");
        assert_eq!(merged.temperature, 0.7);
    }

    #[test]
    fn params_merge_keeps_node_override() {
        let config = LlmNodeConfig {
            model: "small-model".to_string(),
            temperature: 0.1,
            ..LlmNodeConfig::default()
        };
        let merged = llm_params(&config, &LlmParams::default());
        assert_eq!(merged.model, "small-model");
        assert_eq!(merged.temperature, 0.1);
    }
}
