use std::sync::Arc;

use serde_json::json;

use chatflow_core::{ChatflowError, Message, Value};
use chatflow_graph::{GraphContext, GraphState, NodeOutput, StateUpdate, StepNode};

use crate::config::{HumanNodeConfig, NodeConfig};
use crate::error::EngineError;
use crate::model::GraphNodeDef;
use crate::state::{ChatDelta, ChatState};
use crate::tracker::ExecutionTracker;

use super::{HandlerDeps, NodeHandler};

pub struct HumanHandler {
    deps: HandlerDeps,
}

impl HumanHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait::async_trait]
impl NodeHandler for HumanHandler {
    async fn create_step(
        &self,
        node: &GraphNodeDef,
    ) -> Result<Box<dyn StepNode<ChatState>>, EngineError> {
        let resolved = self.deps.resolver.resolve(node);
        let config = match resolved.config {
            NodeConfig::Human(config) => config,
            _ => HumanNodeConfig::default(),
        };
        Ok(Box::new(HumanStep {
            node_id: node.node_id.clone(),
            config,
            tracker: Arc::clone(&self.deps.tracker),
        }))
    }
}

struct HumanStep {
    node_id: String,
    config: HumanNodeConfig,
    tracker: Arc<ExecutionTracker>,
}

impl HumanStep {
    fn render_prompt(&self, state: &ChatState) -> String {
        let context = extract_context(state, &self.node_id);
        self.config
            .prompt_template
            .replace("{query}", &context)
            .replace("{session_id}", &state.session_id)
            .replace("{execution_id}", &state.execution_id.to_string())
    }
}

/// Summary of where the run stands, substituted into the prompt template.
fn extract_context(state: &ChatState, node_id: &str) -> String {
    let mut parts = Vec::new();
    if let Some(last) = state.last_message() {
        if !last.content.is_empty() {
            parts.push(format!("Last message: {}", last.content));
        }
    }
    parts.push(format!("Current node: {node_id}"));
    parts.join(" | ")
}

fn response_content(answer: &Value) -> String {
    answer
        .get("data")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| answer.as_str().map(str::to_string))
        .unwrap_or_else(|| answer.to_string())
}

#[async_trait::async_trait]
impl StepNode<ChatState> for HumanStep {
    async fn run(
        &self,
        state: GraphState<ChatState>,
        context: &GraphContext,
    ) -> Result<NodeOutput<ChatState>, ChatflowError> {
        match &context.resume {
            // Re-entered with the external answer: turn it into a message
            // and let the run continue from this exact step.
            Some(answer) => {
                let content = response_content(answer);
                let record = self
                    .tracker
                    .node_running(
                        state.data.execution_id,
                        &self.node_id,
                        Some(json!({ "resumed": true })),
                    )
                    .await;
                self.tracker
                    .node_completed(
                        record,
                        Some(json!({ "response_length": content.len() })),
                        0,
                        0,
                    )
                    .await;
                Ok(NodeOutput::Update(StateUpdate::new(ChatDelta::messages(
                    vec![Message::user(content)],
                ))))
            }
            // First entry: suspend the run and surface a structured
            // awaiting-input signal.
            None => {
                let prompt = self.render_prompt(&state.data);
                self.tracker
                    .node_running(
                        state.data.execution_id,
                        &self.node_id,
                        Some(json!({ "timeout_seconds": self.config.timeout_seconds })),
                    )
                    .await;
                tracing::info!(node_id = %self.node_id, "suspending run for human input");
                Ok(NodeOutput::Interrupt(json!({
                    "query": prompt,
                    "node_id": self.node_id,
                    "timeout_seconds": self.config.timeout_seconds,
                    "allow_attachments": self.config.allow_attachments,
                })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_content_prefers_data_field() {
        assert_eq!(response_content(&json!({"data": "hi"})), "hi");
        assert_eq!(response_content(&json!("raw")), "raw");
        assert_eq!(response_content(&json!(42)), "42");
    }
}
