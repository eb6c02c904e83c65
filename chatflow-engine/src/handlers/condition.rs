use std::sync::Arc;

use serde_json::json;

use chatflow_core::{ChatflowError, Message};
use chatflow_graph::{GraphContext, GraphState, NodeOutput, StateUpdate, StepNode};

use crate::config::{ConditionNodeConfig, EvaluationType, NodeConfig};
use crate::error::EngineError;
use crate::model::GraphNodeDef;
use crate::state::{ChatDelta, ChatState};
use crate::tracker::ExecutionTracker;

use super::{HandlerDeps, NodeHandler};

pub struct ConditionHandler {
    deps: HandlerDeps,
}

impl ConditionHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait::async_trait]
impl NodeHandler for ConditionHandler {
    async fn create_step(
        &self,
        node: &GraphNodeDef,
    ) -> Result<Box<dyn StepNode<ChatState>>, EngineError> {
        let resolved = self.deps.resolver.resolve(node);
        let config = match resolved.config {
            NodeConfig::Condition(config) => config,
            _ => ConditionNodeConfig::default(),
        };
        Ok(Box::new(ConditionStep {
            node_id: node.node_id.clone(),
            config,
            tracker: Arc::clone(&self.deps.tracker),
        }))
    }
}

struct ConditionStep {
    node_id: String,
    config: ConditionNodeConfig,
    tracker: Arc<ExecutionTracker>,
}

impl ConditionStep {
    fn evaluate(&self, state: &ChatState) -> String {
        match self.config.evaluation_type {
            EvaluationType::MessageContent => self.evaluate_message_content(state),
            EvaluationType::ToolResult => self.evaluate_tool_result(state),
            // Extension point; nothing registered means the default path.
            EvaluationType::Custom => self.config.default.clone(),
        }
    }

    /// Pending tool calls short-circuit to the "continue" key; otherwise
    /// the first configured key (insertion order) found in the message
    /// text wins, case-insensitively.
    fn evaluate_message_content(&self, state: &ChatState) -> String {
        let Some(last) = state.last_message() else {
            return self.config.default.clone();
        };
        if last.has_tool_calls() {
            return "continue".to_string();
        }
        if last.content.is_empty() {
            return self.config.default.clone();
        }
        let content = last.content.to_lowercase();
        for key in self.config.keys() {
            if content.contains(&key.to_lowercase()) {
                return key.to_string();
            }
        }
        self.config.default.clone()
    }

    /// Matches condition keys against the name of the most recent tool
    /// result in the conversation.
    fn evaluate_tool_result(&self, state: &ChatState) -> String {
        let latest_tool: Option<&Message> = state
            .messages
            .iter()
            .rev()
            .find(|message| message.name.is_some());
        let Some(tool_name) = latest_tool.and_then(|m| m.name.as_deref()) else {
            return self.config.default.clone();
        };
        let tool_name = tool_name.to_lowercase();
        for key in self.config.keys() {
            if tool_name.contains(&key.to_lowercase()) {
                return key.to_string();
            }
        }
        self.config.default.clone()
    }
}

#[async_trait::async_trait]
impl StepNode<ChatState> for ConditionStep {
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
                Some(json!({ "evaluation_type": self.config.evaluation_type })),
            )
            .await;

        let result = self.evaluate(&state.data);
        self.tracker
            .node_completed(record, Some(json!({ "condition_result": result })), 0, 0)
            .await;

        Ok(NodeOutput::Update(StateUpdate::new(ChatDelta {
            condition_result: Some(result),
            ..ChatDelta::default()
        })))
    }
}
