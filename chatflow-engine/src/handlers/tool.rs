use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use futures::future::join_all;
use serde_json::json;

use chatflow_core::{ChatflowError, Message, Tool, ToolCall, Value};
use chatflow_graph::{GraphContext, GraphState, NodeOutput, StateUpdate, StepNode};

use crate::config::{NodeConfig, ToolNodeConfig};
use crate::error::EngineError;
use crate::model::GraphNodeDef;
use crate::state::{ChatDelta, ChatState};
use crate::tracker::ExecutionTracker;

use super::{HandlerDeps, NodeHandler};

pub struct ToolHandler {
    deps: HandlerDeps,
}

impl ToolHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait::async_trait]
impl NodeHandler for ToolHandler {
    async fn create_step(
        &self,
        node: &GraphNodeDef,
    ) -> Result<Box<dyn StepNode<ChatState>>, EngineError> {
        let resolved = self.deps.resolver.resolve(node);
        let config = match resolved.config {
            NodeConfig::Tool(config) => config,
            _ => ToolNodeConfig::default(),
        };
        let tools = self
            .deps
            .tools
            .resolve(&node.node_id)
            .await?
            .into_iter()
            .map(|tool| (tool.name().to_string(), tool))
            .collect();
        Ok(Box::new(ToolStep {
            node_id: node.node_id.clone(),
            config,
            tools,
            tracker: Arc::clone(&self.deps.tracker),
        }))
    }
}

struct ToolStep {
    node_id: String,
    config: ToolNodeConfig,
    tools: AHashMap<String, Arc<dyn Tool>>,
    tracker: Arc<ExecutionTracker>,
}

/// Error that aborts the whole node when `continue_on_error` is off.
struct FatalCall(String);

impl ToolStep {
    /// Runs one call to completion: lookup, bounded attempts with
    /// exponential backoff, result formatting. A recoverable failure
    /// becomes an error-tagged tool message correlated to the call id.
    async fn execute_call(&self, call: &ToolCall) -> Result<Message, FatalCall> {
        let Some(tool) = self.tools.get(&call.name) else {
            let reason = format!("Tool not found: {}", call.name);
            tracing::error!(node_id = %self.node_id, tool = %call.name, "unknown tool requested");
            if !self.config.continue_on_error {
                return Err(FatalCall(reason));
            }
            return Ok(Message::tool(
                call.name.clone(),
                format!("Error: {reason}"),
                call.id.clone(),
            ));
        };

        match self.invoke_with_retry(tool.as_ref(), &call.args).await {
            Ok(result) => Ok(Message::tool(
                call.name.clone(),
                format_tool_result(&result),
                call.id.clone(),
            )),
            Err(err) => {
                let reason = err.to_string();
                tracing::error!(node_id = %self.node_id, tool = %call.name, %reason, "tool call failed");
                if !self.config.continue_on_error {
                    return Err(FatalCall(reason));
                }
                Ok(Message::tool(
                    call.name.clone(),
                    format!("Error: {reason}"),
                    call.id.clone(),
                ))
            }
        }
    }

    /// Up to `retry_attempts + 1` attempts, each bounded by the configured
    /// timeout; a timed-out attempt counts as a failure. Waits 2^attempt
    /// seconds between attempts.
    async fn invoke_with_retry(&self, tool: &dyn Tool, args: &Value) -> Result<Value, ChatflowError> {
        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let mut last_error = ChatflowError::Timeout(timeout);
        for attempt in 0..=self.config.retry_attempts {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
            }
            match tokio::time::timeout(timeout, tool.invoke(args.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(err)) => {
                    tracing::warn!(tool = %tool.name(), attempt = attempt + 1, error = %err, "tool attempt failed");
                    last_error = ChatflowError::ToolCallFailed {
                        tool_name: tool.name().to_string(),
                        reason: err.to_string(),
                    };
                }
                Err(_) => {
                    tracing::warn!(tool = %tool.name(), attempt = attempt + 1, "tool attempt timed out");
                    last_error = ChatflowError::Timeout(timeout);
                }
            }
        }
        Err(last_error)
    }

    async fn run_calls(&self, calls: &[ToolCall]) -> Result<Vec<Message>, FatalCall> {
        if self.config.parallel_execution {
            // Call order is preserved by join_all even when execution
            // overlaps.
            let results = join_all(calls.iter().map(|call| self.execute_call(call))).await;
            results.into_iter().collect()
        } else {
            let mut outputs = Vec::with_capacity(calls.len());
            for call in calls {
                outputs.push(self.execute_call(call).await?);
            }
            Ok(outputs)
        }
    }
}

#[async_trait::async_trait]
impl StepNode<ChatState> for ToolStep {
    async fn run(
        &self,
        state: GraphState<ChatState>,
        _context: &GraphContext,
    ) -> Result<NodeOutput<ChatState>, ChatflowError> {
        let calls: Vec<ToolCall> = state
            .data
            .last_message()
            .map(|message| message.tool_calls.clone())
            .unwrap_or_default();

        let record = self
            .tracker
            .node_running(
                state.data.execution_id,
                &self.node_id,
                Some(json!({ "tool_calls": calls.len() })),
            )
            .await;

        if calls.is_empty() {
            tracing::warn!(node_id = %self.node_id, "no tool calls found in last message");
            self.tracker
                .node_completed(record, Some(json!({ "results": 0 })), 0, 0)
                .await;
            return Ok(NodeOutput::Update(StateUpdate::new(ChatDelta::default())));
        }

        match self.run_calls(&calls).await {
            Ok(outputs) => {
                self.tracker
                    .node_completed(record, Some(json!({ "results": outputs.len() })), 0, 0)
                    .await;
                Ok(NodeOutput::Update(StateUpdate::new(ChatDelta::messages(
                    outputs,
                ))))
            }
            Err(FatalCall(reason)) => {
                let message = format!("Tool node execution failed: {reason}");
                self.tracker.node_failed(record, &message).await;
                Ok(NodeOutput::Update(StateUpdate::new(ChatDelta::error(
                    message,
                ))))
            }
        }
    }
}

fn format_tool_result(result: &Value) -> String {
    match result {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
