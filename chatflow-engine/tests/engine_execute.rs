use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use chatflow_core::{ChatModel, ChatflowError, LlmRequest, LlmResponse, Role, Value};
use chatflow_engine::{
    EdgeConditionType, EngineOptions, ExecutionEngine, ExecutionStatus, GraphEdgeDef,
    GraphNodeDef, InMemoryExecutionStore, InMemoryGraphStore, InMemoryHistoryStore, RunStatus,
};

struct ScriptedChat {
    responses: Mutex<VecDeque<LlmResponse>>,
}

impl ScriptedChat {
    fn new(contents: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(
                contents
                    .iter()
                    .map(|content| LlmResponse {
                        content: content.to_string(),
                        tool_calls: Vec::new(),
                    })
                    .collect(),
            ),
        })
    }
}

#[async_trait::async_trait]
impl ChatModel for ScriptedChat {
    async fn invoke(&self, _request: LlmRequest) -> Result<LlmResponse, ChatflowError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChatflowError::LlmProvider("no scripted response left".to_string()))
    }
}

fn node(node_id: &str, node_type: &str, configuration: Value) -> GraphNodeDef {
    GraphNodeDef {
        id: Uuid::new_v4(),
        node_id: node_id.to_string(),
        node_type: node_type.to_string(),
        name: node_id.to_string(),
        configuration,
        position: (0, 0),
    }
}

fn edge(from: &str, to: &str) -> GraphEdgeDef {
    GraphEdgeDef {
        id: Uuid::new_v4(),
        from_node_id: from.to_string(),
        to_node_id: to.to_string(),
        condition_type: EdgeConditionType::Always,
        condition_config: Value::Null,
    }
}

fn fast_options() -> EngineOptions {
    EngineOptions {
        build_retry_delay: Duration::from_millis(1),
        timeout_retry_delay: Duration::from_millis(1),
        ..EngineOptions::default()
    }
}

struct Harness {
    engine: ExecutionEngine,
    executions: Arc<InMemoryExecutionStore>,
    history: Arc<InMemoryHistoryStore>,
}

fn harness(
    nodes: Vec<GraphNodeDef>,
    edges: Vec<GraphEdgeDef>,
    llm: Arc<dyn ChatModel>,
) -> Harness {
    let graph_store = Arc::new(InMemoryGraphStore::new(nodes, edges));
    let history = Arc::new(InMemoryHistoryStore::new());
    let executions = Arc::new(InMemoryExecutionStore::new());
    let engine = ExecutionEngine::new(
        graph_store,
        history.clone(),
        executions.clone(),
        llm,
        Vec::new(),
        fast_options(),
    );
    Harness {
        engine,
        executions,
        history,
    }
}

fn linear_graph() -> (Vec<GraphNodeDef>, Vec<GraphEdgeDef>) {
    let nodes = vec![
        node("start", "start", json!({})),
        node("respond", "llm", json!({ "system_prompt": "Be brief." })),
        node("end", "end", json!({})),
    ];
    let edges = vec![edge("start", "respond"), edge("respond", "end")];
    (nodes, edges)
}

#[tokio::test]
async fn linear_graph_produces_one_assistant_message() {
    let (nodes, edges) = linear_graph();
    let h = harness(nodes, edges, ScriptedChat::new(&["Hello there."]));

    let result = h
        .engine
        .execute_graph(None, "session-1", "hi", "main")
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.messages.len(), 1);
    assert_eq!(result.messages[0].role, Role::Assistant);
    assert_eq!(result.messages[0].content, "Hello there.");
    assert!(result.error.is_none());

    let row = h.executions.get_execution(result.execution_id).unwrap();
    assert_eq!(row.status, ExecutionStatus::Completed);
    assert!(row.completed_at.is_some());
}

#[tokio::test]
async fn node_executions_are_recorded() {
    let (nodes, edges) = linear_graph();
    let h = harness(nodes, edges, ScriptedChat::new(&["ok"]));

    let result = h
        .engine
        .execute_graph(None, "session-1", "hi", "main")
        .await;

    assert_eq!(result.node_executions.len(), 1);
    let record = &result.node_executions[0];
    assert_eq!(record.node_id, "respond");
    assert!(record.completed_at.is_some());
    assert!(record.input_tokens > 0);
}

#[tokio::test]
async fn history_persists_across_runs() {
    let (nodes, edges) = linear_graph();
    let h = harness(nodes, edges, ScriptedChat::new(&["first", "second"]));

    h.engine
        .execute_graph(None, "session-1", "one", "main")
        .await;
    let result = h
        .engine
        .execute_graph(None, "session-1", "two", "main")
        .await;

    // The second run returns only its own output, not replayed history.
    assert_eq!(result.messages.len(), 1);
    assert_eq!(result.messages[0].content, "second");

    use chatflow_engine::HistoryStore;
    let stored = h.history.get_messages("session-1").await.unwrap();
    assert_eq!(stored.len(), 4);
    assert_eq!(stored[0].content, "one");
    assert_eq!(stored[1].content, "first");
    assert_eq!(stored[2].content, "two");
    assert_eq!(stored[3].content, "second");
}

#[tokio::test]
async fn empty_graph_fails_after_all_retries() {
    let h = harness(Vec::new(), Vec::new(), ScriptedChat::new(&[]));

    let result = h
        .engine
        .execute_graph(None, "session-1", "hi", "main")
        .await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.attempts, 3);
    assert!(result.error.as_deref().unwrap().contains("no nodes"));

    let row = h.executions.get_execution(result.execution_id).unwrap();
    assert_eq!(row.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn llm_provider_failure_marks_run_failed() {
    let (nodes, edges) = linear_graph();
    // Empty script: the model errors on the first call.
    let h = harness(nodes, edges, ScriptedChat::new(&[]));

    let result = h
        .engine
        .execute_graph(None, "session-1", "hi", "main")
        .await;

    assert_eq!(result.status, RunStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.contains("LLM node execution failed"), "{error}");

    let row = h.executions.get_execution(result.execution_id).unwrap();
    assert_eq!(row.status, ExecutionStatus::Failed);
}
