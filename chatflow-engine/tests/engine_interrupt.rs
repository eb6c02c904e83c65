use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use chatflow_core::{ChatModel, ChatflowError, LlmRequest, LlmResponse, Value};
use chatflow_engine::{
    EdgeConditionType, EngineOptions, ExecutionEngine, ExecutionStatus, GraphEdgeDef,
    GraphNodeDef, HistoryStore, InMemoryExecutionStore, InMemoryGraphStore, InMemoryHistoryStore,
    RunStatus,
};

struct SilentChat;

#[async_trait::async_trait]
impl ChatModel for SilentChat {
    async fn invoke(&self, _request: LlmRequest) -> Result<LlmResponse, ChatflowError> {
        Ok(LlmResponse {
            content: "unused".to_string(),
            tool_calls: Vec::new(),
        })
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

struct Harness {
    engine: ExecutionEngine,
    executions: Arc<InMemoryExecutionStore>,
    history: Arc<InMemoryHistoryStore>,
}

fn human_graph() -> Harness {
    let nodes = vec![
        node("start", "start", json!({})),
        node(
            "approval",
            "human",
            json!({ "prompt_template": "Need a decision on: {query}" }),
        ),
        node("end", "end", json!({})),
    ];
    let edges = vec![edge("start", "approval"), edge("approval", "end")];
    let graph_store = Arc::new(InMemoryGraphStore::new(nodes, edges));
    let history = Arc::new(InMemoryHistoryStore::new());
    let executions = Arc::new(InMemoryExecutionStore::new());
    let engine = ExecutionEngine::new(
        graph_store,
        history.clone(),
        executions.clone(),
        Arc::new(SilentChat),
        Vec::new(),
        EngineOptions {
            build_retry_delay: Duration::from_millis(1),
            timeout_retry_delay: Duration::from_millis(1),
            ..EngineOptions::default()
        },
    );
    Harness {
        engine,
        executions,
        history,
    }
}

#[tokio::test]
async fn human_node_pauses_the_run() {
    let h = human_graph();

    let result = h
        .engine
        .execute_graph(None, "session-1", "please review", "main")
        .await;

    assert_eq!(result.status, RunStatus::Interrupted);
    let pending = result.pending.expect("interrupted run carries a handle");
    assert_eq!(pending.node_id(), "approval");

    let query = pending.payload()["query"].as_str().unwrap();
    assert!(query.starts_with("Need a decision on:"), "{query}");
    assert!(query.contains("please review"), "{query}");
    assert_eq!(pending.payload()["timeout_seconds"], json!(3600));

    let row = h.executions.get_execution(result.execution_id).unwrap();
    assert_eq!(row.status, ExecutionStatus::Interrupted);
}

#[tokio::test]
async fn resume_continues_from_the_paused_node() {
    let h = human_graph();

    let paused = h
        .engine
        .execute_graph(None, "session-1", "please review", "main")
        .await;
    let pending = paused.pending.unwrap();
    let execution_id = pending.execution_id();
    assert_eq!(execution_id, paused.execution_id);

    let resumed = h
        .engine
        .resume_graph(pending, json!({ "data": "approved" }))
        .await;

    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.execution_id, execution_id);

    // The external answer lands in the conversation as a user turn.
    let stored = h.history.get_messages("session-1").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].content, "please review");
    assert_eq!(stored[1].content, "approved");

    let row = h.executions.get_execution(execution_id).unwrap();
    assert_eq!(row.status, ExecutionStatus::Completed);
}
