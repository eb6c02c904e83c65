use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use chatflow_core::{ChatModel, ChatflowError, LlmParams, LlmRequest, LlmResponse, Value};
use chatflow_engine::{
    DynamicGraphBuilder, EdgeConditionType, EngineError, ExecutionTracker, GraphCache,
    GraphEdgeDef, GraphNodeDef, HandlerDeps, HandlerRegistry, InMemoryExecutionStore,
    InMemoryGraphStore,
};

struct SilentChat;

#[async_trait::async_trait]
impl ChatModel for SilentChat {
    async fn invoke(&self, _request: LlmRequest) -> Result<LlmResponse, ChatflowError> {
        Ok(LlmResponse {
            content: String::new(),
            tool_calls: Vec::new(),
        })
    }
}

fn node(node_id: &str, node_type: &str) -> GraphNodeDef {
    GraphNodeDef {
        id: Uuid::new_v4(),
        node_id: node_id.to_string(),
        node_type: node_type.to_string(),
        name: node_id.to_string(),
        configuration: json!({}),
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

fn builder_for(nodes: Vec<GraphNodeDef>, edges: Vec<GraphEdgeDef>) -> DynamicGraphBuilder {
    let store = Arc::new(InMemoryGraphStore::new(nodes, edges));
    let tracker = Arc::new(ExecutionTracker::new(Arc::new(
        InMemoryExecutionStore::new(),
    )));
    let deps = HandlerDeps::new(
        store.clone(),
        Vec::new(),
        tracker,
        Arc::new(SilentChat),
        LlmParams::default(),
    );
    DynamicGraphBuilder::new(
        store,
        Arc::new(HandlerRegistry::new(deps)),
        Arc::new(GraphCache::default()),
    )
}

#[tokio::test]
async fn empty_definition_is_rejected() {
    let builder = builder_for(Vec::new(), Vec::new());
    let err = builder.build("main").await.unwrap_err();
    assert!(matches!(err, EngineError::EmptyGraph));
}

#[tokio::test]
async fn unknown_node_type_is_skipped_with_a_warning() {
    let nodes = vec![
        node("start", "start"),
        node("assistant", "llm"),
        node("quantum", "teleport"),
        node("end", "end"),
    ];
    let edges = vec![edge("start", "assistant"), edge("assistant", "end")];
    let builder = builder_for(nodes, edges);

    let flow = builder.build("main").await.unwrap();
    assert!(flow
        .warnings
        .iter()
        .any(|warning| warning.contains("unsupported type 'teleport'")));
    assert!(!flow
        .graph
        .node_names()
        .contains(&"quantum".to_string()));
}

#[tokio::test]
async fn missing_start_node_falls_back_to_first_executable() {
    let nodes = vec![node("assistant", "llm"), node("end", "end")];
    let edges = vec![edge("assistant", "end")];
    let builder = builder_for(nodes, edges);

    let flow = builder.build("main").await.unwrap();
    assert_eq!(flow.graph.entry(), "assistant");
    assert!(flow
        .warnings
        .iter()
        .any(|warning| warning.contains("no start node")));
}

#[tokio::test]
async fn graph_without_end_node_is_flagged() {
    let nodes = vec![node("start", "start"), node("assistant", "llm")];
    let edges = vec![edge("start", "assistant")];
    let builder = builder_for(nodes, edges);

    let flow = builder.build("main").await.unwrap();
    assert!(flow
        .warnings
        .iter()
        .any(|warning| warning.contains("must have an end node")));
}

#[tokio::test]
async fn dangling_edge_target_is_dropped_with_a_warning() {
    let nodes = vec![
        node("start", "start"),
        node("assistant", "llm"),
        node("end", "end"),
    ];
    let edges = vec![edge("start", "assistant"), edge("assistant", "ghost")];
    let builder = builder_for(nodes, edges);

    let flow = builder.build("main").await.unwrap();
    assert!(flow
        .warnings
        .iter()
        .any(|warning| warning.contains("ghost")));
}

#[tokio::test]
async fn start_without_outgoing_edge_builds_a_do_nothing_graph() {
    let nodes = vec![node("start", "start"), node("assistant", "llm")];
    let builder = builder_for(nodes, Vec::new());

    let flow = builder.build("main").await.unwrap();
    assert_eq!(flow.graph.entry(), "start");
    assert!(flow
        .warnings
        .iter()
        .any(|warning| warning.contains("no outgoing edge")));
}

#[tokio::test]
async fn identical_definitions_share_one_compiled_graph() {
    let nodes = vec![
        node("start", "start"),
        node("assistant", "llm"),
        node("end", "end"),
    ];
    let edges = vec![edge("start", "assistant"), edge("assistant", "end")];
    let builder = builder_for(nodes, edges);

    let first = builder.build("main").await.unwrap();
    let second = builder.build("main").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
