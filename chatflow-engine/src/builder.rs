use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use serde::Deserialize;

use chatflow_core::Value;
use chatflow_graph::{validate_structure, GraphBuilder, Transition};

use crate::cache::{CompiledFlow, GraphCache};
use crate::error::EngineError;
use crate::handlers::HandlerRegistry;
use crate::model::{EdgeConditionType, GraphEdgeDef, GraphNodeDef, NodeKind};
use crate::routers::{ConditionRouter, ToolResultRouter};
use crate::state::ChatState;
use crate::store::GraphStore;

/// Routing table as persisted on a conditional or tool-result edge.
#[derive(Debug, Default, Deserialize)]
struct RouteConfig {
    #[serde(default)]
    conditions: serde_json::Map<String, Value>,
    #[serde(default)]
    default: Option<String>,
}

/// Compiles the persisted node/edge definitions into an executable graph.
///
/// Start and end markers never become steps: the start node's outgoing edge
/// designates the entry point, and edges into an end node terminate the
/// run. Definition problems that have a safe fallback (unknown node types,
/// dangling edge targets, malformed routing tables) are recorded as
/// warnings instead of failing the build.
pub struct DynamicGraphBuilder {
    store: Arc<dyn GraphStore>,
    registry: Arc<HandlerRegistry>,
    cache: Arc<GraphCache>,
}

impl DynamicGraphBuilder {
    pub fn new(
        store: Arc<dyn GraphStore>,
        registry: Arc<HandlerRegistry>,
        cache: Arc<GraphCache>,
    ) -> Self {
        Self {
            store,
            registry,
            cache,
        }
    }

    pub async fn build(&self, graph_name: &str) -> Result<Arc<CompiledFlow>, EngineError> {
        let nodes = self.store.get_all_nodes().await?;
        let edges = self.store.get_all_edges().await?;

        if nodes.is_empty() {
            return Err(EngineError::EmptyGraph);
        }

        let key = GraphCache::cache_key(graph_name, &nodes, &edges);
        if let Some(flow) = self.cache.get(&key) {
            return Ok(flow);
        }

        let flow = Arc::new(self.compile(graph_name, &nodes, &edges).await?);
        self.cache.put(key, Arc::clone(&flow));
        Ok(flow)
    }

    async fn compile(
        &self,
        graph_name: &str,
        nodes: &[GraphNodeDef],
        edges: &[GraphEdgeDef],
    ) -> Result<CompiledFlow, EngineError> {
        let mut warnings = Vec::new();
        let mut builder = GraphBuilder::<ChatState>::new();

        let by_id: AHashMap<&str, &GraphNodeDef> = nodes
            .iter()
            .map(|node| (node.node_id.as_str(), node))
            .collect();

        // Register executable steps. Start/end markers are elided here and
        // folded into entry resolution and edge wiring below.
        let mut registered: AHashSet<String> = AHashSet::new();
        for node in nodes {
            if matches!(node.kind(), Some(NodeKind::Start | NodeKind::End)) {
                continue;
            }
            let Some(handler) = self.registry.get(&node.node_type) else {
                let warning = format!(
                    "node '{}' has unsupported type '{}' and was skipped",
                    node.node_id, node.node_type
                );
                tracing::warn!(
                    node_id = %node.node_id,
                    node_type = %node.node_type,
                    "skipping node with no registered handler"
                );
                warnings.push(warning);
                continue;
            };
            let step = handler.create_step(node).await?;
            builder = builder.add_boxed_node(&node.node_id, step);
            registered.insert(node.node_id.clone());
        }

        let start = nodes.iter().find(|node| node.kind() == Some(NodeKind::Start));
        let entry = self
            .resolve_entry(start, nodes, edges, &registered, &mut builder, &mut warnings)
            .await?;

        // One outgoing edge spec per node; extra definitions are ignored.
        let mut wired: AHashSet<&str> = AHashSet::new();
        for edge in edges {
            let from = edge.from_node_id.as_str();
            if !registered.contains(from) {
                continue;
            }
            if !wired.insert(from) {
                warnings.push(format!(
                    "node '{from}' has more than one outgoing edge; extras ignored"
                ));
                continue;
            }
            builder = self.wire_edge(builder, edge, &by_id, &registered, &mut warnings);
        }

        let node_ids: Vec<&str> = nodes.iter().map(|node| node.node_id.as_str()).collect();
        let edge_pairs: Vec<(&str, &str)> = edges
            .iter()
            .map(|edge| (edge.from_node_id.as_str(), edge.to_node_id.as_str()))
            .collect();
        let validation_entry = start.map(|node| node.node_id.as_str());
        let validation_terminal = nodes
            .iter()
            .find(|node| node.kind() == Some(NodeKind::End))
            .map(|node| node.node_id.as_str());
        warnings.extend(validate_structure(
            &node_ids,
            &edge_pairs,
            validation_entry,
            validation_terminal,
        ));

        let graph = builder
            .set_entry(&entry)
            .build()
            .map_err(|err| EngineError::Build(err.to_string()))?;

        tracing::info!(
            graph = %graph_name,
            nodes = nodes.len(),
            edges = edges.len(),
            warnings = warnings.len(),
            "compiled workflow graph"
        );
        Ok(CompiledFlow { graph, warnings })
    }

    /// Entry point selection: the start node's outgoing edge target when it
    /// is executable, otherwise a marker step standing in for the start (or
    /// end) node so the run still terminates cleanly.
    async fn resolve_entry(
        &self,
        start: Option<&GraphNodeDef>,
        nodes: &[GraphNodeDef],
        edges: &[GraphEdgeDef],
        registered: &AHashSet<String>,
        builder: &mut GraphBuilder<ChatState>,
        warnings: &mut Vec<String>,
    ) -> Result<String, EngineError> {
        if let Some(start) = start {
            let target = edges
                .iter()
                .find(|edge| edge.from_node_id == start.node_id)
                .map(|edge| edge.to_node_id.as_str());

            if let Some(target) = target {
                if registered.contains(target) {
                    return Ok(target.to_string());
                }
                // Start points at an end marker (or a skipped node):
                // register that node as a terminal marker step.
                if let Some(node) = nodes.iter().find(|node| node.node_id == target) {
                    let handler_type = if node.kind() == Some(NodeKind::End) {
                        "end"
                    } else {
                        "start"
                    };
                    if let Some(handler) = self.registry.get(handler_type) {
                        let step = handler.create_step(node).await?;
                        let taken = std::mem::take(builder);
                        *builder = taken.add_boxed_node(&node.node_id, step);
                        warnings.push(format!(
                            "entry target '{target}' is not executable; run ends immediately"
                        ));
                        return Ok(target.to_string());
                    }
                }
                warnings.push(format!("entry target '{target}' does not exist"));
            }

            // No usable outgoing edge: the start node itself becomes a
            // no-op entry and the run ends after it.
            if let Some(handler) = self.registry.get("start") {
                let step = handler.create_step(start).await?;
                let taken = std::mem::take(builder);
                *builder = taken.add_boxed_node(&start.node_id, step);
                warnings.push(format!(
                    "start node '{}' has no outgoing edge; graph does nothing",
                    start.node_id
                ));
                return Ok(start.node_id.clone());
            }
        }

        // No start marker at all: fall back to the first executable node in
        // definition order.
        let first = nodes
            .iter()
            .find(|node| registered.contains(node.node_id.as_str()));
        match first {
            Some(node) => {
                tracing::warn!(entry = %node.node_id, "no start node defined; using first executable node");
                warnings.push(format!(
                    "no start node defined; using '{}' as entry point",
                    node.node_id
                ));
                Ok(node.node_id.clone())
            }
            None => Err(EngineError::Build(
                "graph has no executable nodes".to_string(),
            )),
        }
    }

    fn wire_edge(
        &self,
        builder: GraphBuilder<ChatState>,
        edge: &GraphEdgeDef,
        by_id: &AHashMap<&str, &GraphNodeDef>,
        registered: &AHashSet<String>,
        warnings: &mut Vec<String>,
    ) -> GraphBuilder<ChatState> {
        let from = edge.from_node_id.as_str();
        match edge.condition_type {
            EdgeConditionType::Always => {
                match resolve_target(&edge.to_node_id, by_id, registered) {
                    Some(transition) => builder.add_edge(from, transition),
                    None => {
                        warnings.push(format!(
                            "edge from '{from}' points at unknown node '{}'",
                            edge.to_node_id
                        ));
                        builder
                    }
                }
            }
            EdgeConditionType::Conditional | EdgeConditionType::ToolResult => {
                let config: RouteConfig = serde_json::from_value(edge.condition_config.clone())
                    .unwrap_or_else(|err| {
                        warnings.push(format!(
                            "edge from '{from}' has a malformed routing table: {err}"
                        ));
                        RouteConfig::default()
                    });

                let mut routes = Vec::with_capacity(config.conditions.len());
                for (key, target) in &config.conditions {
                    let Some(target) = target.as_str() else {
                        warnings.push(format!(
                            "edge from '{from}': route '{key}' target is not a string"
                        ));
                        continue;
                    };
                    match resolve_target(target, by_id, registered) {
                        Some(transition) => routes.push((key.clone(), transition)),
                        None => warnings.push(format!(
                            "edge from '{from}': route '{key}' points at unknown node '{target}'"
                        )),
                    }
                }

                let default = config
                    .default
                    .as_deref()
                    .and_then(|target| resolve_target(target, by_id, registered))
                    .unwrap_or(Transition::End);

                if edge.condition_type == EdgeConditionType::ToolResult {
                    builder.add_conditional_edge(from, ToolResultRouter::new(routes, default))
                } else {
                    builder.add_conditional_edge(from, ConditionRouter::new(routes, default))
                }
            }
        }
    }
}

/// An edge into an end marker terminates the run; anything else must name a
/// registered executable node.
fn resolve_target(
    target: &str,
    by_id: &AHashMap<&str, &GraphNodeDef>,
    registered: &AHashSet<String>,
) -> Option<Transition> {
    if registered.contains(target) {
        return Some(Transition::Node(target.to_string()));
    }
    match by_id.get(target) {
        Some(node) if node.kind() == Some(NodeKind::End) => Some(Transition::End),
        _ => None,
    }
}
