use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use chatflow_core::{Message, Value};

use crate::error::StoreError;
use crate::model::{
    ExecutionStatus, GraphEdgeDef, GraphExecution, GraphNodeDef, NodeExecutionRecord,
    NodeRunStatus, NodeToolBinding,
};

/// Source of node/edge definitions and per-node tool bindings. The engine
/// only reads; graph editing happens elsewhere.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_all_nodes(&self) -> Result<Vec<GraphNodeDef>, StoreError>;
    async fn get_all_edges(&self) -> Result<Vec<GraphEdgeDef>, StoreError>;
    async fn get_tools_by_node(&self, node_id: &str) -> Result<Vec<NodeToolBinding>, StoreError>;
}

/// Conversation history, keyed by session.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError>;
    async fn add_messages(&self, session_id: &str, messages: &[Message]) -> Result<(), StoreError>;
}

/// Fields an execution row update may touch.
#[derive(Clone, Debug, Default)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub error: Option<String>,
    pub metadata: Option<Value>,
    pub completed: bool,
}

/// Fields a node-execution row update may touch.
#[derive(Clone, Debug, Default)]
pub struct NodeExecutionUpdate {
    pub status: Option<NodeRunStatus>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub completed: bool,
}

/// Persistence for execution and node-execution audit rows.
#[async_trait::async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, execution: &GraphExecution) -> Result<(), StoreError>;
    async fn update_execution(&self, id: Uuid, update: ExecutionUpdate) -> Result<(), StoreError>;
    async fn create_node_execution(&self, record: &NodeExecutionRecord) -> Result<(), StoreError>;
    async fn update_node_execution(
        &self,
        id: Uuid,
        update: NodeExecutionUpdate,
    ) -> Result<(), StoreError>;
    async fn get_node_executions(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<NodeExecutionRecord>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryGraphStore {
    nodes: RwLock<Vec<GraphNodeDef>>,
    edges: RwLock<Vec<GraphEdgeDef>>,
    tools: RwLock<HashMap<String, Vec<NodeToolBinding>>>,
}

impl InMemoryGraphStore {
    pub fn new(nodes: Vec<GraphNodeDef>, edges: Vec<GraphEdgeDef>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
            edges: RwLock::new(edges),
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub fn bind_tools(&self, node_id: &str, bindings: Vec<NodeToolBinding>) {
        if let Ok(mut guard) = self.tools.write() {
            guard.insert(node_id.to_string(), bindings);
        }
    }

    pub fn replace(&self, nodes: Vec<GraphNodeDef>, edges: Vec<GraphEdgeDef>) {
        if let Ok(mut guard) = self.nodes.write() {
            *guard = nodes;
        }
        if let Ok(mut guard) = self.edges.write() {
            *guard = edges;
        }
    }
}

#[async_trait::async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_all_nodes(&self) -> Result<Vec<GraphNodeDef>, StoreError> {
        Ok(self
            .nodes
            .read()
            .map_err(|_| StoreError::Backend("lock".into()))?
            .clone())
    }

    async fn get_all_edges(&self) -> Result<Vec<GraphEdgeDef>, StoreError> {
        Ok(self
            .edges
            .read()
            .map_err(|_| StoreError::Backend("lock".into()))?
            .clone())
    }

    async fn get_tools_by_node(&self, node_id: &str) -> Result<Vec<NodeToolBinding>, StoreError> {
        Ok(self
            .tools
            .read()
            .map_err(|_| StoreError::Backend("lock".into()))?
            .get(node_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryHistoryStore {
    messages: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .read()
            .map_err(|_| StoreError::Backend("lock".into()))?
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_messages(&self, session_id: &str, messages: &[Message]) -> Result<(), StoreError> {
        let mut guard = self
            .messages
            .write()
            .map_err(|_| StoreError::Backend("lock".into()))?;
        guard
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, GraphExecution>>,
    node_executions: RwLock<Vec<NodeExecutionRecord>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_execution(&self, id: Uuid) -> Option<GraphExecution> {
        self.executions.read().ok()?.get(&id).cloned()
    }
}

#[async_trait::async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create_execution(&self, execution: &GraphExecution) -> Result<(), StoreError> {
        let mut guard = self
            .executions
            .write()
            .map_err(|_| StoreError::Backend("lock".into()))?;
        guard.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, id: Uuid, update: ExecutionUpdate) -> Result<(), StoreError> {
        let mut guard = self
            .executions
            .write()
            .map_err(|_| StoreError::Backend("lock".into()))?;
        let execution = guard
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(status) = update.status {
            execution.status = status;
        }
        if update.error.is_some() {
            execution.error = update.error;
        }
        if let Some(metadata) = update.metadata {
            execution.metadata = metadata;
        }
        if update.completed {
            execution.completed_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn create_node_execution(&self, record: &NodeExecutionRecord) -> Result<(), StoreError> {
        let mut guard = self
            .node_executions
            .write()
            .map_err(|_| StoreError::Backend("lock".into()))?;
        guard.push(record.clone());
        Ok(())
    }

    async fn update_node_execution(
        &self,
        id: Uuid,
        update: NodeExecutionUpdate,
    ) -> Result<(), StoreError> {
        let mut guard = self
            .node_executions
            .write()
            .map_err(|_| StoreError::Backend("lock".into()))?;
        let record = guard
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(status) = update.status {
            record.status = status;
        }
        if update.output.is_some() {
            record.output = update.output;
        }
        if update.error.is_some() {
            record.error = update.error;
        }
        if let Some(tokens) = update.input_tokens {
            record.input_tokens = tokens;
        }
        if let Some(tokens) = update.output_tokens {
            record.output_tokens = tokens;
        }
        if update.completed {
            record.completed_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn get_node_executions(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<NodeExecutionRecord>, StoreError> {
        Ok(self
            .node_executions
            .read()
            .map_err(|_| StoreError::Backend("lock".into()))?
            .iter()
            .filter(|record| record.execution_id == execution_id)
            .cloned()
            .collect())
    }
}
