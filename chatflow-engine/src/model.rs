use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chatflow_core::Value;

/// Known node kinds. Stored node rows carry a free-form type string so an
/// unknown kind degrades to a skipped node instead of a failed build.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    End,
    Llm,
    Tool,
    Condition,
    Human,
}

impl NodeKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            "llm" => Some(Self::Llm),
            "tool" => Some(Self::Tool),
            "condition" => Some(Self::Condition),
            "human" => Some(Self::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::Condition => "condition",
            Self::Human => "human",
        }
    }
}

/// A persisted step definition. Read-only to the engine; treated as
/// immutable input for the duration of one build.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GraphNodeDef {
    pub id: Uuid,
    pub node_id: String,
    pub node_type: String,
    pub name: String,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub position: (i64, i64),
}

impl GraphNodeDef {
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::parse(&self.node_type)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EdgeConditionType {
    Always,
    Conditional,
    ToolResult,
}

impl Default for EdgeConditionType {
    fn default() -> Self {
        Self::Always
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GraphEdgeDef {
    pub id: Uuid,
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default)]
    pub condition_type: EdgeConditionType,
    #[serde(default)]
    pub condition_config: Value,
}

/// Catalog entry for an invokable tool.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AvailableTool {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default)]
    pub configuration: Value,
    pub enabled: bool,
}

/// Join row binding a catalog tool to a node, with its own enable flag and
/// optional per-node override configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct NodeToolBinding {
    pub tool: AvailableTool,
    pub enabled: bool,
    #[serde(default)]
    pub configuration: Value,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Audit row for one end-to-end run.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GraphExecution {
    pub id: Uuid,
    pub chat_id: Option<String>,
    pub session_id: String,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GraphExecution {
    pub fn started(chat_id: Option<String>, session_id: impl Into<String>, metadata: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            session_id: session_id.into(),
            status: ExecutionStatus::Running,
            error: None,
            metadata,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Audit row for one node step within a run.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct NodeExecutionRecord {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: NodeRunStatus,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeExecutionRecord {
    pub fn running(execution_id: Uuid, node_id: impl Into<String>, input: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            node_id: node_id.into(),
            status: NodeRunStatus::Running,
            input,
            output: None,
            error: None,
            input_tokens: 0,
            output_tokens: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}
