//! Executes chat workflows whose shape lives in storage rather than in
//! code: node and edge definitions are loaded at request time, compiled
//! into a typed state graph, cached by content hash, and run against the
//! session's conversation history.

mod builder;
mod cache;
mod config;
mod engine;
mod error;
mod handlers;
mod model;
mod routers;
mod state;
mod store;
mod tracker;

pub use builder::DynamicGraphBuilder;
pub use cache::{CacheStats, CompiledFlow, GraphCache};
pub use config::{
    ConditionNodeConfig, ConfigResolver, EvaluationType, HumanNodeConfig, LlmNodeConfig,
    NodeConfig, ResolvedConfig, ToolNodeConfig, ToolResolver,
};
pub use engine::{EngineOptions, ExecutionEngine, ExecutionResult, PendingInterrupt, RunStatus};
pub use error::{EngineError, StoreError};
pub use handlers::{
    llm_params, ConditionHandler, HandlerDeps, HandlerRegistry, HumanHandler, LlmHandler,
    NodeHandler, StartEndHandler, ToolHandler,
};
pub use model::{
    AvailableTool, EdgeConditionType, ExecutionStatus, GraphEdgeDef, GraphExecution, GraphNodeDef,
    NodeExecutionRecord, NodeKind, NodeRunStatus, NodeToolBinding,
};
pub use routers::{ConditionRouter, ToolResultRouter};
pub use state::{ChatDelta, ChatState, StateManager, HISTORY_WINDOW};
pub use store::{
    ExecutionStore, ExecutionUpdate, GraphStore, HistoryStore, InMemoryExecutionStore,
    InMemoryGraphStore, InMemoryHistoryStore, NodeExecutionUpdate,
};
pub use tracker::ExecutionTracker;
