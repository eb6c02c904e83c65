mod condition;
mod human;
mod llm;
mod start_end;
mod tool;

pub use condition::ConditionHandler;
pub use human::HumanHandler;
pub use llm::{llm_params, LlmHandler};
pub use start_end::StartEndHandler;
pub use tool::ToolHandler;

use std::sync::Arc;

use ahash::AHashMap;

use chatflow_core::{ChatModel, LlmParams, Tool};
use chatflow_graph::StepNode;

use crate::config::{ConfigResolver, ToolResolver};
use crate::error::EngineError;
use crate::model::GraphNodeDef;
use crate::state::ChatState;
use crate::store::GraphStore;
use crate::tracker::ExecutionTracker;

/// Turns a persisted node definition into an executable step. One handler
/// instance serves every node of its type; per-node data lives in the
/// step it creates.
#[async_trait::async_trait]
pub trait NodeHandler: Send + Sync {
    async fn create_step(
        &self,
        node: &GraphNodeDef,
    ) -> Result<Box<dyn StepNode<ChatState>>, EngineError>;
}

/// Shared collaborators handed to handlers at registry construction.
#[derive(Clone)]
pub struct HandlerDeps {
    pub resolver: Arc<ConfigResolver>,
    pub tools: Arc<ToolResolver>,
    pub tracker: Arc<ExecutionTracker>,
    pub llm: Arc<dyn ChatModel>,
    pub llm_defaults: LlmParams,
}

impl HandlerDeps {
    pub fn new(
        store: Arc<dyn GraphStore>,
        tools: Vec<Arc<dyn Tool>>,
        tracker: Arc<ExecutionTracker>,
        llm: Arc<dyn ChatModel>,
        llm_defaults: LlmParams,
    ) -> Self {
        Self {
            resolver: Arc::new(ConfigResolver::new()),
            tools: Arc::new(ToolResolver::new(store, tools)),
            tracker,
            llm,
            llm_defaults,
        }
    }
}

/// Maps a node-type string to its handler. The map is built explicitly at
/// engine startup and passed by reference into the builder; unknown types
/// resolve to `None` so the builder can skip them with a warning.
pub struct HandlerRegistry {
    handlers: AHashMap<String, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new(deps: HandlerDeps) -> Self {
        let mut registry = Self {
            handlers: AHashMap::new(),
        };
        registry.register("llm", Arc::new(LlmHandler::new(deps.clone())));
        registry.register("tool", Arc::new(ToolHandler::new(deps.clone())));
        registry.register("condition", Arc::new(ConditionHandler::new(deps.clone())));
        registry.register("human", Arc::new(HumanHandler::new(deps.clone())));
        let markers = Arc::new(StartEndHandler::new(deps));
        registry.register("start", markers.clone());
        registry.register("end", markers);
        registry
    }

    pub fn register(&mut self, node_type: &str, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type.to_string(), handler);
    }

    pub fn get(&self, node_type: &str) -> Option<&Arc<dyn NodeHandler>> {
        self.handlers.get(node_type)
    }

    pub fn has_handler(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}
