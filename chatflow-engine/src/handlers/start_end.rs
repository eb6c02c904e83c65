use chatflow_core::ChatflowError;
use chatflow_graph::{GraphContext, GraphState, NodeOutput, StateUpdate, StepNode};

use crate::error::EngineError;
use crate::model::{GraphNodeDef, NodeKind};
use crate::state::{ChatDelta, ChatState};

use super::{HandlerDeps, NodeHandler};

/// Start and end markers. The builder normally elides both in favor of
/// direct sentinel wiring; a step is only created for the documented
/// fallbacks (a start node with no outgoing edge, or an edge pointing
/// straight at an end node).
pub struct StartEndHandler {
    _deps: HandlerDeps,
}

impl StartEndHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { _deps: deps }
    }
}

#[async_trait::async_trait]
impl NodeHandler for StartEndHandler {
    async fn create_step(
        &self,
        node: &GraphNodeDef,
    ) -> Result<Box<dyn StepNode<ChatState>>, EngineError> {
        Ok(Box::new(MarkerStep {
            terminal: node.kind() == Some(NodeKind::End),
        }))
    }
}

struct MarkerStep {
    terminal: bool,
}

#[async_trait::async_trait]
impl StepNode<ChatState> for MarkerStep {
    async fn run(
        &self,
        _state: GraphState<ChatState>,
        _context: &GraphContext,
    ) -> Result<NodeOutput<ChatState>, ChatflowError> {
        let delta = if self.terminal {
            ChatDelta {
                done: true,
                ..ChatDelta::default()
            }
        } else {
            ChatDelta::default()
        };
        Ok(NodeOutput::Update(StateUpdate::new(delta)))
    }
}
