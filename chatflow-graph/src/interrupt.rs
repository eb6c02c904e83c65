use chatflow_core::Value;

use crate::{GraphState, StateSchema};

/// A run paused at a node waiting for external input. Holds everything
/// needed to re-enter the same step later via `CompiledGraph::resume`.
#[derive(Clone, Debug)]
pub struct GraphInterrupt<S: StateSchema> {
    pub node: String,
    pub state: GraphState<S>,
    pub payload: Value,
}
