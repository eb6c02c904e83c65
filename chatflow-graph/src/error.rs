use thiserror::Error;

use chatflow_core::ChatflowError;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no entry point set")]
    MissingEntry,
    #[error("missing node: {node}")]
    MissingNode { node: String },
    #[error("invalid edge to '{node}'")]
    InvalidEdge { node: String },
    #[error("node failed: {node}")]
    NodeFailed {
        node: String,
        #[source]
        source: ChatflowError,
    },
    #[error("max steps exceeded: reached {reached}, limit {max}")]
    MaxStepsExceeded { max: usize, reached: usize },
}
