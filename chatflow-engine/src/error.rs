use std::time::Duration;

use thiserror::Error;

use chatflow_core::ChatflowError;
use chatflow_graph::GraphError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("graph has no nodes")]
    EmptyGraph,
    #[error("graph build failed: {0}")]
    Build(String),
    #[error("run timed out after {0:?}")]
    RunTimeout(Duration),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("core error: {0}")]
    Core(#[from] ChatflowError),
}

impl EngineError {
    /// Build failures and timeouts are retried at the run level; anything
    /// else fails the run immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::EmptyGraph
                | EngineError::Build(_)
                | EngineError::RunTimeout(_)
                | EngineError::Store(_)
        )
    }
}
