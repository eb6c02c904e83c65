//! Typed state-graph runtime: build a graph of async steps over a shared
//! state schema, then run it sequentially with conditional routing, a step
//! ceiling, and interrupt/resume support.

mod config;
mod error;
mod graph;
mod interrupt;
mod state;
mod validate;

pub use config::ExecutionConfig;
pub use error::GraphError;
pub use graph::{
    CompiledGraph, GraphBuilder, GraphContext, NodeOutput, Router, RunOutcome, StepNode,
    Transition,
};
pub use interrupt::GraphInterrupt;
pub use state::{GraphState, StateSchema, StateUpdate};
pub use validate::validate_structure;
