use std::fmt;

use ahash::AHashMap;

use chatflow_core::{ChatflowError, Value};

use crate::config::ExecutionConfig;
use crate::error::GraphError;
use crate::interrupt::GraphInterrupt;
use crate::state::{GraphState, StateSchema, StateUpdate};

/// Run-scoped data visible to every step. `resume` is populated only when
/// re-entering the node that previously interrupted the run.
#[derive(Clone, Debug, Default)]
pub struct GraphContext {
    pub thread_id: String,
    pub resume: Option<Value>,
}

impl GraphContext {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            resume: None,
        }
    }
}

/// What a step produced: a state delta, or a request to pause the run and
/// hand control back to the caller.
pub enum NodeOutput<S: StateSchema> {
    Update(StateUpdate<S>),
    Interrupt(Value),
}

#[async_trait::async_trait]
pub trait StepNode<S: StateSchema>: Send + Sync {
    async fn run(
        &self,
        state: GraphState<S>,
        context: &GraphContext,
    ) -> Result<NodeOutput<S>, ChatflowError>;
}

/// Where control goes after a step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Node(String),
    End,
}

/// Routing decision object for conditional edges. Implemented as a value
/// type rather than a closure so every possible destination can be checked
/// at build time via `targets`.
pub trait Router<S: StateSchema>: Send + Sync {
    fn route(&self, state: &GraphState<S>) -> Transition;
    fn targets(&self) -> Vec<Transition>;
}

enum EdgeSpec<S: StateSchema> {
    Direct(Transition),
    Conditional(Box<dyn Router<S>>),
}

pub struct GraphBuilder<S: StateSchema> {
    nodes: AHashMap<String, Box<dyn StepNode<S>>>,
    edges: AHashMap<String, EdgeSpec<S>>,
    entry: Option<String>,
}

impl<S: StateSchema> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateSchema> GraphBuilder<S> {
    pub fn new() -> Self {
        Self {
            nodes: AHashMap::new(),
            edges: AHashMap::new(),
            entry: None,
        }
    }

    pub fn add_node<N>(mut self, name: &str, node: N) -> Self
    where
        N: StepNode<S> + 'static,
    {
        self.nodes.insert(name.to_string(), Box::new(node));
        self
    }

    pub fn add_boxed_node(mut self, name: &str, node: Box<dyn StepNode<S>>) -> Self {
        self.nodes.insert(name.to_string(), node);
        self
    }

    pub fn set_entry(mut self, name: &str) -> Self {
        self.entry = Some(name.to_string());
        self
    }

    pub fn add_edge(mut self, from: &str, to: Transition) -> Self {
        self.edges.insert(from.to_string(), EdgeSpec::Direct(to));
        self
    }

    pub fn add_conditional_edge<R>(mut self, from: &str, router: R) -> Self
    where
        R: Router<S> + 'static,
    {
        self.edges
            .insert(from.to_string(), EdgeSpec::Conditional(Box::new(router)));
        self
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Validates that the entry point and every edge destination name a
    /// registered node, then freezes the graph.
    pub fn build(self) -> Result<CompiledGraph<S>, GraphError> {
        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::MissingNode { node: entry });
        }
        for spec in self.edges.values() {
            let targets = match spec {
                EdgeSpec::Direct(target) => vec![target.clone()],
                EdgeSpec::Conditional(router) => router.targets(),
            };
            for target in targets {
                if let Transition::Node(name) = target {
                    if !self.nodes.contains_key(&name) {
                        return Err(GraphError::InvalidEdge { node: name });
                    }
                }
            }
        }
        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
        })
    }
}

/// Terminal state of one invocation.
pub enum RunOutcome<S: StateSchema> {
    Complete(GraphState<S>),
    Interrupted(GraphInterrupt<S>),
}

// Manual impl so the schema type is not required to be Debug.
impl<S: StateSchema> fmt::Debug for RunOutcome<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Complete(_) => f.write_str("Complete"),
            RunOutcome::Interrupted(interrupt) => {
                f.debug_tuple("Interrupted").field(&interrupt.node).finish()
            }
        }
    }
}

/// Executable form of a graph. Holds no run-specific state, so a single
/// compiled graph is safe to share across concurrent runs.
pub struct CompiledGraph<S: StateSchema> {
    nodes: AHashMap<String, Box<dyn StepNode<S>>>,
    edges: AHashMap<String, EdgeSpec<S>>,
    entry: String,
}

impl<S: StateSchema> fmt::Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        nodes.sort_unstable();
        f.debug_struct("CompiledGraph")
            .field("entry", &self.entry)
            .field("nodes", &nodes)
            .finish_non_exhaustive()
    }
}

impl<S: StateSchema> CompiledGraph<S> {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub async fn invoke(
        &self,
        state: GraphState<S>,
        config: &ExecutionConfig,
        context: &GraphContext,
    ) -> Result<RunOutcome<S>, GraphError> {
        self.run_from(self.entry.clone(), state, config, context.clone())
            .await
    }

    /// Re-enters the exact node that interrupted, with the external answer
    /// exposed through `GraphContext::resume`. The graph is not restarted
    /// from its entry point.
    pub async fn resume(
        &self,
        interrupt: GraphInterrupt<S>,
        answer: Value,
        config: &ExecutionConfig,
        context: &GraphContext,
    ) -> Result<RunOutcome<S>, GraphError> {
        let mut context = context.clone();
        context.resume = Some(answer);
        self.run_from(interrupt.node, interrupt.state, config, context)
            .await
    }

    async fn run_from(
        &self,
        start: String,
        mut state: GraphState<S>,
        config: &ExecutionConfig,
        mut context: GraphContext,
    ) -> Result<RunOutcome<S>, GraphError> {
        let mut current = start;
        let mut steps = 0usize;
        loop {
            steps += 1;
            if steps > config.max_steps {
                return Err(GraphError::MaxStepsExceeded {
                    max: config.max_steps,
                    reached: steps,
                });
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::MissingNode {
                    node: current.clone(),
                })?;

            let output = node
                .run(state.clone(), &context)
                .await
                .map_err(|source| GraphError::NodeFailed {
                    node: current.clone(),
                    source,
                })?;

            // A resume payload is consumed by the first step that sees it.
            context.resume = None;

            match output {
                NodeOutput::Update(update) => {
                    state = state.apply(update);
                }
                NodeOutput::Interrupt(payload) => {
                    return Ok(RunOutcome::Interrupted(GraphInterrupt {
                        node: current,
                        state,
                        payload,
                    }));
                }
            }

            match self.edges.get(&current) {
                Some(EdgeSpec::Direct(Transition::Node(next))) => current = next.clone(),
                Some(EdgeSpec::Direct(Transition::End)) => break,
                Some(EdgeSpec::Conditional(router)) => match router.route(&state) {
                    Transition::Node(next) => current = next,
                    Transition::End => break,
                },
                None => break,
            }
        }
        Ok(RunOutcome::Complete(state))
    }
}
