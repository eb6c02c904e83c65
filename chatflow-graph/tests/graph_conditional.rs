use chatflow_core::ChatflowError;
use chatflow_graph::{
    ExecutionConfig, GraphBuilder, GraphContext, GraphError, GraphState, NodeOutput, Router,
    RunOutcome, StateSchema, StateUpdate, StepNode, Transition,
};

#[derive(Clone, Default, Debug, PartialEq)]
struct RouteState {
    key: Option<String>,
    visited: Vec<String>,
}

#[derive(Debug, Default)]
struct RouteDelta {
    key: Option<String>,
    visited: Vec<String>,
}

impl StateSchema for RouteState {
    type Update = RouteDelta;

    fn apply(current: &Self, update: RouteDelta) -> Self {
        let mut next = current.clone();
        if update.key.is_some() {
            next.key = update.key;
        }
        next.visited.extend(update.visited);
        next
    }
}

struct Emit(&'static str);

#[async_trait::async_trait]
impl StepNode<RouteState> for Emit {
    async fn run(
        &self,
        _state: GraphState<RouteState>,
        _context: &GraphContext,
    ) -> Result<NodeOutput<RouteState>, ChatflowError> {
        Ok(NodeOutput::Update(StateUpdate::new(RouteDelta {
            key: None,
            visited: vec![self.0.to_string()],
        })))
    }
}

struct SetKey(&'static str);

#[async_trait::async_trait]
impl StepNode<RouteState> for SetKey {
    async fn run(
        &self,
        _state: GraphState<RouteState>,
        _context: &GraphContext,
    ) -> Result<NodeOutput<RouteState>, ChatflowError> {
        Ok(NodeOutput::Update(StateUpdate::new(RouteDelta {
            key: Some(self.0.to_string()),
            visited: vec!["decide".to_string()],
        })))
    }
}

struct KeyRouter {
    routes: Vec<(String, Transition)>,
    default: Transition,
}

impl Router<RouteState> for KeyRouter {
    fn route(&self, state: &GraphState<RouteState>) -> Transition {
        let key = state.data.key.as_deref().unwrap_or_default();
        self.routes
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, target)| target.clone())
            .unwrap_or_else(|| self.default.clone())
    }

    fn targets(&self) -> Vec<Transition> {
        let mut targets: Vec<Transition> =
            self.routes.iter().map(|(_, t)| t.clone()).collect();
        targets.push(self.default.clone());
        targets
    }
}

fn two_way(decider: SetKey) -> chatflow_graph::CompiledGraph<RouteState> {
    GraphBuilder::default()
        .add_node("decide", decider)
        .add_node("left", Emit("left"))
        .add_node("right", Emit("right"))
        .set_entry("decide")
        .add_conditional_edge(
            "decide",
            KeyRouter {
                routes: vec![
                    ("go_left".to_string(), Transition::Node("left".into())),
                    ("go_right".to_string(), Transition::Node("right".into())),
                ],
                default: Transition::End,
            },
        )
        .add_edge("left", Transition::End)
        .add_edge("right", Transition::End)
        .build()
        .unwrap()
}

async fn run(graph: &chatflow_graph::CompiledGraph<RouteState>) -> RouteState {
    match graph
        .invoke(
            GraphState::new(RouteState::default()),
            &ExecutionConfig::default(),
            &GraphContext::new("t1"),
        )
        .await
        .unwrap()
    {
        RunOutcome::Complete(state) => state.data,
        RunOutcome::Interrupted(_) => panic!("unexpected interrupt"),
    }
}

#[tokio::test]
async fn routes_on_emitted_key() {
    let state = run(&two_way(SetKey("go_right"))).await;
    assert_eq!(state.visited, vec!["decide", "right"]);
}

#[tokio::test]
async fn unknown_key_falls_back_to_default() {
    let state = run(&two_way(SetKey("nonsense"))).await;
    assert_eq!(state.visited, vec!["decide"]);
}

#[tokio::test]
async fn conditional_targets_are_checked_at_build_time() {
    let err = GraphBuilder::default()
        .add_node("decide", SetKey("x"))
        .set_entry("decide")
        .add_conditional_edge(
            "decide",
            KeyRouter {
                routes: vec![("x".to_string(), Transition::Node("ghost".into()))],
                default: Transition::End,
            },
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidEdge { node } if node == "ghost"));
}
