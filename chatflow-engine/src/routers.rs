use chatflow_graph::{GraphState, Router, Transition};

use crate::state::ChatState;

/// Routing table for a `conditional` edge: maps the condition key emitted
/// by the upstream condition node to a destination. A key with no mapping
/// falls back to the default destination.
pub struct ConditionRouter {
    routes: Vec<(String, Transition)>,
    default: Transition,
}

impl ConditionRouter {
    pub fn new(routes: Vec<(String, Transition)>, default: Transition) -> Self {
        Self { routes, default }
    }
}

impl Router<ChatState> for ConditionRouter {
    fn route(&self, state: &GraphState<ChatState>) -> Transition {
        let key = state.data.condition_result.as_deref().unwrap_or_default();
        self.routes
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, target)| target.clone())
            .unwrap_or_else(|| self.default.clone())
    }

    fn targets(&self) -> Vec<Transition> {
        let mut targets: Vec<Transition> =
            self.routes.iter().map(|(_, target)| target.clone()).collect();
        targets.push(self.default.clone());
        targets
    }
}

/// Routing table for a `tool_result` edge: picks the first route whose key
/// appears in the latest message content.
pub struct ToolResultRouter {
    routes: Vec<(String, Transition)>,
    default: Transition,
}

impl ToolResultRouter {
    pub fn new(routes: Vec<(String, Transition)>, default: Transition) -> Self {
        Self { routes, default }
    }
}

impl Router<ChatState> for ToolResultRouter {
    fn route(&self, state: &GraphState<ChatState>) -> Transition {
        let Some(content) = state
            .data
            .last_message()
            .map(|message| message.content.to_lowercase())
        else {
            return self.default.clone();
        };
        self.routes
            .iter()
            .find(|(key, _)| content.contains(&key.to_lowercase()))
            .map(|(_, target)| target.clone())
            .unwrap_or_else(|| self.default.clone())
    }

    fn targets(&self) -> Vec<Transition> {
        let mut targets: Vec<Transition> =
            self.routes.iter().map(|(_, target)| target.clone()).collect();
        targets.push(self.default.clone());
        targets
    }
}
