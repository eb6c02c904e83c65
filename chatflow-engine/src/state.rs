use std::sync::Arc;

use uuid::Uuid;

use chatflow_core::{Message, Role};
use chatflow_graph::StateSchema;

use crate::error::EngineError;
use crate::store::HistoryStore;

/// How many prior messages are pulled into the context window.
pub const HISTORY_WINDOW: usize = 10;

const BASE_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer using the conversation so far and any tool results.";

/// The mutable data threaded through one run. Created fresh per execution
/// and dropped when it ends; only the message delta survives.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub execution_id: Uuid,
    pub session_id: String,
    pub chat_id: Option<String>,
    /// Key emitted by the last condition node, consumed by the next
    /// conditional edge.
    pub condition_result: Option<String>,
    /// Messages `[..context_len]` came from persisted history (plus the
    /// leading system message) and are never written back.
    pub context_len: usize,
    /// Messages `[..initial_len]` existed before the run started; anything
    /// past this index is output produced by the run.
    pub initial_len: usize,
    pub done: bool,
    pub error_message: Option<String>,
}

impl ChatState {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages to persist after the run: the new user turn plus whatever
    /// the run produced.
    pub fn unsaved_messages(&self) -> &[Message] {
        &self.messages[self.context_len.min(self.messages.len())..]
    }

    /// Messages produced by the run itself.
    pub fn produced_messages(&self) -> &[Message] {
        &self.messages[self.initial_len.min(self.messages.len())..]
    }
}

/// Delta a step contributes. Messages append; scalar fields override only
/// when set.
#[derive(Debug, Default)]
pub struct ChatDelta {
    pub messages: Vec<Message>,
    pub condition_result: Option<String>,
    pub done: bool,
    pub error_message: Option<String>,
}

impl ChatDelta {
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

impl StateSchema for ChatState {
    type Update = ChatDelta;

    fn apply(current: &Self, update: ChatDelta) -> Self {
        let mut next = current.clone();
        next.messages.extend(update.messages);
        if update.condition_result.is_some() {
            next.condition_result = update.condition_result;
        }
        if update.done {
            next.done = true;
        }
        if update.error_message.is_some() {
            next.error_message = update.error_message;
        }
        next
    }
}

/// Builds the initial run state from persisted history and reconciles the
/// state after the run so only newly produced messages are written back.
pub struct StateManager {
    history: Arc<dyn HistoryStore>,
}

impl StateManager {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self { history }
    }

    pub async fn create_initial_state(
        &self,
        input_message: &str,
        execution_id: Uuid,
        session_id: &str,
        chat_id: Option<String>,
    ) -> Result<ChatState, EngineError> {
        let prior = self.history.get_messages(session_id).await?;
        let window_start = prior.len().saturating_sub(HISTORY_WINDOW);

        let mut messages = Vec::with_capacity(prior.len() - window_start + 2);
        messages.push(Message::system(BASE_SYSTEM_PROMPT));
        messages.extend_from_slice(&prior[window_start..]);
        let context_len = messages.len();
        messages.push(Message::user(input_message.trim()));
        let initial_len = messages.len();

        Ok(ChatState {
            messages,
            execution_id,
            session_id: session_id.to_string(),
            chat_id,
            condition_result: None,
            context_len,
            initial_len,
            done: false,
            error_message: None,
        })
    }

    /// Persists exactly the messages the context window did not already
    /// contain. Never re-persists loaded history or the leading system
    /// message.
    pub async fn save_history(&self, state: &ChatState) -> Result<(), EngineError> {
        let new_messages = state.unsaved_messages();
        if new_messages.is_empty() {
            return Ok(());
        }
        self.history
            .add_messages(&state.session_id, new_messages)
            .await?;
        Ok(())
    }

    /// The user-visible payload: assistant and tool messages produced by
    /// the run. Human/system messages from the context window are not new
    /// output and are excluded.
    pub fn result_messages(&self, state: &ChatState) -> Vec<Message> {
        state
            .produced_messages()
            .iter()
            .filter(|message| matches!(message.role, Role::Assistant | Role::Tool))
            .cloned()
            .collect()
    }
}
