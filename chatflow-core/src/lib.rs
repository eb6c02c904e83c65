//! Shared vocabulary for chat workflows: messages, tool and model traits,
//! and the common error type.

mod error;
mod llm;
mod message;
mod tool;
mod value;

pub use error::ChatflowError;
pub use llm::{ChatModel, LlmParams, LlmRequest, LlmResponse};
pub use message::{Message, Role, ToolCall, ToolSpec};
pub use tool::{Tool, ToolError};
pub use value::{IntoValue, TryFromValue, Value};
