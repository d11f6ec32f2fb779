pub mod backend;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod tools;

pub use backend::{ModelBackend, ModelRequest, ModelResponse};
pub use errors::BackendError;
pub use ids::{ConversationId, RunId, ToolCallId};
pub use messages::{ChatMessage, Role, ToolCall};
pub use tools::{ToolContext, ToolDefinition, ToolExecutor, ToolResult};
