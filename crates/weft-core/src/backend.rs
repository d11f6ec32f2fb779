use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::messages::{ChatMessage, ToolCall};
use crate::tools::ToolDefinition;

/// One model call: the ordered conversation plus the tool schema, if any.
/// `tools: None` asks the model for a plain-text answer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
}

impl ModelRequest {
    pub fn new(messages: Vec<ChatMessage>, tools: Option<Vec<ToolDefinition>>) -> Self {
        Self { messages, tools }
    }

    pub fn offers_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The response as an assistant message for the running conversation.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::assistant_with_calls(self.text.clone(), self.tool_calls.clone())
    }
}

/// Trait implemented by each model backend (local runtime, hosted API, mocks).
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn offers_tools_requires_non_empty_schema() {
        assert!(!ModelRequest::new(vec![], None).offers_tools());
        assert!(!ModelRequest::new(vec![], Some(vec![])).offers_tools());
        let def = ToolDefinition::new("grep", "search", json!({}));
        assert!(ModelRequest::new(vec![], Some(vec![def])).offers_tools());
    }

    #[test]
    fn response_to_message_keeps_calls() {
        let call = ToolCall::new("c1", "list_files", json!({"path": "."}));
        let response = ModelResponse::with_calls("looking", vec![call]);
        let msg = response.to_message();
        assert_eq!(msg.content, "looking");
        assert_eq!(msg.tool_calls.len(), 1);
        assert!(response.has_tool_calls());
    }

    #[test]
    fn response_deserializes_with_missing_fields() {
        let response: ModelResponse = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert!(!response.has_tool_calls());
    }
}
