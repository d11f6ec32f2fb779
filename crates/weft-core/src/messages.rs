use serde::{Deserialize, Serialize};

use crate::ids::ToolCallId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation proposed by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: ToolCallId::from_raw(id),
            name: name.into(),
            arguments,
        }
    }

    /// String argument lookup, ignoring blank values.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One entry of the ordered conversation sent to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<ToolCallId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

// --- Convenience constructors ---

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id),
            ..Self::plain(Role::Tool, content)
        }
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }

    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_serializes_snake_case() {
        let msg = ChatMessage::system("be brief");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "system");
        assert!(value.get("tool_call_id").is_none());
        assert!(value.get("tool_calls").is_none());
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = ChatMessage::tool_result(ToolCallId::from_raw("c7"), "ok");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "c7");
        assert!(msg.is_tool_result());
    }

    #[test]
    fn assistant_with_calls_keeps_calls() {
        let call = ToolCall::new("c1", "read_file", json!({"path": "a.rs"}));
        let msg = ChatMessage::assistant_with_calls("reading", vec![call.clone()]);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls, vec![call]);
    }

    #[test]
    fn str_arg_ignores_blank_and_non_string() {
        let call = ToolCall::new("c1", "write_file", json!({"path": "  ", "mode": 3, "file_path": " a.txt "}));
        assert_eq!(call.str_arg("path"), None);
        assert_eq!(call.str_arg("mode"), None);
        assert_eq!(call.str_arg("file_path"), Some("a.txt"));
    }

    #[test]
    fn char_count_counts_scalar_values() {
        assert_eq!(ChatMessage::user("héllo").char_count(), 5);
    }
}
