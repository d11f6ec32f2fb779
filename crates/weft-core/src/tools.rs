use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, RunId, ToolCallId};
use crate::messages::ToolCall;

/// Context available to the executor for one batch.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub conversation_id: ConversationId,
    pub run_id: RunId,
    pub project_root: PathBuf,
}

/// Outcome of one tool call. Failures are data, not errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: ToolCallId,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self {
            tool_call_id,
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self {
            tool_call_id,
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool definition offered to the model as part of the request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters_schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
        }
    }
}

/// Executes an accepted batch of tool calls.
///
/// Implementations return one result per call, correlated by `tool_call_id`.
/// A call that fails yields a result with `is_error` set; a call missing from
/// the returned list is treated as failed by the caller.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute_batch(&self, calls: Vec<ToolCall>, ctx: &ToolContext) -> Vec<ToolResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_constructors_set_error_flag() {
        let ok = ToolResult::success(ToolCallId::from_raw("a"), "done");
        let err = ToolResult::error(ToolCallId::from_raw("b"), "missing file");
        assert!(!ok.is_error);
        assert!(err.is_error);
        assert_eq!(err.content, "missing file");
    }

    #[test]
    fn definition_serde_shape() {
        let def = ToolDefinition::new("read_file", "Read a file", serde_json::json!({"type": "object"}));
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["name"], "read_file");
        assert_eq!(value["parameters_schema"]["type"], "object");
    }
}
