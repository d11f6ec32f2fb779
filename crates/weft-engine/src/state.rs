use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use weft_core::backend::ModelResponse;
use weft_core::ids::{ConversationId, RunId, ToolCallId};
use weft_core::messages::ChatMessage;
use weft_core::tools::{ToolContext, ToolDefinition, ToolResult};

use crate::tool_loop::LoopMemory;

/// Identifier of a node within an orchestration graph.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the runner does after a node returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Next(NodeId),
    End,
}

/// Reports whether a proposed tool call was cancelled from outside the run.
#[derive(Clone)]
pub struct CancellationCheck(Arc<dyn Fn(&ToolCallId) -> bool + Send + Sync>);

impl CancellationCheck {
    pub fn new(f: impl Fn(&ToolCallId) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn never() -> Self {
        Self::new(|_| false)
    }

    pub fn is_cancelled(&self, id: &ToolCallId) -> bool {
        (self.0)(id)
    }
}

impl Default for CancellationCheck {
    fn default() -> Self {
        Self::never()
    }
}

impl fmt::Debug for CancellationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancellationCheck")
    }
}

/// Everything a run needs to know about the user's turn.
#[derive(Clone, Debug)]
pub struct OrchestrationRequest {
    pub conversation_id: ConversationId,
    pub run_id: RunId,
    pub user_input: String,
    pub project_root: PathBuf,
    pub tools: Vec<ToolDefinition>,
    /// Assistant mode label, e.g. `agent` or `chat`.
    pub mode: String,
    /// Earlier turns of the conversation, oldest first.
    pub history: Vec<ChatMessage>,
    pub cancellation: CancellationCheck,
    /// Aborts the whole run between nodes and between loop iterations.
    pub abort: CancellationToken,
}

impl OrchestrationRequest {
    pub fn new(conversation_id: ConversationId, user_input: impl Into<String>) -> Self {
        Self {
            conversation_id,
            run_id: RunId::new(),
            user_input: user_input.into(),
            project_root: PathBuf::from("."),
            tools: Vec::new(),
            mode: "agent".to_string(),
            history: Vec::new(),
            cancellation: CancellationCheck::never(),
            abort: CancellationToken::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationCheck) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    /// Tool schema to offer the model, `None` when no tools are available.
    pub fn tool_schema(&self) -> Option<&[ToolDefinition]> {
        (!self.tools.is_empty()).then_some(self.tools.as_slice())
    }

    pub fn tool_context(&self) -> ToolContext {
        ToolContext {
            conversation_id: self.conversation_id.clone(),
            run_id: self.run_id.clone(),
            project_root: self.project_root.clone(),
        }
    }
}

/// State handed from node to node. Nodes consume it and return a new one.
#[derive(Clone, Debug)]
pub struct OrchestrationState {
    request: Arc<OrchestrationRequest>,
    messages: Vec<ChatMessage>,
    response: Option<ModelResponse>,
    tool_results: Vec<ToolResult>,
    loop_memory: LoopMemory,
    transition: Transition,
}

impl OrchestrationState {
    pub fn new(request: OrchestrationRequest) -> Self {
        Self {
            messages: request.history.clone(),
            request: Arc::new(request),
            response: None,
            tool_results: Vec::new(),
            loop_memory: LoopMemory::default(),
            transition: Transition::End,
        }
    }

    pub fn request(&self) -> &OrchestrationRequest {
        &self.request
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Latest model response not yet folded into the conversation.
    pub fn response(&self) -> Option<&ModelResponse> {
        self.response.as_ref()
    }

    pub fn tool_results(&self) -> &[ToolResult] {
        &self.tool_results
    }

    pub fn loop_memory(&self) -> &LoopMemory {
        &self.loop_memory
    }

    pub fn transition(&self) -> &Transition {
        &self.transition
    }

    /// Final assistant text once the run has ended.
    pub fn final_text(&self) -> Option<&str> {
        match self.transition {
            Transition::End => self.response.as_ref().map(|r| r.text.as_str()),
            Transition::Next(_) => None,
        }
    }

    /// Move out the parts the tool loop works on, leaving them empty.
    pub fn take_loop_parts(&mut self) -> (Vec<ChatMessage>, Option<ModelResponse>, LoopMemory) {
        (
            std::mem::take(&mut self.messages),
            self.response.take(),
            std::mem::take(&mut self.loop_memory),
        )
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn push_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_response(mut self, response: Option<ModelResponse>) -> Self {
        self.response = response;
        self
    }

    pub fn with_tool_results(mut self, results: Vec<ToolResult>) -> Self {
        self.tool_results = results;
        self
    }

    pub fn with_loop_memory(mut self, memory: LoopMemory) -> Self {
        self.loop_memory = memory;
        self
    }

    pub fn next(mut self, node: impl Into<NodeId>) -> Self {
        self.transition = Transition::Next(node.into());
        self
    }

    pub fn end(mut self) -> Self {
        self.transition = Transition::End;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req = OrchestrationRequest::new(ConversationId::from_raw("conv-1"), "hi");
        assert_eq!(req.mode, "agent");
        assert!(req.tool_schema().is_none());
        assert!(!req.cancellation.is_cancelled(&ToolCallId::from_raw("x")));
        assert!(!req.abort.is_cancelled());
    }

    #[test]
    fn cancellation_check_consults_closure() {
        let check = CancellationCheck::new(|id| id.as_str() == "c2");
        assert!(check.is_cancelled(&ToolCallId::from_raw("c2")));
        assert!(!check.is_cancelled(&ToolCallId::from_raw("c1")));
    }

    #[test]
    fn state_starts_from_history() {
        let req = OrchestrationRequest::new(ConversationId::from_raw("conv-1"), "hi")
            .with_history(vec![ChatMessage::user("earlier")]);
        let state = OrchestrationState::new(req);
        assert_eq!(state.messages().len(), 1);
        assert!(state.response().is_none());
    }

    #[test]
    fn builders_replace_fields() {
        let req = OrchestrationRequest::new(ConversationId::from_raw("conv-1"), "hi");
        let state = OrchestrationState::new(req)
            .push_message(ChatMessage::user("hi"))
            .with_response(Some(ModelResponse::text("done")))
            .next("final_response");
        assert_eq!(state.transition(), &Transition::Next(NodeId::from("final_response")));
        assert_eq!(state.final_text(), None);

        let ended = state.end();
        assert_eq!(ended.final_text(), Some("done"));
    }
}
