use std::sync::Arc;

use tracing::{debug, error};

use weft_core::backend::{ModelBackend, ModelRequest, ModelResponse};
use weft_core::messages::{ChatMessage, Role};
use weft_core::tools::ToolDefinition;

use crate::error::EngineError;
use crate::prefix_cache::{tools_hash, PromptPrefixCache};
use crate::state::OrchestrationRequest;
use crate::tool_loop::truncate::{cap_context, TruncationLimits};

/// The single path every node takes to the model backend.
///
/// Caps the outgoing context and records the prompt prefix before each call.
pub struct ModelClient {
    backend: Arc<dyn ModelBackend>,
    prefixes: Arc<PromptPrefixCache>,
    limits: TruncationLimits,
}

impl ModelClient {
    pub fn new(backend: Arc<dyn ModelBackend>, prefixes: Arc<PromptPrefixCache>, limits: TruncationLimits) -> Self {
        Self {
            backend,
            prefixes,
            limits,
        }
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Send `messages` to the model. `tools: None` asks for plain text.
    pub async fn complete(
        &self,
        request: &OrchestrationRequest,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ModelResponse, EngineError> {
        self.send(request, messages, tools, true).await
    }

    /// Like [`complete`](Self::complete), for calls whose preamble is not the
    /// turn's conversation prompt (planning, tool-less finalization). These
    /// are neither looked up nor stored in the prefix cache.
    pub async fn complete_aside(
        &self,
        request: &OrchestrationRequest,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ModelResponse, EngineError> {
        self.send(request, messages, tools, false).await
    }

    async fn send(
        &self,
        request: &OrchestrationRequest,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        track_prefix: bool,
    ) -> Result<ModelResponse, EngineError> {
        let messages = cap_context(messages, &self.limits);
        if track_prefix {
            self.record_prefix(request, &messages, tools);
        }

        let model_request = ModelRequest::new(messages, tools.map(<[ToolDefinition]>::to_vec));
        match self.backend.complete(&model_request).await {
            Ok(response) => {
                debug!(
                    backend = self.backend.name(),
                    tool_calls = response.tool_calls.len(),
                    text_chars = response.text.len(),
                    "model responded"
                );
                Ok(response)
            }
            Err(e) => {
                error!(backend = self.backend.name(), kind = e.error_kind(), error = %e, "model call failed");
                Err(e.into())
            }
        }
    }

    fn record_prefix(&self, request: &OrchestrationRequest, messages: &[ChatMessage], tools: Option<&[ToolDefinition]>) {
        let system_prompt = messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let hash = tools_hash(tools.unwrap_or_default());
        let model = self.backend.model();

        let hit = self
            .prefixes
            .get_cached_prefix(&request.conversation_id, model, system_prompt, &hash, &request.mode);
        if hit.is_none() && !self.prefixes.has_entry(&request.conversation_id, model) {
            let _ = self
                .prefixes
                .store_prefix(&request.conversation_id, model, system_prompt, &hash, &request.mode);
        }
    }
}
