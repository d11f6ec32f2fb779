//! The four nodes of the default orchestration graph.
//!
//! `planning` → `initial_response` → `tool_loop` (repeats) → `final_response`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use weft_core::backend::ModelResponse;
use weft_core::messages::{ChatMessage, Role};

use crate::error::EngineError;
use crate::graph::OrchestrationNode;
use crate::model_client::ModelClient;
use crate::plan::{PlanProgress, PlanStore};
use crate::state::{OrchestrationRequest, OrchestrationState};
use crate::tool_loop::{LoopOutcome, ToolLoopController};

pub const PLANNING: &str = "planning";
pub const INITIAL_RESPONSE: &str = "initial_response";
pub const TOOL_LOOP: &str = "tool_loop";
pub const FINAL_RESPONSE: &str = "final_response";

const PLANNING_PROMPT: &str = "Break the user's request into a short markdown checklist, one `- [ ]` item \
per step. Reply with the checklist only.";

/// How the model is expected to record progress against the plan.
pub const PLAN_CONVENTION: &str = "Work through the plan in order. When an item is finished, update the \
plan so its line reads `- [x]` instead of `- [ ]`. The turn cannot end while items are still open.";

/// Stable system prompt for a request. Depends only on fields that stay
/// fixed for a conversation so the prefix can be reused across turns.
pub fn system_prompt(request: &OrchestrationRequest) -> String {
    format!(
        "You are a coding assistant working in the project at {}. Mode: {}.\n\
         Use the available tools to inspect and change the project. Do not repeat a tool call \
         whose result you already have. When the task is finished, reply without tool calls.",
        request.project_root.display(),
        request.mode,
    )
}

/// Asks the model for a checklist before the first turn, in agent mode,
/// when the conversation has no plan yet.
pub struct PlanningNode {
    model: Arc<ModelClient>,
    plans: Arc<PlanStore>,
    enabled: bool,
}

impl PlanningNode {
    pub fn new(model: Arc<ModelClient>, plans: Arc<PlanStore>, enabled: bool) -> Self {
        Self { model, plans, enabled }
    }
}

#[async_trait]
impl OrchestrationNode for PlanningNode {
    fn id(&self) -> &str {
        PLANNING
    }

    #[instrument(skip_all, fields(node = PLANNING))]
    async fn run(&self, state: OrchestrationState) -> Result<OrchestrationState, EngineError> {
        let request = state.request();
        let wanted = self.enabled
            && request.mode == "agent"
            && request.tool_schema().is_some()
            && !self.plans.progress_for(&request.conversation_id).is_in_effect();
        if !wanted {
            return Ok(state.next(INITIAL_RESPONSE));
        }

        let messages = [ChatMessage::system(PLANNING_PROMPT), ChatMessage::user(request.user_input.clone())];
        let response = self.model.complete_aside(request, &messages, None).await?;
        let progress = PlanProgress::of(&response.text);
        if progress.is_in_effect() {
            info!(items = progress.total, "plan created");
            self.plans.set(&request.conversation_id, response.text.trim());
        } else {
            debug!("planning reply had no checklist items");
        }
        Ok(state.next(INITIAL_RESPONSE))
    }
}

/// Builds the conversation for this turn and takes the first model turn
/// with the tool schema attached.
pub struct InitialResponseNode {
    model: Arc<ModelClient>,
    plans: Arc<PlanStore>,
}

impl InitialResponseNode {
    pub fn new(model: Arc<ModelClient>, plans: Arc<PlanStore>) -> Self {
        Self { model, plans }
    }
}

#[async_trait]
impl OrchestrationNode for InitialResponseNode {
    fn id(&self) -> &str {
        INITIAL_RESPONSE
    }

    #[instrument(skip_all, fields(node = INITIAL_RESPONSE))]
    async fn run(&self, state: OrchestrationState) -> Result<OrchestrationState, EngineError> {
        let request = state.request();
        let mut messages = Vec::with_capacity(state.messages().len() + 3);
        messages.push(ChatMessage::system(system_prompt(request)));
        messages.extend(state.messages().iter().filter(|m| m.role != Role::System).cloned());

        let plan = self.plans.get(&request.conversation_id);
        if !plan.trim().is_empty() {
            messages.push(ChatMessage::system(format!("Current plan:\n{plan}\n\n{PLAN_CONVENTION}")));
        }
        messages.push(ChatMessage::user(request.user_input.clone()));

        let response = self.model.complete(request, &messages, request.tool_schema()).await?;
        Ok(state
            .with_messages(messages)
            .with_response(Some(response))
            .next(TOOL_LOOP))
    }
}

/// Hands the pending response to the controller and routes on its outcome.
pub struct ToolLoopNode {
    controller: Arc<ToolLoopController>,
}

impl ToolLoopNode {
    pub fn new(controller: Arc<ToolLoopController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl OrchestrationNode for ToolLoopNode {
    fn id(&self) -> &str {
        TOOL_LOOP
    }

    #[instrument(skip_all, fields(node = TOOL_LOOP))]
    async fn run(&self, mut state: OrchestrationState) -> Result<OrchestrationState, EngineError> {
        let (messages, response, memory) = state.take_loop_parts();
        let run = self.controller.drive(state.request(), messages, response, memory).await?;

        let state = state
            .with_messages(run.messages)
            .with_tool_results(run.tool_results)
            .with_loop_memory(run.memory);
        Ok(match run.outcome {
            LoopOutcome::Finished { response }
            | LoopOutcome::RepeatShortCircuited { response }
            | LoopOutcome::Stalled { response } => state.with_response(Some(response)).next(FINAL_RESPONSE),
            LoopOutcome::Diversified { target } => {
                debug!(target = %target, "diversifying");
                state.with_response(None).next(TOOL_LOOP)
            }
            LoopOutcome::PlanIncomplete { progress } => {
                debug!(remaining = progress.remaining(), "plan incomplete");
                state.with_response(None).next(TOOL_LOOP)
            }
            LoopOutcome::Continue => state.with_response(None).next(TOOL_LOOP),
        })
    }
}

/// Produces the final assistant text and ends the run.
pub struct FinalResponseNode {
    model: Arc<ModelClient>,
}

impl FinalResponseNode {
    pub fn new(model: Arc<ModelClient>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl OrchestrationNode for FinalResponseNode {
    fn id(&self) -> &str {
        FINAL_RESPONSE
    }

    #[instrument(skip_all, fields(node = FINAL_RESPONSE))]
    async fn run(&self, state: OrchestrationState) -> Result<OrchestrationState, EngineError> {
        let usable = state
            .response()
            .filter(|r| !r.has_tool_calls() && !r.text.trim().is_empty())
            .cloned();
        let response = match usable {
            Some(r) => r,
            None => {
                let text = self
                    .model
                    .complete_aside(state.request(), state.messages(), None)
                    .await?
                    .text;
                ModelResponse::text(text)
            }
        };

        let already_recorded = state
            .messages()
            .last()
            .is_some_and(|m| m.role == Role::Assistant && m.tool_calls.is_empty() && m.content == response.text);
        let state = if already_recorded {
            state
        } else {
            state.push_message(ChatMessage::assistant(response.text.clone()))
        };
        Ok(state.with_response(Some(response)).end())
    }
}
