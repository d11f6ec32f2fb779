use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use weft_core::backend::ModelResponse;
use weft_core::ids::ToolCallId;
use weft_core::messages::{ChatMessage, ToolCall};
use weft_core::tools::{ToolExecutor, ToolResult};
use weft_telemetry::LoopTelemetry;

use crate::error::EngineError;
use crate::model_client::ModelClient;
use crate::plan::{PlanProgress, PlanStore};
use crate::state::{CancellationCheck, OrchestrationRequest};

use super::guards::LoopMemory;
use super::signature::{dedupe, BatchSignature, DedupedCall};
use super::ToolLoopConfig;

const ALREADY_COMPLETED: &str = "Those tool calls were already completed in the previous step and their \
results are above. Continue with the next step instead of repeating them.";

const STOP_EXPLORING: &str = "You have explored enough. Stop calling tools and answer with what you \
have found so far.";

const CANCELLED: &str = "cancelled";

/// How one controller invocation ended.
#[derive(Clone, Debug, PartialEq)]
pub enum LoopOutcome {
    /// The model stopped calling tools, or announced completion, and any plan
    /// in effect is complete.
    Finished { response: ModelResponse },
    /// The model re-proposed the batch it just ran; this is its next turn.
    RepeatShortCircuited { response: ModelResponse },
    /// Exploration stalled; a plain-text answer with no tool calls.
    Stalled { response: ModelResponse },
    /// A write to `target` was intercepted; the model has been asked for
    /// different work.
    Diversified { target: String },
    /// The model tried to finish with plan items still open.
    PlanIncomplete { progress: PlanProgress },
    /// The per-invocation iteration budget ran out.
    Continue,
}

impl LoopOutcome {
    /// The response to finalize with, for outcomes that end the loop.
    pub fn final_response(&self) -> Option<&ModelResponse> {
        match self {
            Self::Finished { response } | Self::RepeatShortCircuited { response } | Self::Stalled { response } => {
                Some(response)
            }
            Self::Diversified { .. } | Self::PlanIncomplete { .. } | Self::Continue => None,
        }
    }
}

/// Result of [`ToolLoopController::drive`]: the outcome plus the updated
/// conversation and loop memory to carry into the next state.
#[derive(Debug)]
pub struct LoopRun {
    pub outcome: LoopOutcome,
    pub messages: Vec<ChatMessage>,
    pub tool_results: Vec<ToolResult>,
    pub memory: LoopMemory,
}

/// What happens to one distinct call of a batch. A call that runs is
/// executed under the first of its ids that was not cancelled.
enum Fate {
    Run(ToolCallId),
    Intercepted(String),
    Cancelled,
}

/// Alternates model turns and tool batches, applying the loop guards to
/// every proposed batch.
pub struct ToolLoopController {
    model: Arc<ModelClient>,
    executor: Arc<dyn ToolExecutor>,
    plans: Arc<PlanStore>,
    telemetry: Arc<LoopTelemetry>,
    config: ToolLoopConfig,
}

impl ToolLoopController {
    pub fn new(
        model: Arc<ModelClient>,
        executor: Arc<dyn ToolExecutor>,
        plans: Arc<PlanStore>,
        telemetry: Arc<LoopTelemetry>,
        config: ToolLoopConfig,
    ) -> Self {
        Self {
            model,
            executor,
            plans,
            telemetry,
            config,
        }
    }

    pub fn config(&self) -> &ToolLoopConfig {
        &self.config
    }

    /// Run up to `max_iterations_per_step` model turns.
    ///
    /// `response` is the pending model turn, if the caller already has one;
    /// otherwise the model is asked first. Tool failures are fed back to the
    /// model as results; only backend failures and aborts are errors.
    #[instrument(skip_all, fields(conversation_id = %request.conversation_id, run_id = %request.run_id))]
    pub async fn drive(
        &self,
        request: &OrchestrationRequest,
        mut messages: Vec<ChatMessage>,
        response: Option<ModelResponse>,
        mut memory: LoopMemory,
    ) -> Result<LoopRun, EngineError> {
        let tools = request.tool_schema();
        let mut response = match response {
            Some(r) => r,
            None => self.model.complete(request, &messages, tools).await?,
        };
        let mut tool_results = Vec::new();

        for iteration in 1..=self.config.max_iterations_per_step {
            if request.abort.is_cancelled() {
                warn!(iteration, "tool loop aborted");
                return Err(EngineError::Aborted);
            }
            self.telemetry.record_iteration();
            if memory.observe_status(&response.text) {
                self.telemetry.record_repeated_update();
            }

            if !response.has_tool_calls() {
                let outcome = self.enforce_plan(request, &mut messages, &response);
                return Ok(LoopRun {
                    outcome,
                    messages,
                    tool_results,
                    memory,
                });
            }

            let groups = dedupe(&response.tool_calls);
            let duplicates: usize = groups.iter().map(|g| g.duplicate_ids.len()).sum();
            if duplicates > 0 {
                debug!(duplicates, "collapsed duplicate tool calls");
                self.telemetry.record_repeated_signatures(duplicates as u64);
            }

            let cancellation = &request.cancellation;
            let any_cancelled = response.tool_calls.iter().any(|c| cancellation.is_cancelled(&c.id));
            let mut fates: Vec<Fate> = groups
                .iter()
                .map(|g| match g.all_ids().find(|id| !cancellation.is_cancelled(id)) {
                    Some(id) => Fate::Run(id.clone()),
                    None => Fate::Cancelled,
                })
                .collect();

            let batch = BatchSignature::of(
                groups
                    .iter()
                    .zip(&fates)
                    .filter(|(_, fate)| matches!(fate, Fate::Run(_)))
                    .map(|(g, _)| &g.signature),
            );

            if memory.is_exact_repeat(&batch) {
                info!(calls = batch.len(), "exact repeat of previous batch, short-circuiting");
                self.telemetry.record_repeated_signatures(batch.len() as u64);
                messages.push(ChatMessage::system(ALREADY_COMPLETED));
                let response = self.model.complete(request, &messages, tools).await?;
                return Ok(LoopRun {
                    outcome: LoopOutcome::RepeatShortCircuited { response },
                    messages,
                    tool_results,
                    memory,
                });
            }

            let classifier = &self.config.classifier;
            let all_read_only = !batch.is_empty()
                && groups
                    .iter()
                    .zip(&fates)
                    .filter(|(_, fate)| matches!(fate, Fate::Run(_)))
                    .all(|(g, _)| classifier.is_read_only(&g.call.name));
            if memory.observe_read_only(
                &batch,
                all_read_only,
                self.config.read_only_streak_limit,
                self.config.read_only_repeat_limit,
            ) {
                info!(streak = memory.read_only_streak(), "read-only exploration stalled, finalizing");
                messages.push(ChatMessage::system(STOP_EXPLORING));
                let mut response = self.model.complete_aside(request, &messages, None).await?;
                response.tool_calls.clear();
                return Ok(LoopRun {
                    outcome: LoopOutcome::Stalled { response },
                    messages,
                    tool_results,
                    memory,
                });
            }

            let mut diversify_target = None;
            for (group, fate) in groups.iter().zip(fates.iter_mut()) {
                if !matches!(fate, Fate::Run(_)) {
                    continue;
                }
                let Some(target) = classifier.write_target(&group.call) else {
                    continue;
                };
                if memory.observe_write(&target, self.config.same_target_write_limit) {
                    warn!(target = %target, streak = memory.write_streak(), "intercepted repeated write");
                    diversify_target = Some(target.clone());
                    *fate = Fate::Intercepted(target);
                }
            }

            messages.push(response.to_message());
            let results = self.execute(request, &groups, &fates).await;
            let successes = results.values().filter(|r| !r.is_error).count();
            self.telemetry.record_successes(successes as u64);

            tool_results = fan_out(&response, &groups, &fates, &results, cancellation);
            messages.extend(
                tool_results
                    .iter()
                    .map(|r| ChatMessage::tool_result(r.tool_call_id.clone(), r.content.clone())),
            );

            let fully_ran = !any_cancelled && diversify_target.is_none();
            memory.record_executed(fully_ran.then_some(batch));

            if let Some(target) = diversify_target {
                messages.push(ChatMessage::system(format!(
                    "`{target}` has been rewritten several times in a row. Leave it as it is and move on to \
                     different, complementary work for the task."
                )));
                return Ok(LoopRun {
                    outcome: LoopOutcome::Diversified { target },
                    messages,
                    tool_results,
                    memory,
                });
            }

            if self.config.has_completion_marker(&response.text) {
                let finished = ModelResponse::text(response.text.clone());
                let outcome = self.enforce_plan(request, &mut messages, &finished);
                return Ok(LoopRun {
                    outcome,
                    messages,
                    tool_results,
                    memory,
                });
            }

            if iteration == self.config.max_iterations_per_step {
                break;
            }
            response = self.model.complete(request, &messages, tools).await?;
        }

        debug!(budget = self.config.max_iterations_per_step, "iteration budget spent, yielding");
        Ok(LoopRun {
            outcome: LoopOutcome::Continue,
            messages,
            tool_results,
            memory,
        })
    }

    /// Finish, unless a plan is in effect with items still open. In that case
    /// a corrective note is appended and the loop must go around again.
    fn enforce_plan(
        &self,
        request: &OrchestrationRequest,
        messages: &mut Vec<ChatMessage>,
        response: &ModelResponse,
    ) -> LoopOutcome {
        let progress = self.plans.progress_for(&request.conversation_id);
        if !progress.is_in_effect() || progress.is_complete() {
            return LoopOutcome::Finished {
                response: response.clone(),
            };
        }

        info!(
            completed = progress.completed,
            total = progress.total,
            "plan incomplete, continuing"
        );
        if !response.text.trim().is_empty() {
            messages.push(ChatMessage::assistant(response.text.clone()));
        }
        messages.push(ChatMessage::system(format!(
            "The plan still has {} of {} items open. Keep working through them and mark each one done \
             by changing its `- [ ]` to `- [x]` in the plan before finishing.",
            progress.remaining(),
            progress.total,
        )));
        LoopOutcome::PlanIncomplete { progress }
    }

    /// Run the accepted calls, keyed by the id each one ran under.
    async fn execute(
        &self,
        request: &OrchestrationRequest,
        groups: &[DedupedCall],
        fates: &[Fate],
    ) -> HashMap<ToolCallId, ToolResult> {
        let calls: Vec<_> = groups
            .iter()
            .zip(fates)
            .filter_map(|(g, fate)| match fate {
                Fate::Run(id) => Some(ToolCall {
                    id: id.clone(),
                    ..g.call.clone()
                }),
                _ => None,
            })
            .collect();
        if calls.is_empty() {
            return HashMap::new();
        }

        debug!(calls = calls.len(), "executing tool batch");
        self.executor
            .execute_batch(calls, &request.tool_context())
            .await
            .into_iter()
            .map(|r| (r.tool_call_id.clone(), r))
            .collect()
    }
}

/// One result per original call id, in the order the model proposed them.
fn fan_out(
    response: &ModelResponse,
    groups: &[DedupedCall],
    fates: &[Fate],
    results: &HashMap<ToolCallId, ToolResult>,
    cancellation: &CancellationCheck,
) -> Vec<ToolResult> {
    let owner: HashMap<&ToolCallId, usize> = groups
        .iter()
        .enumerate()
        .flat_map(|(i, g)| g.all_ids().map(move |id| (id, i)))
        .collect();

    response
        .tool_calls
        .iter()
        .map(|call| {
            let id = call.id.clone();
            if cancellation.is_cancelled(&call.id) {
                return ToolResult::error(id, CANCELLED);
            }
            let Some(&idx) = owner.get(&call.id) else {
                return ToolResult::error(id, "no result returned");
            };
            match &fates[idx] {
                Fate::Cancelled => ToolResult::error(id, CANCELLED),
                Fate::Intercepted(target) => ToolResult::error(
                    id,
                    format!("Skipped: `{target}` was already written in the previous steps."),
                ),
                Fate::Run(run_id) => match results.get(run_id) {
                    Some(shared) => ToolResult {
                        tool_call_id: id,
                        ..shared.clone()
                    },
                    None => ToolResult::error(id, "no result returned"),
                },
            }
        })
        .collect()
}
