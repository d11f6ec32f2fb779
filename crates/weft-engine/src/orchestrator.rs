use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use weft_core::backend::ModelBackend;
use weft_core::ids::RunId;
use weft_core::messages::ChatMessage;
use weft_core::tools::ToolExecutor;
use weft_settings::WeftSettings;
use weft_store::{Database, PlanRepo, SnapshotLog, SnapshotSink};
use weft_telemetry::LoopTelemetry;

use crate::error::EngineError;
use crate::graph::{GraphRunner, OrchestrationGraph};
use crate::model_client::ModelClient;
use crate::nodes::{FinalResponseNode, InitialResponseNode, PlanningNode, ToolLoopNode, PLANNING};
use crate::plan::PlanStore;
use crate::prefix_cache::PromptPrefixCache;
use crate::state::{OrchestrationRequest, OrchestrationState};
use crate::tool_loop::{ToolLoopConfig, ToolLoopController, TruncationLimits};

/// Collaborators shared by every run. Stores and counters are process-wide;
/// hand the same `Arc`s to every orchestrator that should share them.
#[derive(Clone)]
pub struct EngineDeps {
    pub backend: Arc<dyn ModelBackend>,
    pub executor: Arc<dyn ToolExecutor>,
    pub plans: Arc<PlanStore>,
    pub prefixes: Arc<PromptPrefixCache>,
    pub telemetry: Arc<LoopTelemetry>,
    pub snapshots: Arc<dyn SnapshotSink>,
}

/// What a completed run hands back to the caller.
#[derive(Clone, Debug)]
pub struct RunOutput {
    pub run_id: RunId,
    pub text: String,
    pub messages: Vec<ChatMessage>,
}

/// Entry point for one conversation turn: builds the default graph once and
/// runs requests through it.
pub struct Orchestrator {
    runner: GraphRunner,
    plans: Arc<PlanStore>,
    prefixes: Arc<PromptPrefixCache>,
    telemetry: Arc<LoopTelemetry>,
}

impl Orchestrator {
    pub fn new(deps: EngineDeps, settings: &WeftSettings) -> Result<Self, EngineError> {
        let graph = default_graph(&deps, settings);
        let runner = GraphRunner::new(graph, settings.engine.max_transitions, deps.snapshots.clone())?;
        Ok(Self {
            runner,
            plans: deps.plans,
            prefixes: deps.prefixes,
            telemetry: deps.telemetry,
        })
    }

    /// Orchestrator backed by the on-disk plan database and snapshot log
    /// under the configured data directory.
    pub fn open(
        backend: Arc<dyn ModelBackend>,
        executor: Arc<dyn ToolExecutor>,
        settings: &WeftSettings,
        home: &Path,
    ) -> Result<Self, EngineError> {
        let db = Database::open(&settings.storage.plan_db_path(home))?;
        let deps = EngineDeps {
            backend,
            executor,
            plans: Arc::new(PlanStore::new(PlanRepo::new(db), settings.caches.plan_capacity)),
            prefixes: Arc::new(PromptPrefixCache::new(settings.caches.prefix_capacity)),
            telemetry: Arc::new(LoopTelemetry::new()),
            snapshots: Arc::new(SnapshotLog::new(settings.storage.snapshot_path(home))),
        };
        Self::new(deps, settings)
    }

    #[instrument(skip_all, fields(conversation_id = %request.conversation_id, run_id = %request.run_id))]
    pub async fn run(&self, request: OrchestrationRequest) -> Result<RunOutput, EngineError> {
        let run_id = request.run_id.clone();
        let state = self.runner.run(OrchestrationState::new(request)).await?;
        let text = state
            .final_text()
            .map(str::to_string)
            .ok_or(EngineError::MissingResponse)?;

        let summary = self.telemetry.summary();
        info!(
            iterations = summary.total_iterations,
            healthy = summary.is_healthy,
            "turn finished"
        );
        Ok(RunOutput {
            run_id,
            text,
            messages: state.messages().to_vec(),
        })
    }

    pub fn plans(&self) -> &Arc<PlanStore> {
        &self.plans
    }

    pub fn prefixes(&self) -> &Arc<PromptPrefixCache> {
        &self.prefixes
    }

    pub fn telemetry(&self) -> &Arc<LoopTelemetry> {
        &self.telemetry
    }
}

/// `planning` → `initial_response` → `tool_loop` → `final_response`.
pub fn default_graph(deps: &EngineDeps, settings: &WeftSettings) -> OrchestrationGraph {
    let model = Arc::new(ModelClient::new(
        deps.backend.clone(),
        deps.prefixes.clone(),
        TruncationLimits::from(&settings.truncation),
    ));
    let controller = Arc::new(ToolLoopController::new(
        model.clone(),
        deps.executor.clone(),
        deps.plans.clone(),
        deps.telemetry.clone(),
        ToolLoopConfig::from(settings),
    ));

    OrchestrationGraph::new(PLANNING)
        .with_node(Arc::new(PlanningNode::new(
            model.clone(),
            deps.plans.clone(),
            settings.engine.planning_enabled,
        )))
        .with_node(Arc::new(InitialResponseNode::new(model.clone(), deps.plans.clone())))
        .with_node(Arc::new(ToolLoopNode::new(controller)))
        .with_node(Arc::new(FinalResponseNode::new(model)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;
    use weft_core::ids::ConversationId;
    use weft_llm::{MockBackend, MockResponse};

    #[tokio::test]
    async fn open_persists_under_data_dir() {
        let home = tempfile::tempdir().unwrap();
        let mut settings = WeftSettings::default();
        settings.engine.planning_enabled = false;

        let backend = Arc::new(MockBackend::new(vec![MockResponse::text("hello")]));
        let orchestrator =
            Orchestrator::open(backend, Arc::new(RecordingExecutor::new()), &settings, home.path()).unwrap();
        let request = OrchestrationRequest::new(ConversationId::from_raw("conv-o"), "hi");
        let conv = request.conversation_id.clone();
        let output = orchestrator.run(request).await.unwrap();

        assert_eq!(output.text, "hello");
        assert!(settings.storage.plan_db_path(home.path()).exists());
        let log = SnapshotLog::new(settings.storage.snapshot_path(home.path()));
        assert_eq!(log.list_runs(&conv).unwrap(), vec![output.run_id]);
    }

    #[test]
    fn default_graph_has_four_nodes() {
        let deps = EngineDeps {
            backend: Arc::new(MockBackend::new(vec![])),
            executor: Arc::new(RecordingExecutor::new()),
            plans: Arc::new(PlanStore::in_memory(8)),
            prefixes: Arc::new(PromptPrefixCache::default()),
            telemetry: Arc::new(LoopTelemetry::new()),
            snapshots: Arc::new(weft_store::MemorySnapshotSink::new()),
        };
        let graph = default_graph(&deps, &WeftSettings::default());
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.entry().as_str(), PLANNING);
    }
}
