use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use weft_store::snapshots::{RunSnapshot, SnapshotSink};

use crate::error::EngineError;
use crate::state::{NodeId, OrchestrationState, Transition};

/// A unit of work in the orchestration graph.
#[async_trait]
pub trait OrchestrationNode: Send + Sync {
    fn id(&self) -> &str;

    /// Consume the state and return the next one, with its transition set.
    async fn run(&self, state: OrchestrationState) -> Result<OrchestrationState, EngineError>;
}

/// Nodes keyed by id, plus the node every run starts at.
pub struct OrchestrationGraph {
    entry: NodeId,
    nodes: HashMap<NodeId, Arc<dyn OrchestrationNode>>,
}

impl OrchestrationGraph {
    pub fn new(entry: impl Into<NodeId>) -> Self {
        Self {
            entry: entry.into(),
            nodes: HashMap::new(),
        }
    }

    /// Register a node under its own id, replacing any previous one.
    pub fn with_node(mut self, node: Arc<dyn OrchestrationNode>) -> Self {
        let _ = self.nodes.insert(NodeId::new(node.id()), node);
        self
    }

    pub fn entry(&self) -> &NodeId {
        &self.entry
    }

    pub fn node(&self, id: &NodeId) -> Option<&Arc<dyn OrchestrationNode>> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Drives a state through the graph, one snapshot per transition.
pub struct GraphRunner {
    graph: OrchestrationGraph,
    max_transitions: u32,
    snapshots: Arc<dyn SnapshotSink>,
}

impl GraphRunner {
    pub fn new(
        graph: OrchestrationGraph,
        max_transitions: u32,
        snapshots: Arc<dyn SnapshotSink>,
    ) -> Result<Self, EngineError> {
        if graph.node(graph.entry()).is_none() {
            return Err(EngineError::UnknownNode(graph.entry().to_string()));
        }
        Ok(Self {
            graph,
            max_transitions,
            snapshots,
        })
    }

    pub fn max_transitions(&self) -> u32 {
        self.max_transitions
    }

    /// Run from the entry node until a node ends the run.
    ///
    /// Fails with [`EngineError::MaxTransitionsExceeded`] once `max_transitions`
    /// nodes have run without an `End`; the snapshots written up to that point
    /// stay on disk.
    #[instrument(skip_all, fields(
        conversation_id = %initial.request().conversation_id,
        run_id = %initial.request().run_id,
    ))]
    pub async fn run(&self, initial: OrchestrationState) -> Result<OrchestrationState, EngineError> {
        let mut phase = self.graph.entry().clone();
        let mut state = initial;
        let mut transitions = 0u32;
        let mut persisted = 0u32;

        loop {
            if state.request().abort.is_cancelled() {
                warn!(phase = %phase, transitions, "run aborted");
                return Err(EngineError::Aborted);
            }

            if transitions >= self.max_transitions {
                warn!(max = self.max_transitions, persisted, "transition bound reached");
                return Err(EngineError::MaxTransitionsExceeded {
                    max: self.max_transitions,
                    persisted,
                });
            }

            let node = self
                .graph
                .node(&phase)
                .ok_or_else(|| EngineError::UnknownNode(phase.to_string()))?;

            debug!(phase = %phase, iteration = transitions + 1, "invoking node");
            state = node.run(state).await?;
            transitions += 1;

            let next = match state.transition() {
                Transition::Next(id) => Some(id.clone()),
                Transition::End => None,
            };

            if self.persist(&state, &phase, transitions, next.as_ref()) {
                persisted += 1;
            }

            match next {
                Some(id) => phase = id,
                None => {
                    info!(transitions, "run complete");
                    return Ok(state);
                }
            }
        }
    }

    fn persist(&self, state: &OrchestrationState, phase: &NodeId, iteration: u32, next: Option<&NodeId>) -> bool {
        let request = state.request();
        let snapshot = RunSnapshot {
            run_id: request.run_id.clone(),
            conversation_id: request.conversation_id.clone(),
            phase: phase.to_string(),
            iteration,
            user_input: request.user_input.clone(),
            next: next.map(NodeId::to_string),
            recorded_at: Utc::now(),
        };
        match self.snapshots.append(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, phase = %phase, iteration, "failed to persist run snapshot");
                false
            }
        }
    }
}
