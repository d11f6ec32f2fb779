//! Deterministic tool executor for tests and local dry runs.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use weft_core::messages::ToolCall;
use weft_core::tools::{ToolContext, ToolExecutor, ToolResult};

type Responder = Arc<dyn Fn(&ToolCall, &ToolContext) -> ToolResult + Send + Sync>;

/// Records every batch it receives and answers each call with
/// `"<tool name> ok"`, or with whatever a custom responder returns.
#[derive(Default)]
pub struct RecordingExecutor {
    batches: Mutex<Vec<Vec<ToolCall>>>,
    responder: Option<Responder>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responder(f: impl Fn(&ToolCall, &ToolContext) -> ToolResult + Send + Sync + 'static) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            responder: Some(Arc::new(f)),
        }
    }

    /// Batches received so far, oldest first.
    pub fn batches(&self) -> Vec<Vec<ToolCall>> {
        self.batches.lock().clone()
    }

    /// Every call executed, flattened across batches.
    pub fn executed_calls(&self) -> Vec<ToolCall> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn execution_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute_batch(&self, calls: Vec<ToolCall>, ctx: &ToolContext) -> Vec<ToolResult> {
        let results = calls
            .iter()
            .map(|call| match &self.responder {
                Some(respond) => respond(call, ctx),
                None => ToolResult::success(call.id.clone(), format!("{} ok", call.name)),
            })
            .collect();
        self.batches.lock().push(calls);
        results
    }
}
