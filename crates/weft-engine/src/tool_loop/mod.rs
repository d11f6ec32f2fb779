//! Guards and control flow for the model ↔ tool iteration.

pub mod controller;
pub mod guards;
pub mod signature;
pub mod truncate;

pub use controller::{LoopOutcome, LoopRun, ToolLoopController};
pub use guards::{LoopMemory, ToolClassifier};
pub use signature::{dedupe, BatchSignature, DedupedCall, ToolCallSignature};
pub use truncate::{cap_context, truncate_chars, TruncationLimits};

use weft_settings::WeftSettings;

/// Thresholds the controller applies to every run.
#[derive(Clone, Debug)]
pub struct ToolLoopConfig {
    pub read_only_streak_limit: u32,
    pub read_only_repeat_limit: u32,
    pub same_target_write_limit: u32,
    /// Model turns per controller invocation before yielding to the runner.
    pub max_iterations_per_step: u32,
    pub completion_markers: Vec<String>,
    pub classifier: ToolClassifier,
}

impl Default for ToolLoopConfig {
    fn default() -> Self {
        Self::from(&WeftSettings::default())
    }
}

impl From<&WeftSettings> for ToolLoopConfig {
    fn from(s: &WeftSettings) -> Self {
        Self {
            read_only_streak_limit: s.tool_loop.read_only_streak_limit,
            read_only_repeat_limit: s.tool_loop.read_only_repeat_limit,
            same_target_write_limit: s.tool_loop.same_target_write_limit,
            max_iterations_per_step: s.engine.max_iterations_per_step.max(1),
            completion_markers: s.tool_loop.completion_markers.clone(),
            classifier: ToolClassifier::from(&s.tool_loop),
        }
    }
}

impl ToolLoopConfig {
    pub fn has_completion_marker(&self, text: &str) -> bool {
        self.completion_markers
            .iter()
            .any(|m| !m.is_empty() && text.contains(m.as_str()))
    }
}
