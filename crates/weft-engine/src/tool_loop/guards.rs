use std::collections::{HashMap, HashSet};

use weft_core::messages::ToolCall;
use weft_settings::ToolLoopSettings;

use super::signature::BatchSignature;

/// Sorts tool calls into read-only and write-class by name and arguments.
#[derive(Clone, Debug)]
pub struct ToolClassifier {
    read_only: HashSet<String>,
    target_keys: Vec<String>,
}

impl Default for ToolClassifier {
    fn default() -> Self {
        Self::from(&ToolLoopSettings::default())
    }
}

impl From<&ToolLoopSettings> for ToolClassifier {
    fn from(s: &ToolLoopSettings) -> Self {
        Self {
            read_only: s.read_only_tools.iter().cloned().collect(),
            target_keys: s.write_target_keys.clone(),
        }
    }
}

impl ToolClassifier {
    pub fn is_read_only(&self, name: &str) -> bool {
        self.read_only.contains(name)
    }

    /// Destination of a write-class call, normalized for comparison.
    /// `None` for read-only tools and calls without a target argument.
    pub fn write_target(&self, call: &ToolCall) -> Option<String> {
        if self.is_read_only(&call.name) {
            return None;
        }
        self.target_keys
            .iter()
            .find_map(|key| call.str_arg(key))
            .map(|t| t.strip_prefix("./").unwrap_or(t).to_string())
    }
}

/// Per-run observations the guards compare each batch against.
#[derive(Clone, Debug, Default)]
pub struct LoopMemory {
    last_executed: Option<BatchSignature>,
    read_only_streak: u32,
    read_only_seen: HashMap<BatchSignature, u32>,
    write_target: Option<String>,
    write_streak: u32,
    last_status: Option<String>,
}

impl LoopMemory {
    /// Whether `batch` is what the previous iteration actually executed.
    pub fn is_exact_repeat(&self, batch: &BatchSignature) -> bool {
        !batch.is_empty() && self.last_executed.as_ref() == Some(batch)
    }

    /// Count a proposed batch toward the exploration guards. Returns `true`
    /// when exploration should stop.
    ///
    /// A batch with any non-read-only call breaks the streak.
    pub fn observe_read_only(
        &mut self,
        batch: &BatchSignature,
        all_read_only: bool,
        streak_limit: u32,
        repeat_limit: u32,
    ) -> bool {
        if !all_read_only {
            self.read_only_streak = 0;
            return false;
        }
        self.read_only_streak += 1;
        let seen = self.read_only_seen.entry(batch.clone()).or_insert(0);
        *seen += 1;
        self.read_only_streak >= streak_limit || *seen >= repeat_limit
    }

    /// Count a write to `target`. Returns `true` when this write should be
    /// intercepted. Writes to a different target restart the streak.
    pub fn observe_write(&mut self, target: &str, limit: u32) -> bool {
        if self.write_target.as_deref() == Some(target) {
            self.write_streak += 1;
        } else {
            self.write_target = Some(target.to_string());
            self.write_streak = 1;
        }
        self.write_streak >= limit
    }

    pub fn read_only_streak(&self) -> u32 {
        self.read_only_streak
    }

    pub fn write_streak(&self) -> u32 {
        self.write_streak
    }

    /// Remember the batch that ran, or `None` when it only partly ran.
    pub fn record_executed(&mut self, batch: Option<BatchSignature>) {
        self.last_executed = batch;
    }

    /// Returns `true` when `text` repeats the previous non-empty status.
    pub fn observe_status(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            self.last_status = None;
            return false;
        }
        let repeated = self.last_status.as_deref() == Some(text);
        self.last_status = Some(text.to_string());
        repeated
    }
}
