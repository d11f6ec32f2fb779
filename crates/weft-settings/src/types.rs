//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may specify any subset of fields.

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeftSettings {
    pub engine: EngineSettings,
    pub tool_loop: ToolLoopSettings,
    pub truncation: TruncationSettings,
    pub caches: CacheSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

/// Graph runner settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Upper bound on node transitions per run.
    pub max_transitions: u32,
    /// Model turns the tool-loop node may take before yielding back to the runner.
    pub max_iterations_per_step: u32,
    /// Ask the model for a checklist before the first turn in agent mode.
    pub planning_enabled: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_transitions: 40,
            max_iterations_per_step: 12,
            planning_enabled: true,
        }
    }
}

/// Thresholds and tool classification used by the tool-loop guards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolLoopSettings {
    /// Consecutive all-read-only batches that end exploration.
    pub read_only_streak_limit: u32,
    /// Sightings of the same read-only batch that end exploration.
    pub read_only_repeat_limit: u32,
    /// Consecutive writes to one target at which the write is intercepted.
    pub same_target_write_limit: u32,
    /// Tools that only observe the workspace.
    pub read_only_tools: Vec<String>,
    /// Argument keys naming the destination of a write.
    pub write_target_keys: Vec<String>,
    /// Markers in assistant text that announce the task is finished.
    pub completion_markers: Vec<String>,
}

impl Default for ToolLoopSettings {
    fn default() -> Self {
        Self {
            read_only_streak_limit: 3,
            read_only_repeat_limit: 2,
            same_target_write_limit: 3,
            read_only_tools: [
                "list_files",
                "list_directory",
                "read_file",
                "search_files",
                "search_code",
                "grep",
                "find_files",
                "glob",
                "get_file_info",
            ]
            .map(String::from)
            .to_vec(),
            write_target_keys: ["path", "file_path", "target", "destination", "filename"]
                .map(String::from)
                .to_vec(),
            completion_markers: ["TASK_COMPLETE", "[DONE]"].map(String::from).to_vec(),
        }
    }
}

/// Character limits applied to the conversation before every model call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TruncationSettings {
    pub per_result_chars: usize,
    pub aggregate_chars: usize,
    pub reduced_result_chars: usize,
}

impl Default for TruncationSettings {
    fn default() -> Self {
        Self {
            per_result_chars: 2_000,
            aggregate_chars: 12_000,
            reduced_result_chars: 500,
        }
    }
}

/// LRU capacities, in conversations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    pub plan_capacity: usize,
    pub prefix_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            plan_capacity: 8,
            prefix_capacity: 10,
        }
    }
}

/// On-disk locations. Relative paths resolve against `data_dir`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    pub data_dir: String,
    pub snapshot_dir: String,
    pub plan_db: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.weft".to_string(),
            snapshot_dir: "snapshots".to_string(),
            plan_db: "database/plans.db".to_string(),
        }
    }
}

impl StorageSettings {
    /// `data_dir` with a leading `~` expanded against `home`.
    pub fn resolved_data_dir(&self, home: &std::path::Path) -> std::path::PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None if self.data_dir == "~" => home.to_path_buf(),
            None => std::path::PathBuf::from(&self.data_dir),
        }
    }

    pub fn snapshot_path(&self, home: &std::path::Path) -> std::path::PathBuf {
        self.resolved_data_dir(home).join(&self.snapshot_dir)
    }

    pub fn plan_db_path(&self, home: &std::path::Path) -> std::path::PathBuf {
        self.resolved_data_dir(home).join(&self.plan_db)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn defaults_match_loop_thresholds() {
        let s = WeftSettings::default();
        assert_eq!(s.tool_loop.read_only_streak_limit, 3);
        assert_eq!(s.tool_loop.read_only_repeat_limit, 2);
        assert_eq!(s.tool_loop.same_target_write_limit, 3);
        assert_eq!(s.truncation.per_result_chars, 2_000);
        assert_eq!(s.truncation.aggregate_chars, 12_000);
        assert_eq!(s.truncation.reduced_result_chars, 500);
        assert!((5..=10).contains(&s.caches.plan_capacity));
        assert_eq!(s.caches.prefix_capacity, 10);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(WeftSettings::default()).unwrap();
        assert!(json["engine"]["maxTransitions"].is_number());
        assert!(json["toolLoop"]["readOnlyTools"].is_array());
        assert!(json["truncation"]["perResultChars"].is_number());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: WeftSettings = serde_json::from_str(r#"{"engine": {"maxTransitions": 7}}"#).unwrap();
        assert_eq!(s.engine.max_transitions, 7);
        assert_eq!(s.engine.max_iterations_per_step, 12);
        assert_eq!(s.caches, CacheSettings::default());
    }

    #[test]
    fn data_dir_expands_home() {
        let storage = StorageSettings::default();
        let home = Path::new("/home/dev");
        assert_eq!(storage.snapshot_path(home), Path::new("/home/dev/.weft/snapshots"));
        assert_eq!(storage.plan_db_path(home), Path::new("/home/dev/.weft/database/plans.db"));

        let absolute = StorageSettings {
            data_dir: "/var/lib/weft".into(),
            ..Default::default()
        };
        assert_eq!(absolute.resolved_data_dir(home), Path::new("/var/lib/weft"));
    }
}
