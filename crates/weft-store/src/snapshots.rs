//! Append-only run snapshot log.
//!
//! One newline-delimited JSON file per (conversation, run):
//! `<root>/<conversation_id>/<run_id>.ndjson`. Each line is a [`RunSnapshot`].

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use weft_core::ids::{ConversationId, RunId};

use crate::error::StoreError;

/// State recorded after each node transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub conversation_id: ConversationId,
    /// Node that just ran.
    pub phase: String,
    /// 1-based, strictly increasing within a run.
    pub iteration: u32,
    pub user_input: String,
    /// Node scheduled next, `None` once the run ended.
    #[serde(default)]
    pub next: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Destination for run snapshots.
pub trait SnapshotSink: Send + Sync {
    fn append(&self, snapshot: &RunSnapshot) -> Result<(), StoreError>;
}

/// File-backed snapshot log.
pub struct SnapshotLog {
    root: PathBuf,
}

impl SnapshotLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, conversation_id: &ConversationId, run_id: &RunId) -> PathBuf {
        self.root
            .join(file_component(conversation_id.as_str()))
            .join(format!("{}.ndjson", file_component(run_id.as_str())))
    }

    /// All snapshots of one run, in write order. A run with no log yields an empty list.
    pub fn read_run(&self, conversation_id: &ConversationId, run_id: &RunId) -> Result<Vec<RunSnapshot>, StoreError> {
        let path = self.path_for(conversation_id, run_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_log(&path)
    }

    /// Run ids with a log under the conversation, oldest first.
    pub fn list_runs(&self, conversation_id: &ConversationId) -> Result<Vec<RunId>, StoreError> {
        let dir = self.root.join(file_component(conversation_id.as_str()));
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut runs: Vec<RunId> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(".ndjson").map(RunId::from_raw)
            })
            .collect();
        runs.sort();
        Ok(runs)
    }
}

impl SnapshotSink for SnapshotLog {
    fn append(&self, snapshot: &RunSnapshot) -> Result<(), StoreError> {
        let path = self.path_for(&snapshot.conversation_id, &snapshot.run_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let mut line = serde_json::to_string(snapshot)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        debug!(
            path = %path.display(),
            phase = %snapshot.phase,
            iteration = snapshot.iteration,
            "snapshot appended"
        );
        Ok(())
    }
}

/// Parse a snapshot log file. Blank lines are skipped.
pub fn read_log(path: &Path) -> Result<Vec<RunSnapshot>, StoreError> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(StoreError::from))
        .collect()
}

/// Ids are caller-supplied; keep them from escaping the log directory.
fn file_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// In-memory sink for tests and dry runs.
#[derive(Default)]
pub struct MemorySnapshotSink {
    snapshots: Mutex<Vec<RunSnapshot>>,
    fail: bool,
}

impl MemorySnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every append fails.
    pub fn failing() -> Self {
        Self {
            snapshots: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn snapshots(&self) -> Vec<RunSnapshot> {
        self.snapshots.lock().clone()
    }
}

impl SnapshotSink for MemorySnapshotSink {
    fn append(&self, snapshot: &RunSnapshot) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Io("snapshot sink unavailable".into()));
        }
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(conv: &str, run: &str, phase: &str, iteration: u32) -> RunSnapshot {
        RunSnapshot {
            run_id: RunId::from_raw(run),
            conversation_id: ConversationId::from_raw(conv),
            phase: phase.into(),
            iteration,
            user_input: "fix the build".into(),
            next: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn append_and_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = SnapshotLog::new(dir.path());
        for (i, phase) in ["planning", "tool_loop", "final_response"].iter().enumerate() {
            log.append(&snapshot("conv-1", "run-1", phase, i as u32 + 1)).unwrap();
        }

        let read = log
            .read_run(&ConversationId::from_raw("conv-1"), &RunId::from_raw("run-1"))
            .unwrap();
        let phases: Vec<&str> = read.iter().map(|s| s.phase.as_str()).collect();
        assert_eq!(phases, vec!["planning", "tool_loop", "final_response"]);
        assert_eq!(read.iter().map(|s| s.iteration).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn lines_use_camel_case_fields() {
        let dir = tempfile::tempdir().unwrap();
        let log = SnapshotLog::new(dir.path());
        let snap = snapshot("conv-1", "run-1", "tool_loop", 1);
        log.append(&snap).unwrap();

        let raw = std::fs::read_to_string(log.path_for(&snap.conversation_id, &snap.run_id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        for key in ["runId", "conversationId", "phase", "iteration", "userInput"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(raw.ends_with('\n'));
    }

    #[test]
    fn runs_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let log = SnapshotLog::new(dir.path());
        log.append(&snapshot("conv-1", "run-a", "tool_loop", 1)).unwrap();
        log.append(&snapshot("conv-1", "run-b", "tool_loop", 1)).unwrap();
        log.append(&snapshot("conv-1", "run-b", "final_response", 2)).unwrap();

        let conv = ConversationId::from_raw("conv-1");
        assert_eq!(log.read_run(&conv, &RunId::from_raw("run-a")).unwrap().len(), 1);
        assert_eq!(log.read_run(&conv, &RunId::from_raw("run-b")).unwrap().len(), 2);
        assert_eq!(
            log.list_runs(&conv).unwrap(),
            vec![RunId::from_raw("run-a"), RunId::from_raw("run-b")]
        );
    }

    #[test]
    fn missing_run_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = SnapshotLog::new(dir.path());
        let conv = ConversationId::from_raw("none");
        assert!(log.read_run(&conv, &RunId::from_raw("r")).unwrap().is_empty());
        assert!(log.list_runs(&conv).unwrap().is_empty());
    }

    #[test]
    fn ids_cannot_escape_root() {
        let log = SnapshotLog::new("/data/snapshots");
        let path = log.path_for(&ConversationId::from_raw("../../etc"), &RunId::from_raw("a/b"));
        assert!(path.starts_with("/data/snapshots"));
        assert_eq!(path.file_name().unwrap(), "a_b.ndjson");
    }

    #[test]
    fn failing_sink_reports_error() {
        let sink = MemorySnapshotSink::failing();
        assert!(sink.append(&snapshot("c", "r", "p", 1)).is_err());
        assert!(sink.snapshots().is_empty());
    }
}
