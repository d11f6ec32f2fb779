//! # weft
//!
//! Debugging CLI for the orchestration engine: reads snapshot logs and plan
//! files, and prints the effective settings.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use weft_core::ids::ConversationId;
use weft_engine::PlanProgress;
use weft_settings::{home_dir, load_settings, load_settings_from_path, settings_path, WeftSettings};
use weft_store::snapshots::read_log;
use weft_store::SnapshotLog;
use weft_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "weft", about = "Inspect tool-loop runs and plans")]
struct Cli {
    /// Settings file to use instead of `~/.weft/settings.json`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every snapshot of a run log.
    Inspect {
        log: PathBuf,
        /// Emit the raw NDJSON records.
        #[arg(long)]
        json: bool,
    },
    /// List recorded runs of a conversation, oldest first.
    Runs { conversation: String },
    /// Print `completed/total` for a plan file.
    Progress { plan: PathBuf },
    /// Print the effective settings as JSON.
    Settings {
        /// Print the settings file location instead.
        #[arg(long)]
        path: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => load_settings().context("Failed to load settings")?,
    };
    init_telemetry(&TelemetryConfig::from_level_name(&settings.logging.level, settings.logging.json));

    match cli.command {
        Command::Inspect { log, json } => inspect(&log, json),
        Command::Runs { conversation } => runs(&settings, &conversation),
        Command::Progress { plan } => progress(&plan),
        Command::Settings { path } => {
            if path {
                let path = cli.config.unwrap_or_else(settings_path);
                println!("{}", path.display());
            } else {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
            Ok(())
        }
    }
}

fn inspect(log: &std::path::Path, json: bool) -> Result<()> {
    let snapshots = read_log(log).with_context(|| format!("Failed to read {}", log.display()))?;
    tracing::debug!(path = %log.display(), count = snapshots.len(), "snapshot log read");
    for snap in &snapshots {
        if json {
            println!("{}", serde_json::to_string(snap)?);
        } else {
            println!(
                "{:>4}  {:<18} -> {:<18} {}",
                snap.iteration,
                snap.phase,
                snap.next.as_deref().unwrap_or("(end)"),
                snap.recorded_at.to_rfc3339(),
            );
        }
    }
    Ok(())
}

fn runs(settings: &WeftSettings, conversation: &str) -> Result<()> {
    let log = SnapshotLog::new(settings.storage.snapshot_path(&home_dir()));
    let conversation = ConversationId::from_raw(conversation);
    for run in log.list_runs(&conversation).context("Failed to list runs")? {
        let count = log.read_run(&conversation, &run).map(|s| s.len()).unwrap_or(0);
        println!("{run}  {count} snapshots");
    }
    Ok(())
}

fn progress(plan: &std::path::Path) -> Result<()> {
    let text = std::fs::read_to_string(plan).with_context(|| format!("Failed to read {}", plan.display()))?;
    let progress = PlanProgress::of(&text);
    println!("{}/{}", progress.completed, progress.total);
    Ok(())
}
