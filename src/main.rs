//! Batch evaluation entrypoint.
//!
//! Environment-driven:
//! - `NOTEGATE_DATA`    path to a JSON array of note inputs (required)
//! - `NOTEGATE_OUTPUT`  output directory (default `output`)
//! - `NOTEGATE_MODE`    `full` or `quick` (quick caps notes and skips meta-eval)
//! - `NOTEGATE_CONFIG`  optional JSON config file overriding defaults
//!
//! Exit codes: 0 completed, 1 completed with judgment gaps, 2 aborted or
//! failed to start.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use notegate::config::{self, EvalConfig};
use notegate::models::NoteInput;
use notegate::pipeline::checkpoint::CheckpointStore;
use notegate::pipeline::runner::{self, BatchOptions};
use notegate::Pipeline;

const QUICK_MODE_NOTE_CAP: usize = 5;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    info!("{} v{} starting", config::APP_NAME, config::APP_VERSION);

    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<u8, Box<dyn std::error::Error>> {
    let data_path = std::env::var("NOTEGATE_DATA")
        .map_err(|_| "NOTEGATE_DATA must point to a JSON file of note inputs")?;
    let output_dir =
        PathBuf::from(std::env::var("NOTEGATE_OUTPUT").unwrap_or_else(|_| "output".to_string()));
    let quick = matches!(
        std::env::var("NOTEGATE_MODE").as_deref(),
        Ok("quick")
    );

    let config = match std::env::var("NOTEGATE_CONFIG") {
        Ok(path) => EvalConfig::load(path.as_ref())?,
        Err(_) => EvalConfig::default(),
    };

    let raw = std::fs::read_to_string(&data_path)?;
    let notes: Vec<NoteInput> = serde_json::from_str(&raw)?;
    info!(count = notes.len(), data = %data_path, "loaded note inputs");

    let options = if quick {
        BatchOptions {
            max_notes: Some(QUICK_MODE_NOTE_CAP),
            run_meta_eval: false,
        }
    } else {
        BatchOptions::default()
    };

    let pipeline = Pipeline::from_config(config)?;
    let store = CheckpointStore::open(&output_dir)?;
    let cancel = AtomicBool::new(false);

    let outcome = runner::run_batch(&pipeline, &notes, &options, &store, &cancel)?;
    runner::write_artifacts(&output_dir, &notes, &outcome.report)?;

    if let Some(meta) = &outcome.report.meta_eval {
        info!(
            sensitivity = meta.sensitivity,
            specificity = meta.specificity,
            "meta-evaluation summary"
        );
    }
    info!(
        status = ?outcome.status,
        total = outcome.report.total_notes,
        avg_score = outcome.report.avg_overall_score,
        "done"
    );

    Ok(outcome.status.exit_code() as u8)
}
