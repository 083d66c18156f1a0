//! Crash-safe batch progress.
//!
//! Two artifacts under the output directory: a per-note report file in
//! `reports/`, and an append-only `completed.log` of note ids. A note is
//! committed only after its report file is fully written, so a crash
//! between the two leaves at worst an orphaned report file that the next
//! run overwrites.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::models::EvalReport;
use crate::pipeline::PipelineError;

const COMPLETED_LOG: &str = "completed.log";
const REPORTS_DIR: &str = "reports";

pub struct CheckpointStore {
    reports_dir: PathBuf,
    log_path: PathBuf,
    /// Serializes log appends across worker threads.
    log_guard: Mutex<()>,
}

/// Note ids become file names. Anything outside a conservative character
/// set (including `_`, the escape marker itself) is escaped as `_xx` hex
/// bytes, so distinct ids never collapse onto one report file.
fn sanitize_id(note_id: &str) -> String {
    let mut safe = String::with_capacity(note_id.len());
    for c in note_id.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            safe.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                safe.push_str(&format!("_{byte:02x}"));
            }
        }
    }
    safe
}

impl CheckpointStore {
    /// Open (creating if needed) a checkpoint store under `output_dir`.
    pub fn open(output_dir: &Path) -> Result<Self, PipelineError> {
        let reports_dir = output_dir.join(REPORTS_DIR);
        fs::create_dir_all(&reports_dir)?;
        Ok(Self {
            reports_dir,
            log_path: output_dir.join(COMPLETED_LOG),
            log_guard: Mutex::new(()),
        })
    }

    fn report_path(&self, note_id: &str) -> PathBuf {
        self.reports_dir.join(format!("{}.json", sanitize_id(note_id)))
    }

    /// Persist one finished report and mark its note id completed.
    pub fn record(&self, report: &EvalReport) -> Result<(), PipelineError> {
        let payload = serde_json::to_string_pretty(report)?;
        fs::write(self.report_path(&report.note_id), payload)?;

        let _guard = self
            .log_guard
            .lock()
            .map_err(|_| PipelineError::Checkpoint("completed.log lock poisoned".to_string()))?;
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(log, "{}", report.note_id)?;
        Ok(())
    }

    /// Load every previously completed report. Log entries whose report file
    /// is missing or unreadable are skipped with a warning; those notes will
    /// simply be re-evaluated.
    pub fn load_completed(&self) -> Result<Vec<EvalReport>, PipelineError> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let log = fs::read_to_string(&self.log_path)?;
        let mut seen = HashSet::new();
        let mut reports = Vec::new();

        for note_id in log.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !seen.insert(note_id.to_string()) {
                continue;
            }
            let path = self.report_path(note_id);
            match fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<EvalReport>(&raw) {
                    Ok(report) => reports.push(report),
                    Err(e) => {
                        warn!(note_id, error = %e, "checkpointed report unreadable, will re-evaluate");
                    }
                },
                Err(e) => {
                    warn!(note_id, error = %e, "checkpointed report missing, will re-evaluate");
                }
            }
        }

        debug!(count = reports.len(), "loaded checkpointed reports");
        Ok(reports)
    }
}
