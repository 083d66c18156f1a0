//! Batch runner: validation, resume, worker pool, aggregation, artifacts.
//!
//! Notes are validated up front, previously completed ones are restored
//! from the checkpoint store, and the remainder is spread over a small
//! thread pool. Every finished note is checkpointed immediately so an
//! interrupted batch resumes where it stopped.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use serde_json::json;
use tracing::{info, warn};

use crate::meta_eval;
use crate::models::{
    BatchReport, EvalReport, GateDecision, HallucinationType, MetaEvalResult, NoteInput,
    RejectedNote,
};
use crate::pipeline::checkpoint::CheckpointStore;
use crate::pipeline::{Pipeline, PipelineError};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Evaluate at most this many notes (after validation).
    pub max_notes: Option<usize>,
    pub run_meta_eval: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_notes: None,
            run_meta_eval: true,
        }
    }
}

/// How the batch ended, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every requested note has a report with an available judgment.
    Completed,
    /// Some judgments are unavailable, or cancellation stopped the batch
    /// after progress was made; the checkpoint store lets a rerun finish it.
    CompletedWithJudgmentGaps,
    /// Cancelled before any note completed.
    Aborted,
}

impl BatchStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            BatchStatus::Completed => 0,
            BatchStatus::CompletedWithJudgmentGaps => 1,
            BatchStatus::Aborted => 2,
        }
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub status: BatchStatus,
    pub report: BatchReport,
}

fn validate(notes: &[NoteInput]) -> (Vec<NoteInput>, Vec<RejectedNote>) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut valid = Vec::with_capacity(notes.len());
    let mut rejected = Vec::new();

    for note in notes {
        let reason = if note.note_id.trim().is_empty() {
            Some("empty note_id".to_string())
        } else if note.transcript.trim().is_empty() {
            Some("empty transcript".to_string())
        } else if note.soap_note.trim().is_empty() {
            Some("empty soap_note".to_string())
        } else if !seen.insert(note.note_id.as_str()) {
            Some("duplicate note_id".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => {
                warn!(note_id = %note.note_id, %reason, "rejecting note");
                rejected.push(RejectedNote {
                    note_id: note.note_id.clone(),
                    reason,
                });
            }
            None => valid.push(note.clone()),
        }
    }

    (valid, rejected)
}

/// Run the full batch. Returns an error only for infrastructure failures
/// (checkpoint I/O); per-note judge failures are captured in the reports.
pub fn run_batch(
    pipeline: &Pipeline,
    notes: &[NoteInput],
    options: &BatchOptions,
    store: &CheckpointStore,
    cancel: &AtomicBool,
) -> Result<BatchOutcome, PipelineError> {
    let (mut valid, rejected) = validate(notes);
    if let Some(max) = options.max_notes {
        valid.truncate(max);
    }

    let requested_ids: HashSet<String> = valid.iter().map(|n| n.note_id.clone()).collect();
    let resumed: Vec<EvalReport> = store
        .load_completed()?
        .into_iter()
        .filter(|r| requested_ids.contains(&r.note_id))
        .collect();
    let done_ids: HashSet<String> = resumed.iter().map(|r| r.note_id.clone()).collect();

    let pending: VecDeque<NoteInput> = valid
        .iter()
        .filter(|n| !done_ids.contains(&n.note_id))
        .cloned()
        .collect();
    let pending_count = pending.len();

    info!(
        requested = valid.len(),
        resumed = resumed.len(),
        pending = pending_count,
        rejected = rejected.len(),
        "starting batch"
    );

    let queue = Mutex::new(pending);
    let results: Mutex<Vec<EvalReport>> = Mutex::new(Vec::with_capacity(pending_count));
    let failures: Mutex<Vec<PipelineError>> = Mutex::new(Vec::new());

    let worker_count = pipeline.config().workers.clamp(1, pending_count.max(1));
    thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| loop {
                if cancel.load(Ordering::SeqCst) {
                    return;
                }
                let note = match queue.lock() {
                    Ok(mut q) => match q.pop_front() {
                        Some(note) => note,
                        None => return,
                    },
                    Err(_) => return,
                };

                let report = pipeline.evaluate_note(&note);
                if let Err(e) = store.record(&report) {
                    warn!(note_id = %note.note_id, error = %e, "checkpoint write failed");
                    if let Ok(mut f) = failures.lock() {
                        f.push(e);
                    }
                    return;
                }
                if let Ok(mut r) = results.lock() {
                    r.push(report);
                }
            });
        }
    });

    if let Some(err) = failures
        .into_inner()
        .map_err(|_| PipelineError::Checkpoint("failure list poisoned".to_string()))?
        .into_iter()
        .next()
    {
        return Err(err);
    }

    let mut reports = resumed;
    reports.extend(
        results
            .into_inner()
            .map_err(|_| PipelineError::Checkpoint("result list poisoned".to_string()))?,
    );

    let evaluated_all = reports.len() == valid.len();
    let status = if !evaluated_all && reports.is_empty() {
        BatchStatus::Aborted
    } else if !evaluated_all || reports.iter().any(|r| r.judgment.is_unavailable()) {
        BatchStatus::CompletedWithJudgmentGaps
    } else {
        BatchStatus::Completed
    };

    let meta = if options.run_meta_eval && evaluated_all {
        Some(meta_eval::run_meta_evaluation(|input| {
            pipeline.evaluate_note(input)
        }))
    } else {
        None
    };

    let report = build_batch_report(reports, rejected, meta);
    info!(
        status = ?status,
        total = report.total_notes,
        avg_score = report.avg_overall_score,
        "batch finished"
    );

    Ok(BatchOutcome { status, report })
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn build_batch_report(
    reports: Vec<EvalReport>,
    rejected: Vec<RejectedNote>,
    meta_eval: Option<MetaEvalResult>,
) -> BatchReport {
    let mut gate_distribution: BTreeMap<GateDecision, usize> = BTreeMap::new();
    for decision in [GateDecision::PASS, GateDecision::REVIEW, GateDecision::FAIL] {
        gate_distribution.insert(decision, 0);
    }

    let mut total_hallucinations = 0;
    let mut total_omissions = 0;
    let mut hallucination_types: BTreeMap<HallucinationType, usize> = BTreeMap::new();

    for report in &reports {
        *gate_distribution
            .entry(report.quality_gate.decision)
            .or_insert(0) += 1;
        if let Some(judgment) = report.judgment.as_available() {
            total_hallucinations += judgment.hallucinations.len();
            total_omissions += judgment.omissions.len();
            for h in &judgment.hallucinations {
                *hallucination_types.entry(h.hallucination_type).or_insert(0) += 1;
            }
        }
    }

    let avg_overall_score = if reports.is_empty() {
        0.0
    } else {
        round3(reports.iter().map(|r| r.overall_score).sum::<f64>() / reports.len() as f64)
    };

    BatchReport {
        total_notes: reports.len(),
        reports,
        rejected,
        meta_eval,
        avg_overall_score,
        gate_distribution,
        total_hallucinations,
        total_omissions,
        most_common_hallucination_types: hallucination_types,
        generated_at: chrono::Utc::now(),
    }
}

/// Write the batch artifacts: `results.json` with the full report, and
/// `notes.json` with the raw inputs for downstream display.
pub fn write_artifacts(
    output_dir: &Path,
    notes: &[NoteInput],
    report: &BatchReport,
) -> Result<(), PipelineError> {
    fs::create_dir_all(output_dir)?;

    let results_path = output_dir.join("results.json");
    fs::write(&results_path, serde_json::to_string_pretty(report)?)?;

    let notes_data: Vec<_> = notes
        .iter()
        .map(|n| {
            json!({
                "note_id": n.note_id,
                "transcript": n.transcript,
                "soap_note": n.soap_note,
            })
        })
        .collect();
    let notes_path = output_dir.join("notes.json");
    fs::write(&notes_path, serde_json::to_string_pretty(&notes_data)?)?;

    info!(results = %results_path.display(), notes = %notes_path.display(), "artifacts written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EvalConfig;
    use crate::judge::client::MockJudgeClient;
    use crate::judge::parser::tests_support::minimal_valid_response;

    fn test_config() -> EvalConfig {
        let mut config = EvalConfig::default();
        config.judge.requests_per_minute = 60_000;
        config.judge.backoff_base_ms = 1;
        config.workers = 2;
        config
    }

    fn mock_pipeline() -> Pipeline {
        Pipeline::new(
            Arc::new(MockJudgeClient::canned(minimal_valid_response())),
            test_config(),
        )
    }

    fn note(id: &str) -> NoteInput {
        NoteInput {
            note_id: id.into(),
            transcript: "I've had a sore throat for three days and a low fever at home."
                .into(),
            soap_note: "S: Sore throat for three days with low-grade fever at home.\n\
                        O: Oropharynx erythematous, temp 100.1 in clinic.\n\
                        A: Acute viral pharyngitis most likely.\n\
                        P: Supportive care, fluids, return if worse."
                .into(),
            reference_note: None,
        }
    }

    fn no_meta() -> BatchOptions {
        BatchOptions {
            max_notes: None,
            run_meta_eval: false,
        }
    }

    #[test]
    fn evaluates_all_notes_and_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let pipeline = mock_pipeline();
        let notes = vec![note("n1"), note("n2"), note("n3")];

        let outcome = run_batch(
            &pipeline,
            &notes,
            &no_meta(),
            &store,
            &AtomicBool::new(false),
        )
        .unwrap();

        assert_eq!(outcome.status, BatchStatus::Completed);
        assert_eq!(outcome.report.total_notes, 3);
        let gate_sum: usize = outcome.report.gate_distribution.values().sum();
        assert_eq!(gate_sum, outcome.report.total_notes);
        assert!(outcome.report.avg_overall_score > 0.0);
    }

    #[test]
    fn resume_skips_already_completed_notes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let notes = vec![note("n1"), note("n2")];

        // first run: only n1
        let pipeline = mock_pipeline();
        let outcome = run_batch(
            &pipeline,
            &notes[..1],
            &no_meta(),
            &store,
            &AtomicBool::new(false),
        )
        .unwrap();
        assert_eq!(outcome.report.total_notes, 1);

        // second run over both: only n2 goes through the judge
        let judge = Arc::new(MockJudgeClient::canned(minimal_valid_response()));
        let pipeline = Pipeline::new(judge.clone(), test_config());
        let mut outcome = run_batch(
            &pipeline,
            &notes,
            &no_meta(),
            &store,
            &AtomicBool::new(false),
        )
        .unwrap();
        assert_eq!(outcome.report.total_notes, 2);
        assert_eq!(judge.calls(), 1);

        // the resumed run must match an uninterrupted run field for field
        let fresh_dir = tempfile::tempdir().unwrap();
        let fresh_store = CheckpointStore::open(fresh_dir.path()).unwrap();
        let mut fresh = run_batch(
            &mock_pipeline(),
            &notes,
            &no_meta(),
            &fresh_store,
            &AtomicBool::new(false),
        )
        .unwrap();
        outcome.report.reports.sort_by(|a, b| a.note_id.cmp(&b.note_id));
        fresh.report.reports.sort_by(|a, b| a.note_id.cmp(&b.note_id));
        assert_eq!(
            serde_json::to_value(&outcome.report.reports).unwrap(),
            serde_json::to_value(&fresh.report.reports).unwrap()
        );
    }

    #[test]
    fn malformed_inputs_rejected_not_evaluated() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let pipeline = mock_pipeline();

        let mut empty_transcript = note("n2");
        empty_transcript.transcript = "   ".into();
        let notes = vec![note("n1"), empty_transcript, note("n1")]; // duplicate id too

        let outcome = run_batch(
            &pipeline,
            &notes,
            &no_meta(),
            &store,
            &AtomicBool::new(false),
        )
        .unwrap();

        assert_eq!(outcome.report.total_notes, 1);
        assert_eq!(outcome.report.rejected.len(), 2);
        let reasons: Vec<&str> = outcome
            .report
            .rejected
            .iter()
            .map(|r| r.reason.as_str())
            .collect();
        assert!(reasons.contains(&"empty transcript"));
        assert!(reasons.contains(&"duplicate note_id"));
    }

    #[test]
    fn judge_gaps_surface_in_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        // judge that always fails
        let pipeline = Pipeline::new(
            Arc::new(MockJudgeClient::scripted(vec![])),
            test_config(),
        );

        let outcome = run_batch(
            &pipeline,
            &[note("n1")],
            &no_meta(),
            &store,
            &AtomicBool::new(false),
        )
        .unwrap();

        assert_eq!(outcome.status, BatchStatus::CompletedWithJudgmentGaps);
        assert_eq!(outcome.status.exit_code(), 1);
        assert!(outcome.report.reports[0].judgment.is_unavailable());
    }

    #[test]
    fn cancelled_batch_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let pipeline = mock_pipeline();
        let cancel = AtomicBool::new(true);

        let outcome = run_batch(&pipeline, &[note("n1"), note("n2")], &no_meta(), &store, &cancel)
            .unwrap();

        assert_eq!(outcome.status, BatchStatus::Aborted);
        assert_eq!(outcome.status.exit_code(), 2);
        assert_eq!(outcome.report.total_notes, 0);
    }

    #[test]
    fn cancel_after_progress_is_not_aborted() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let pipeline = mock_pipeline();
        let notes = vec![note("n1"), note("n2")];

        // n1 completes and is checkpointed
        run_batch(
            &pipeline,
            &notes[..1],
            &no_meta(),
            &store,
            &AtomicBool::new(false),
        )
        .unwrap();

        // cancellation stops the batch with n1 done and n2 outstanding
        let outcome = run_batch(&pipeline, &notes, &no_meta(), &store, &AtomicBool::new(true))
            .unwrap();

        assert_eq!(outcome.status, BatchStatus::CompletedWithJudgmentGaps);
        assert_eq!(outcome.status.exit_code(), 1);
        assert_eq!(outcome.report.total_notes, 1);
    }

    #[test]
    fn max_notes_caps_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let pipeline = mock_pipeline();
        let options = BatchOptions {
            max_notes: Some(2),
            run_meta_eval: false,
        };

        let outcome = run_batch(
            &pipeline,
            &[note("n1"), note("n2"), note("n3")],
            &options,
            &store,
            &AtomicBool::new(false),
        )
        .unwrap();

        assert_eq!(outcome.status, BatchStatus::Completed);
        assert_eq!(outcome.report.total_notes, 2);
    }

    #[test]
    fn meta_eval_attached_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let pipeline = mock_pipeline();
        let options = BatchOptions {
            max_notes: None,
            run_meta_eval: true,
        };

        let outcome = run_batch(
            &pipeline,
            &[note("n1")],
            &options,
            &store,
            &AtomicBool::new(false),
        )
        .unwrap();

        let meta = outcome.report.meta_eval.unwrap();
        assert_eq!(meta.total_cases, 15);
        // the canned judge reports nothing, so clean controls pass and
        // planted errors are all missed
        assert_eq!(meta.specificity, 1.0);
        assert_eq!(meta.sensitivity, 0.0);
    }

    #[test]
    fn artifacts_written_and_parseable() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let pipeline = mock_pipeline();
        let notes = vec![note("n1")];

        let outcome = run_batch(
            &pipeline,
            &notes,
            &no_meta(),
            &store,
            &AtomicBool::new(false),
        )
        .unwrap();
        write_artifacts(dir.path(), &notes, &outcome.report).unwrap();

        let raw = fs::read_to_string(dir.path().join("results.json")).unwrap();
        let parsed: BatchReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.total_notes, 1);

        let notes_raw = fs::read_to_string(dir.path().join("notes.json")).unwrap();
        assert!(notes_raw.contains("\"note_id\": \"n1\""));
    }
}
