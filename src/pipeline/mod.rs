//! Batch orchestration.
//!
//! [`Pipeline`] evaluates one note through both layers plus the gate;
//! [`runner`] drives a worker pool over a batch with checkpointed resume.

pub mod checkpoint;
pub mod rate_limit;
pub mod runner;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::EvalConfig;
use crate::judge::{self, HttpJudgeClient, JudgeClient, JudgeError};
use crate::models::{EvalReport, JudgmentOutcome, NoteInput};
use crate::pipeline::rate_limit::RateLimiter;
use crate::{deterministic, gate, scoring};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

/// The per-note evaluation engine. Shared read-only across worker threads.
pub struct Pipeline {
    judge: Arc<dyn JudgeClient>,
    limiter: RateLimiter,
    config: EvalConfig,
}

impl Pipeline {
    pub fn new(judge: Arc<dyn JudgeClient>, config: EvalConfig) -> Self {
        let limiter = RateLimiter::new(config.judge.requests_per_minute);
        Self {
            judge,
            limiter,
            config,
        }
    }

    /// Build a pipeline with the real HTTP judge. Fails if the credential
    /// env var is unset.
    pub fn from_config(config: EvalConfig) -> Result<Self, JudgeError> {
        let client = HttpJudgeClient::from_config(&config.judge)?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Evaluate one note through both layers, the gate, and scoring.
    ///
    /// A judge failure is not an evaluation failure: the report carries an
    /// explicit `Unavailable` judgment and the gate holds the note for
    /// review instead of letting it pass unjudged.
    pub fn evaluate_note(&self, note: &NoteInput) -> EvalReport {
        let (det, _section_texts) = deterministic::run_checks(
            &note.soap_note,
            &note.transcript,
            self.config.min_section_chars,
        );

        let judgment = match judge::evaluate_note(
            self.judge.as_ref(),
            &self.limiter,
            &self.config.judge,
            &note.transcript,
            &note.soap_note,
        ) {
            Ok(result) => JudgmentOutcome::Available(result),
            Err(err) => {
                warn!(note_id = %note.note_id, error = %err, "judgment unavailable for note");
                JudgmentOutcome::Unavailable {
                    error: err.to_string(),
                }
            }
        };

        let quality_gate = gate::decide(&det, &judgment, &self.config.gate);
        let overall_score = scoring::overall_score(
            &det,
            &judgment,
            &self.config.weights,
            &self.config.penalties,
        );

        info!(
            note_id = %note.note_id,
            gate = ?quality_gate.decision,
            score = overall_score,
            "note evaluated"
        );

        EvalReport {
            note_id: note.note_id.clone(),
            quality_gate,
            overall_score,
            deterministic: det,
            judgment,
        }
    }
}
