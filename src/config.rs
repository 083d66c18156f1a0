//! Evaluation configuration.
//!
//! Every scoring weight, severity coefficient, and gate threshold is
//! externally supplied here rather than hard-coded: none of these constants
//! were calibrated against human raters, so they must be swappable without a
//! code change. `Default` carries the asserted values the pipeline ships
//! with.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const APP_NAME: &str = "notegate";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "notegate=info".to_string()
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level configuration for one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub judge: JudgeConfig,
    pub weights: ScoreWeights,
    pub penalties: SeverityPenalties,
    pub gate: GateThresholds,
    /// Minimum body length for a section header to count as present.
    /// Guards against stray headers with no content.
    pub min_section_chars: usize,
    /// Worker threads for batch evaluation.
    pub workers: usize,
}

impl EvalConfig {
    /// Load configuration from a JSON file. Missing fields fall back to
    /// defaults, so a partial override file is valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            judge: JudgeConfig::default(),
            weights: ScoreWeights::default(),
            penalties: SeverityPenalties::default(),
            gate: GateThresholds::default(),
            min_section_chars: 15,
            workers: 4,
        }
    }
}

/// External judgment-service settings. The credential itself is read from
/// the environment variable named by `api_key_env`, never stored in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub api_base: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Hard per-request timeout. Distinct from retry exhaustion: a hung call
    /// must not stall the batch.
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub requests_per_minute: u32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com".into(),
            model: "claude-sonnet-4-5".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            max_tokens: 4096,
            temperature: 0.0,
            timeout_secs: 120,
            max_retries: 2,
            backoff_base_ms: 500,
            requests_per_minute: 45,
        }
    }
}

/// Weights for the overall score combination. Expected to sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub completeness: f64,
    pub grounding: f64,
    pub judge_sections: f64,
    pub hallucination_free: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            completeness: 0.15,
            grounding: 0.15,
            judge_sections: 0.50,
            hallucination_free: 0.20,
        }
    }
}

/// Per-severity hallucination penalty coefficients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityPenalties {
    pub critical: f64,
    pub major: f64,
    pub minor: f64,
}

impl Default for SeverityPenalties {
    fn default() -> Self {
        Self {
            critical: 0.30,
            major: 0.15,
            minor: 0.05,
        }
    }
}

/// Thresholds for the quality-gate rule table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    /// Completeness below this FAILs. A single missing section scores
    /// exactly 0.75 and also FAILs via the explicit missing-section rule.
    pub min_section_completeness: f64,
    /// Overall judge quality at or below this FAILs.
    pub fail_quality_max: u8,
    /// This many major hallucinations FAILs.
    pub major_hallucination_fail_count: usize,
    /// Grounding rate below this (with entities checked) triggers REVIEW.
    pub min_grounding_rate: f64,
    /// Overall judge quality equal to this triggers REVIEW.
    pub review_quality: u8,
    /// Layer-discrepancy rule: grounding above this...
    pub discrepancy_grounding_min: f64,
    /// ...while the judge reports at least this many hallucinations.
    pub discrepancy_hallucination_count: usize,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_section_completeness: 0.75,
            fail_quality_max: 2,
            major_hallucination_fail_count: 3,
            min_grounding_rate: 0.70,
            review_quality: 3,
            discrepancy_grounding_min: 0.85,
            discrepancy_hallucination_count: 3,
        }
    }
}
