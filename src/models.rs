//! Shared value records for the evaluation pipeline.
//!
//! Every layer (deterministic checks, LLM judge, quality gate, meta-eval)
//! produces typed output conforming to these models. Results are write-once:
//! produced exactly once, never mutated, safe to share across worker threads.
//! The final `BatchReport` is what gets serialized to results.json.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Input
// ═══════════════════════════════════════════════════════════

/// A single transcript + SOAP note pair to evaluate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteInput {
    pub note_id: String,
    pub transcript: String,
    pub soap_note: String,
    /// Reference note for reference-based eval (accepted, not used by the
    /// current pipeline).
    #[serde(default)]
    pub reference_note: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Deterministic layer
// ═══════════════════════════════════════════════════════════

/// The four canonical SOAP sections.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Subjective,
    Objective,
    Assessment,
    Plan,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Subjective,
        Section::Objective,
        Section::Assessment,
        Section::Plan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Subjective => "subjective",
            Section::Objective => "objective",
            Section::Assessment => "assessment",
            Section::Plan => "plan",
        }
    }

    /// Parse a section name as emitted by the judge. Returns `None` for
    /// anything outside the canonical four.
    pub fn parse(s: &str) -> Option<Section> {
        match s.trim().to_lowercase().as_str() {
            "subjective" | "s" => Some(Section::Subjective),
            "objective" | "o" => Some(Section::Objective),
            "assessment" | "a" => Some(Section::Assessment),
            "plan" | "p" => Some(Section::Plan),
            _ => None,
        }
    }
}

/// Whether each SOAP section exists with meaningful content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPresence {
    pub subjective: bool,
    pub objective: bool,
    pub assessment: bool,
    pub plan: bool,
}

impl SectionPresence {
    pub fn is_present(&self, section: Section) -> bool {
        match section {
            Section::Subjective => self.subjective,
            Section::Objective => self.objective,
            Section::Assessment => self.assessment,
            Section::Plan => self.plan,
        }
    }

    pub fn present_count(&self) -> usize {
        Section::ALL.iter().filter(|s| self.is_present(**s)).count()
    }

    /// Sections that are absent, in canonical order.
    pub fn missing(&self) -> Vec<Section> {
        Section::ALL
            .iter()
            .copied()
            .filter(|s| !self.is_present(*s))
            .collect()
    }
}

/// A single entity from the note checked against the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityGrounding {
    pub entity: String,
    pub found_in_transcript: bool,
    /// Quote window from the (normalized) transcript, when one was located.
    #[serde(default)]
    pub transcript_evidence: Option<String>,
}

/// A polarity contradiction between the note and the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub note_claim: String,
    pub transcript_evidence: String,
    pub description: String,
}

/// Output from all deterministic checks.
///
/// Invariant: `entity_grounding_rate == grounded / checked`, defined as 1.0
/// when no entities were checked (nothing is ungrounded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterministicResult {
    pub sections_present: SectionPresence,
    pub section_completeness_score: f64,
    pub entities_checked: Vec<EntityGrounding>,
    pub entity_grounding_rate: f64,
    pub contradictions: Vec<Contradiction>,
}

// ═══════════════════════════════════════════════════════════
// Judgment layer
// ═══════════════════════════════════════════════════════════

/// Severity tiers, ordered worst-first. Closed set: an unrecognized severity
/// string from the judge is a parse error, never a silent default.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Severity> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "major" => Some(Severity::Major),
            "minor" => Some(Severity::Minor),
            _ => None,
        }
    }
}

/// Hallucination taxonomy (adapted from a published clinical-note error
/// framework; temporal replaces the framework's causality category).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HallucinationType {
    /// Information not in the transcript at all.
    Fabrication,
    /// The opposite of what the transcript says.
    Negation,
    /// Distortion of context or specifics (degree, body part, dose).
    Contextual,
    /// Wrong timing or sequence of events.
    Temporal,
}

impl HallucinationType {
    pub fn parse(s: &str) -> Option<HallucinationType> {
        match s.trim().to_lowercase().as_str() {
            "fabrication" => Some(HallucinationType::Fabrication),
            "negation" => Some(HallucinationType::Negation),
            "contextual" => Some(HallucinationType::Contextual),
            "temporal" => Some(HallucinationType::Temporal),
            _ => None,
        }
    }
}

/// A single hallucinated claim in the note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hallucination {
    /// Verbatim text from the note.
    pub note_text: String,
    pub hallucination_type: HallucinationType,
    pub severity: Severity,
    pub explanation: String,
    /// What the transcript actually says, or "not mentioned in transcript".
    pub transcript_context: String,
}

/// A clinically relevant transcript finding missing from the note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Omission {
    /// Verbatim quote from the transcript.
    pub transcript_text: String,
    pub expected_section: Section,
    pub clinical_importance: Severity,
    pub explanation: String,
}

/// Per-section ratings from the judge. Each rating is in 1..=5, enforced at
/// parse time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionScore {
    pub completeness: u8,
    pub faithfulness: u8,
    pub clinical_accuracy: u8,
    pub reasoning: String,
}

/// Parsed output of one judge evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgmentResult {
    pub section_scores: BTreeMap<Section, SectionScore>,
    pub hallucinations: Vec<Hallucination>,
    pub omissions: Vec<Omission>,
    /// Overall note quality, 1..=5.
    pub overall_quality: u8,
    pub overall_reasoning: String,
}

impl JudgmentResult {
    pub fn hallucinations_with_severity(&self, severity: Severity) -> usize {
        self.hallucinations
            .iter()
            .filter(|h| h.severity == severity)
            .count()
    }
}

/// Whether the judgment layer produced a result for a note.
///
/// `Unavailable` is the distinct error state of a note whose judge calls were
/// exhausted without a parseable response. It is never collapsed into an
/// empty (falsely clean) `JudgmentResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JudgmentOutcome {
    Available(JudgmentResult),
    Unavailable { error: String },
}

impl JudgmentOutcome {
    pub fn as_available(&self) -> Option<&JudgmentResult> {
        match self {
            JudgmentOutcome::Available(result) => Some(result),
            JudgmentOutcome::Unavailable { .. } => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, JudgmentOutcome::Unavailable { .. })
    }
}

// ═══════════════════════════════════════════════════════════
// Quality gate
// ═══════════════════════════════════════════════════════════

/// Three-tier routing decision for a note.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GateDecision {
    /// Safe to push downstream.
    PASS,
    /// Needs human review.
    REVIEW,
    /// Critical issues, block.
    FAIL,
}

/// Gate decision with every triggered rule's reason retained, in rule order.
/// Terminal: not revisited after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateDecision {
    pub decision: GateDecision,
    pub reasons: Vec<String>,
}

// ═══════════════════════════════════════════════════════════
// Per-note and batch reports
// ═══════════════════════════════════════════════════════════

/// Complete evaluation of a single note. Created once, immutable, unique by
/// `note_id` within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub note_id: String,
    pub quality_gate: QualityGateDecision,
    pub overall_score: f64,
    pub deterministic: DeterministicResult,
    pub judgment: JudgmentOutcome,
}

/// A note rejected before evaluation (malformed input). Listed explicitly in
/// the batch report so completeness stays auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedNote {
    pub note_id: String,
    pub reason: String,
}

/// Results from evaluating the evaluator itself against synthetic cases with
/// known injected errors. Sensitivity and specificity are reported
/// separately: a judge that flags everything scores perfectly on recall, so
/// one blended "accuracy" number would hide over-flagging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaEvalResult {
    pub total_cases: usize,
    pub error_cases: usize,
    pub errors_detected: usize,
    pub clean_cases: usize,
    pub clean_passed: usize,
    /// errors_detected / error_cases (0.0 when no error cases).
    pub sensitivity: f64,
    /// clean_passed / clean_cases (0.0 when no clean cases).
    pub specificity: f64,
    /// One audit line per case.
    pub details: Vec<String>,
}

/// Aggregate report across all evaluated notes. Report order is processing
/// order and carries no meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_notes: usize,
    pub reports: Vec<EvalReport>,
    #[serde(default)]
    pub rejected: Vec<RejectedNote>,
    #[serde(default)]
    pub meta_eval: Option<MetaEvalResult>,
    pub avg_overall_score: f64,
    pub gate_distribution: BTreeMap<GateDecision, usize>,
    pub total_hallucinations: usize,
    pub total_omissions: usize,
    pub most_common_hallucination_types: BTreeMap<HallucinationType, usize>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}
