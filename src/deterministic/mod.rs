//! Layer 1: deterministic checks.
//!
//! Fast, free, reproducible checks that run before any judge call. They
//! catch structural problems (missing sections), ungrounded entities, and
//! blatant negation contradictions.

pub mod grounding;
pub mod negation;
pub mod sections;

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{DeterministicResult, Section};

/// Run all deterministic checks on one note. Returns the findings plus the
/// parsed section bodies, which the judge prompt reuses.
pub fn run_checks(
    note: &str,
    transcript: &str,
    min_section_chars: usize,
) -> (DeterministicResult, BTreeMap<Section, String>) {
    let (presence, completeness, section_texts) = sections::check_sections(note, min_section_chars);
    let (entities_checked, entity_grounding_rate) = grounding::check_grounding(note, transcript);
    let contradictions = negation::detect_contradictions(note, transcript);

    debug!(
        completeness,
        grounding_rate = entity_grounding_rate,
        entities = entities_checked.len(),
        contradictions = contradictions.len(),
        "deterministic checks complete"
    );

    let result = DeterministicResult {
        sections_present: presence,
        section_completeness_score: completeness,
        entities_checked,
        entity_grounding_rate,
        contradictions,
    };

    (result, section_texts)
}
