//! Overall score aggregation.
//!
//! Combines both layers into one normalized 0.0-1.0 score: section
//! completeness, entity grounding, the judge's section ratings (1-5 mapped
//! to 0-1), and a capped hallucination penalty. When the judgment is
//! unavailable the deterministic components are renormalized over their own
//! weights so the score stays comparable instead of silently collapsing.

use crate::config::{ScoreWeights, SeverityPenalties};
use crate::models::{DeterministicResult, JudgmentOutcome, JudgmentResult, Severity};

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Mean of all section ratings, normalized from 1..=5 to 0.0..=1.0. Empty
/// section scores contribute 0.0.
fn section_average(judgment: &JudgmentResult) -> f64 {
    if judgment.section_scores.is_empty() {
        return 0.0;
    }
    let mut sum = 0u32;
    let mut count = 0u32;
    for score in judgment.section_scores.values() {
        sum += u32::from(score.completeness)
            + u32::from(score.faithfulness)
            + u32::from(score.clinical_accuracy);
        count += 3;
    }
    (f64::from(sum) / f64::from(count) - 1.0) / 4.0
}

/// Severity-weighted penalty for hallucinations, capped at 1.0 so a pile of
/// minor findings cannot drive the score negative.
fn hallucination_penalty(judgment: &JudgmentResult, penalties: &SeverityPenalties) -> f64 {
    let critical = judgment.hallucinations_with_severity(Severity::Critical) as f64;
    let major = judgment.hallucinations_with_severity(Severity::Major) as f64;
    let minor = judgment.hallucinations_with_severity(Severity::Minor) as f64;
    (critical * penalties.critical + major * penalties.major + minor * penalties.minor).min(1.0)
}

/// Compute the overall score for one note.
pub fn overall_score(
    deterministic: &DeterministicResult,
    judgment: &JudgmentOutcome,
    weights: &ScoreWeights,
    penalties: &SeverityPenalties,
) -> f64 {
    let completeness = deterministic.section_completeness_score;
    let grounding = deterministic.entity_grounding_rate;

    let score = match judgment.as_available() {
        Some(result) => {
            weights.completeness * completeness
                + weights.grounding * grounding
                + weights.judge_sections * section_average(result)
                + weights.hallucination_free * (1.0 - hallucination_penalty(result, penalties))
        }
        None => {
            // Deterministic-only: renormalize over the deterministic weights.
            let det_weight = weights.completeness + weights.grounding;
            if det_weight <= 0.0 {
                0.0
            } else {
                (weights.completeness * completeness + weights.grounding * grounding) / det_weight
            }
        }
    };

    round3(score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::{
        Hallucination, HallucinationType, Section, SectionPresence, SectionScore,
    };

    fn det(completeness: f64, grounding: f64) -> DeterministicResult {
        DeterministicResult {
            sections_present: SectionPresence::default(),
            section_completeness_score: completeness,
            entities_checked: vec![],
            entity_grounding_rate: grounding,
            contradictions: vec![],
        }
    }

    fn judgment(ratings: u8, hallucinations: Vec<Hallucination>) -> JudgmentResult {
        let mut section_scores = BTreeMap::new();
        for section in Section::ALL {
            section_scores.insert(
                section,
                SectionScore {
                    completeness: ratings,
                    faithfulness: ratings,
                    clinical_accuracy: ratings,
                    reasoning: String::new(),
                },
            );
        }
        JudgmentResult {
            section_scores,
            hallucinations,
            omissions: vec![],
            overall_quality: ratings,
            overall_reasoning: String::new(),
        }
    }

    fn hallucination(severity: Severity) -> Hallucination {
        Hallucination {
            note_text: "claim".into(),
            hallucination_type: HallucinationType::Fabrication,
            severity,
            explanation: String::new(),
            transcript_context: "not mentioned".into(),
        }
    }

    #[test]
    fn perfect_note_scores_one() {
        let outcome = JudgmentOutcome::Available(judgment(5, vec![]));
        let score = overall_score(
            &det(1.0, 1.0),
            &outcome,
            &ScoreWeights::default(),
            &SeverityPenalties::default(),
        );
        assert_eq!(score, 1.0);
    }

    #[test]
    fn all_ones_judgment_zeroes_section_term() {
        // ratings of 1 normalize to 0.0, leaving the other components
        let outcome = JudgmentOutcome::Available(judgment(1, vec![]));
        let score = overall_score(
            &det(1.0, 1.0),
            &outcome,
            &ScoreWeights::default(),
            &SeverityPenalties::default(),
        );
        // 0.15 + 0.15 + 0.0 + 0.20
        assert_eq!(score, 0.5);
    }

    #[test]
    fn hallucination_penalty_scales_with_severity() {
        let weights = ScoreWeights::default();
        let penalties = SeverityPenalties::default();
        let clean = overall_score(
            &det(1.0, 1.0),
            &JudgmentOutcome::Available(judgment(5, vec![])),
            &weights,
            &penalties,
        );
        let with_major = overall_score(
            &det(1.0, 1.0),
            &JudgmentOutcome::Available(judgment(5, vec![hallucination(Severity::Major)])),
            &weights,
            &penalties,
        );
        let with_critical = overall_score(
            &det(1.0, 1.0),
            &JudgmentOutcome::Available(judgment(5, vec![hallucination(Severity::Critical)])),
            &weights,
            &penalties,
        );
        assert!(with_major < clean);
        assert!(with_critical < with_major);
        // 0.20 * 0.30 penalty off a perfect score
        assert_eq!(with_critical, 0.94);
    }

    #[test]
    fn penalty_capped_at_full_weight() {
        let many_critical = (0..10).map(|_| hallucination(Severity::Critical)).collect();
        let score = overall_score(
            &det(1.0, 1.0),
            &JudgmentOutcome::Available(judgment(5, many_critical)),
            &ScoreWeights::default(),
            &SeverityPenalties::default(),
        );
        // penalty caps at 1.0, so exactly the 0.20 weight is lost
        assert_eq!(score, 0.8);
    }

    #[test]
    fn unavailable_judgment_renormalizes_deterministic_weights() {
        let outcome = JudgmentOutcome::Unavailable {
            error: "timeout".into(),
        };
        let score = overall_score(
            &det(0.75, 0.9),
            &outcome,
            &ScoreWeights::default(),
            &SeverityPenalties::default(),
        );
        // (0.15*0.75 + 0.15*0.9) / 0.30
        assert_eq!(score, 0.825);
    }

    #[test]
    fn empty_section_scores_contribute_zero() {
        let result = JudgmentResult {
            section_scores: BTreeMap::new(),
            hallucinations: vec![],
            omissions: vec![],
            overall_quality: 3,
            overall_reasoning: String::new(),
        };
        let score = overall_score(
            &det(1.0, 1.0),
            &JudgmentOutcome::Available(result),
            &ScoreWeights::default(),
            &SeverityPenalties::default(),
        );
        assert_eq!(score, 0.5);
    }

    #[test]
    fn score_stays_in_bounds() {
        let outcome = JudgmentOutcome::Available(judgment(
            1,
            (0..20).map(|_| hallucination(Severity::Critical)).collect(),
        ));
        let score = overall_score(
            &det(0.0, 0.0),
            &outcome,
            &ScoreWeights::default(),
            &SeverityPenalties::default(),
        );
        assert!((0.0..=1.0).contains(&score));
    }
}
