//! Quality gate: routes each note to PASS, REVIEW, or FAIL.
//!
//! Rules are evaluated top to bottom and every triggered rule's reason is
//! retained, so a note that fails for one reason still surfaces its other
//! problems to the reviewer. The final decision is the worst tier any rule
//! reached.
//!
//! When the judgment is unavailable the judge-dependent rules are skipped
//! and the note is held at REVIEW as a floor: an unjudged note never passes.

use crate::config::GateThresholds;
use crate::models::{
    DeterministicResult, GateDecision, JudgmentOutcome, QualityGateDecision, Section, Severity,
};

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn percent(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}

fn missing_section_names(missing: &[Section]) -> String {
    missing
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Apply the gate rule table to one note's results.
pub fn decide(
    deterministic: &DeterministicResult,
    judgment: &JudgmentOutcome,
    thresholds: &GateThresholds,
) -> QualityGateDecision {
    let mut decision = GateDecision::PASS;
    let mut reasons: Vec<String> = Vec::new();
    let judged = judgment.as_available();

    fn fail(reasons: &mut Vec<String>, decision: &mut GateDecision, reason: String) {
        reasons.push(reason);
        *decision = GateDecision::FAIL;
    }
    fn review(reasons: &mut Vec<String>, decision: &mut GateDecision, reason: String) {
        reasons.push(reason);
        if *decision != GateDecision::FAIL {
            *decision = GateDecision::REVIEW;
        }
    }

    // FAIL tier
    if let Some(result) = judged {
        if let Some(h) = result
            .hallucinations
            .iter()
            .find(|h| h.severity == Severity::Critical)
        {
            fail(
                &mut reasons,
                &mut decision,
                format!("Critical hallucination: {}", truncate_chars(&h.note_text, 80)),
            );
        }
    }

    let missing = deterministic.sections_present.missing();
    if !missing.is_empty()
        || deterministic.section_completeness_score < thresholds.min_section_completeness
    {
        fail(
            &mut reasons,
            &mut decision,
            format!(
                "Missing SOAP sections ({}; completeness: {})",
                missing_section_names(&missing),
                percent(deterministic.section_completeness_score)
            ),
        );
    }

    if let Some(result) = judged {
        if result.overall_quality <= thresholds.fail_quality_max {
            fail(
                &mut reasons,
                &mut decision,
                format!("Very low quality score: {}/5", result.overall_quality),
            );
        }

        let major_count = result.hallucinations_with_severity(Severity::Major);
        if major_count >= thresholds.major_hallucination_fail_count {
            fail(
                &mut reasons,
                &mut decision,
                format!("{major_count} major hallucination(s) - note is unreliable"),
            );
        } else if major_count > 0 {
            review(
                &mut reasons,
                &mut decision,
                format!("{major_count} major hallucination(s) detected"),
            );
        }
    }

    // REVIEW tier
    if deterministic.entity_grounding_rate < thresholds.min_grounding_rate
        && !deterministic.entities_checked.is_empty()
    {
        review(
            &mut reasons,
            &mut decision,
            format!(
                "Low entity grounding: {}",
                percent(deterministic.entity_grounding_rate)
            ),
        );
    }

    if !deterministic.contradictions.is_empty() {
        review(
            &mut reasons,
            &mut decision,
            format!(
                "{} contradiction(s) found",
                deterministic.contradictions.len()
            ),
        );
    }

    if let Some(result) = judged {
        if result.overall_quality == thresholds.review_quality {
            review(
                &mut reasons,
                &mut decision,
                format!("Borderline quality score: {}/5", thresholds.review_quality),
            );
        }

        // Cross-validation between layers. High grounding alongside many
        // judge findings means the deterministic layer missed issues.
        let hallucination_count = result.hallucinations.len();
        if deterministic.entity_grounding_rate > thresholds.discrepancy_grounding_min
            && hallucination_count >= thresholds.discrepancy_hallucination_count
        {
            review(
                &mut reasons,
                &mut decision,
                format!(
                    "Layer discrepancy: deterministic grounding={} but judge found {} hallucinations",
                    percent(deterministic.entity_grounding_rate),
                    hallucination_count
                ),
            );
        }
    } else {
        review(
            &mut reasons,
            &mut decision,
            "Judgment unavailable - note requires human review".to_string(),
        );
    }

    if reasons.is_empty() {
        reasons.push("All checks passed".to_string());
    }

    QualityGateDecision { decision, reasons }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Contradiction, EntityGrounding, Hallucination, HallucinationType, JudgmentResult,
        SectionPresence,
    };

    fn clean_det() -> DeterministicResult {
        DeterministicResult {
            sections_present: SectionPresence {
                subjective: true,
                objective: true,
                assessment: true,
                plan: true,
            },
            section_completeness_score: 1.0,
            entities_checked: vec![],
            entity_grounding_rate: 1.0,
            contradictions: vec![],
        }
    }

    fn clean_judgment(quality: u8) -> JudgmentOutcome {
        JudgmentOutcome::Available(JudgmentResult {
            section_scores: Default::default(),
            hallucinations: vec![],
            omissions: vec![],
            overall_quality: quality,
            overall_reasoning: String::new(),
        })
    }

    fn with_hallucinations(quality: u8, hallucinations: Vec<Hallucination>) -> JudgmentOutcome {
        JudgmentOutcome::Available(JudgmentResult {
            section_scores: Default::default(),
            hallucinations,
            omissions: vec![],
            overall_quality: quality,
            overall_reasoning: String::new(),
        })
    }

    fn hallucination(severity: Severity) -> Hallucination {
        Hallucination {
            note_text: "Patient is on warfarin 5 mg daily for atrial fibrillation".into(),
            hallucination_type: HallucinationType::Fabrication,
            severity,
            explanation: String::new(),
            transcript_context: "not mentioned".into(),
        }
    }

    fn entity(found: bool) -> EntityGrounding {
        EntityGrounding {
            entity: "metformin 500 mg".into(),
            found_in_transcript: found,
            transcript_evidence: None,
        }
    }

    #[test]
    fn clean_note_passes() {
        let result = decide(&clean_det(), &clean_judgment(5), &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::PASS);
        assert_eq!(result.reasons, vec!["All checks passed"]);
    }

    #[test]
    fn critical_hallucination_fails() {
        let judgment = with_hallucinations(4, vec![hallucination(Severity::Critical)]);
        let result = decide(&clean_det(), &judgment, &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::FAIL);
        assert!(result.reasons[0].starts_with("Critical hallucination:"));
    }

    #[test]
    fn missing_plan_section_fails_at_exact_boundary() {
        let mut det = clean_det();
        det.sections_present.plan = false;
        det.section_completeness_score = 0.75;
        let result = decide(&det, &clean_judgment(5), &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::FAIL);
        assert!(result.reasons[0].contains("plan"));
        assert!(result.reasons[0].contains("75%"));
    }

    #[test]
    fn low_quality_score_fails() {
        let result = decide(&clean_det(), &clean_judgment(2), &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::FAIL);
        assert!(result.reasons[0].contains("2/5"));
    }

    #[test]
    fn three_major_hallucinations_fail() {
        let judgment = with_hallucinations(
            4,
            vec![
                hallucination(Severity::Major),
                hallucination(Severity::Major),
                hallucination(Severity::Major),
            ],
        );
        let result = decide(&clean_det(), &judgment, &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::FAIL);
        assert!(result.reasons[0].contains("unreliable"));
    }

    #[test]
    fn single_major_hallucination_reviews() {
        let judgment = with_hallucinations(4, vec![hallucination(Severity::Major)]);
        let result = decide(&clean_det(), &judgment, &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::REVIEW);
        assert!(result.reasons[0].contains("1 major hallucination"));
    }

    #[test]
    fn low_grounding_reviews_only_with_entities() {
        let mut det = clean_det();
        det.entity_grounding_rate = 0.5;
        // no entities checked: vacuous rate, no review
        let result = decide(&det, &clean_judgment(5), &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::PASS);

        det.entities_checked = vec![entity(true), entity(false)];
        let result = decide(&det, &clean_judgment(5), &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::REVIEW);
        assert!(result.reasons[0].contains("50%"));
    }

    #[test]
    fn contradiction_reviews() {
        let mut det = clean_det();
        det.contradictions = vec![Contradiction {
            note_claim: "Note states denial of: chest pain".into(),
            transcript_evidence: "Patient reports: chest pain".into(),
            description: "polarity flip".into(),
        }];
        let result = decide(&det, &clean_judgment(5), &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::REVIEW);
    }

    #[test]
    fn borderline_quality_reviews() {
        let result = decide(&clean_det(), &clean_judgment(3), &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::REVIEW);
        assert!(result.reasons[0].contains("3/5"));
    }

    #[test]
    fn layer_discrepancy_reviews_and_reason_survives_fail() {
        // High grounding, enough hallucinations for discrepancy, and so many
        // majors that the note also fails outright. The discrepancy reason
        // must still be in the list.
        let mut det = clean_det();
        det.entity_grounding_rate = 0.95;
        det.entities_checked = vec![entity(true)];
        let judgment = with_hallucinations(
            4,
            vec![
                hallucination(Severity::Major),
                hallucination(Severity::Major),
                hallucination(Severity::Major),
                hallucination(Severity::Minor),
            ],
        );
        let result = decide(&det, &judgment, &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::FAIL);
        assert!(result.reasons.iter().any(|r| r.contains("discrepancy")));
    }

    #[test]
    fn layer_discrepancy_alone_reviews() {
        let mut det = clean_det();
        det.entity_grounding_rate = 0.9;
        det.entities_checked = vec![entity(true)];
        let judgment = with_hallucinations(
            4,
            vec![
                hallucination(Severity::Minor),
                hallucination(Severity::Minor),
                hallucination(Severity::Minor),
            ],
        );
        let result = decide(&det, &judgment, &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::REVIEW);
        assert!(result.reasons.iter().any(|r| r.contains("discrepancy")));
    }

    #[test]
    fn unavailable_judgment_never_passes() {
        let outcome = JudgmentOutcome::Unavailable {
            error: "retries exhausted".into(),
        };
        let result = decide(&clean_det(), &outcome, &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::REVIEW);
        assert!(result.reasons[0].contains("Judgment unavailable"));
    }

    #[test]
    fn unavailable_judgment_still_fails_on_missing_sections() {
        let mut det = clean_det();
        det.sections_present.assessment = false;
        det.section_completeness_score = 0.75;
        let outcome = JudgmentOutcome::Unavailable {
            error: "retries exhausted".into(),
        };
        let result = decide(&det, &outcome, &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::FAIL);
        assert!(result.reasons.iter().any(|r| r.contains("assessment")));
    }

    #[test]
    fn all_triggered_reasons_retained() {
        let mut det = clean_det();
        det.entity_grounding_rate = 0.5;
        det.entities_checked = vec![entity(false), entity(true)];
        det.contradictions = vec![Contradiction {
            note_claim: "x".into(),
            transcript_evidence: "y".into(),
            description: "z".into(),
        }];
        let result = decide(&det, &clean_judgment(3), &GateThresholds::default());
        assert_eq!(result.decision, GateDecision::REVIEW);
        assert_eq!(result.reasons.len(), 3);
    }
}
