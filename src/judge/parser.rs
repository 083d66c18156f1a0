//! Strict parsing of judge output into typed results.
//!
//! The judge is asked for a fixed JSON shape but models wrap output in
//! markdown fences or drift from the enum vocabularies. Fences are stripped;
//! vocabulary drift is NOT forgiven: an unknown severity, type, or section
//! is an error that triggers a re-prompt upstream rather than a silent
//! default.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::judge::JudgeError;
use crate::models::{
    Hallucination, HallucinationType, JudgmentResult, Omission, Section, SectionScore, Severity,
};

#[derive(Debug, Deserialize)]
struct RawJudgment {
    #[serde(default)]
    section_scores: BTreeMap<String, RawSectionScore>,
    #[serde(default)]
    hallucinations: Vec<RawHallucination>,
    #[serde(default)]
    omissions: Vec<RawOmission>,
    overall_quality: i64,
    #[serde(default)]
    overall_reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawSectionScore {
    completeness: i64,
    faithfulness: i64,
    clinical_accuracy: i64,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawHallucination {
    note_text: String,
    hallucination_type: String,
    severity: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    transcript_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOmission {
    transcript_text: String,
    expected_section: String,
    clinical_importance: String,
    #[serde(default)]
    explanation: String,
}

/// Strip a surrounding markdown code fence, if any.
fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    if !text.starts_with("```") {
        return text;
    }
    let Some(first_newline) = text.find('\n') else {
        return text;
    };
    let last_fence = text.rfind("```").unwrap_or(0);
    if last_fence > first_newline {
        text[first_newline + 1..last_fence].trim()
    } else {
        text
    }
}

fn rating(field: &str, value: i64) -> Result<u8, JudgeError> {
    if (1..=5).contains(&value) {
        Ok(value as u8)
    } else {
        Err(JudgeError::RatingOutOfRange {
            field: field.to_string(),
            value,
        })
    }
}

fn severity(s: &str) -> Result<Severity, JudgeError> {
    Severity::parse(s).ok_or_else(|| JudgeError::UnknownSeverity(s.to_string()))
}

/// Parse raw judge text into a [`JudgmentResult`].
pub fn parse_judgment(text: &str) -> Result<JudgmentResult, JudgeError> {
    let body = strip_fences(text);
    let raw: RawJudgment =
        serde_json::from_str(body).map_err(|e| JudgeError::JsonParsing(e.to_string()))?;

    let mut section_scores = BTreeMap::new();
    for (name, scores) in raw.section_scores {
        let section =
            Section::parse(&name).ok_or_else(|| JudgeError::UnknownSection(name.clone()))?;
        section_scores.insert(
            section,
            SectionScore {
                completeness: rating(&format!("{name}.completeness"), scores.completeness)?,
                faithfulness: rating(&format!("{name}.faithfulness"), scores.faithfulness)?,
                clinical_accuracy: rating(
                    &format!("{name}.clinical_accuracy"),
                    scores.clinical_accuracy,
                )?,
                reasoning: scores.reasoning,
            },
        );
    }

    let mut hallucinations = Vec::with_capacity(raw.hallucinations.len());
    for h in raw.hallucinations {
        hallucinations.push(Hallucination {
            hallucination_type: HallucinationType::parse(&h.hallucination_type)
                .ok_or_else(|| JudgeError::UnknownHallucinationType(h.hallucination_type.clone()))?,
            severity: severity(&h.severity)?,
            note_text: h.note_text,
            explanation: h.explanation,
            transcript_context: h
                .transcript_context
                .unwrap_or_else(|| "not mentioned".to_string()),
        });
    }

    let mut omissions = Vec::with_capacity(raw.omissions.len());
    for o in raw.omissions {
        omissions.push(Omission {
            expected_section: Section::parse(&o.expected_section)
                .ok_or_else(|| JudgeError::UnknownSection(o.expected_section.clone()))?,
            clinical_importance: severity(&o.clinical_importance)?,
            transcript_text: o.transcript_text,
            explanation: o.explanation,
        });
    }

    Ok(JudgmentResult {
        section_scores,
        hallucinations,
        omissions,
        overall_quality: rating("overall_quality", raw.overall_quality)?,
        overall_reasoning: raw.overall_reasoning,
    })
}

#[cfg(test)]
pub mod tests_support {
    /// A minimal well-formed judge response shared by several test modules.
    pub fn minimal_valid_response() -> String {
        r#"{
            "section_scores": {
                "subjective": {"completeness": 4, "faithfulness": 5, "clinical_accuracy": 4, "reasoning": "Good capture."},
                "objective": {"completeness": 4, "faithfulness": 4, "clinical_accuracy": 4, "reasoning": "Vitals recorded."},
                "assessment": {"completeness": 4, "faithfulness": 4, "clinical_accuracy": 5, "reasoning": "Reasonable."},
                "plan": {"completeness": 4, "faithfulness": 4, "clinical_accuracy": 4, "reasoning": "Appropriate."}
            },
            "hallucinations": [],
            "omissions": [],
            "overall_quality": 4,
            "overall_reasoning": "Faithful note overall."
        }"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::minimal_valid_response;
    use super::*;

    #[test]
    fn parses_minimal_response() {
        let result = parse_judgment(&minimal_valid_response()).unwrap();
        assert_eq!(result.section_scores.len(), 4);
        assert_eq!(result.overall_quality, 4);
        assert!(result.hallucinations.is_empty());
    }

    #[test]
    fn strips_markdown_fences() {
        let fenced = format!("```json\n{}\n```", minimal_valid_response());
        let result = parse_judgment(&fenced).unwrap();
        assert_eq!(result.overall_quality, 4);
    }

    #[test]
    fn parses_findings_with_taxonomy() {
        let text = r#"{
            "section_scores": {},
            "hallucinations": [{
                "note_text": "Patient has a family history of coronary artery disease.",
                "hallucination_type": "fabrication",
                "severity": "major",
                "explanation": "Family history never discussed.",
                "transcript_context": "not mentioned in transcript"
            }],
            "omissions": [{
                "transcript_text": "I'm allergic to penicillin.",
                "expected_section": "subjective",
                "clinical_importance": "critical",
                "explanation": "Allergy must be documented."
            }],
            "overall_quality": 2,
            "overall_reasoning": "Fabricated history and missing allergy."
        }"#;
        let result = parse_judgment(text).unwrap();
        assert_eq!(
            result.hallucinations[0].hallucination_type,
            HallucinationType::Fabrication
        );
        assert_eq!(result.omissions[0].clinical_importance, Severity::Critical);
        assert_eq!(result.omissions[0].expected_section, Section::Subjective);
    }

    #[test]
    fn missing_transcript_context_gets_placeholder() {
        let text = r#"{
            "section_scores": {},
            "hallucinations": [{
                "note_text": "BP 150/90",
                "hallucination_type": "contextual",
                "severity": "minor"
            }],
            "omissions": [],
            "overall_quality": 3
        }"#;
        let result = parse_judgment(text).unwrap();
        assert_eq!(result.hallucinations[0].transcript_context, "not mentioned");
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_judgment("The note looks fine to me.").unwrap_err();
        assert!(matches!(err, JudgeError::JsonParsing(_)));
    }

    #[test]
    fn rejects_unknown_severity() {
        let text = r#"{
            "section_scores": {},
            "hallucinations": [{
                "note_text": "x",
                "hallucination_type": "fabrication",
                "severity": "catastrophic"
            }],
            "omissions": [],
            "overall_quality": 3
        }"#;
        let err = parse_judgment(text).unwrap_err();
        assert!(matches!(err, JudgeError::UnknownSeverity(_)));
    }

    #[test]
    fn rejects_unknown_hallucination_type() {
        let text = r#"{
            "section_scores": {},
            "hallucinations": [{
                "note_text": "x",
                "hallucination_type": "causality",
                "severity": "minor"
            }],
            "omissions": [],
            "overall_quality": 3
        }"#;
        let err = parse_judgment(text).unwrap_err();
        assert!(matches!(err, JudgeError::UnknownHallucinationType(_)));
    }

    #[test]
    fn rejects_out_of_range_rating() {
        let text = r#"{
            "section_scores": {
                "plan": {"completeness": 7, "faithfulness": 4, "clinical_accuracy": 4}
            },
            "hallucinations": [],
            "omissions": [],
            "overall_quality": 4
        }"#;
        let err = parse_judgment(text).unwrap_err();
        assert!(matches!(
            err,
            JudgeError::RatingOutOfRange { value: 7, .. }
        ));
    }

    #[test]
    fn rejects_unknown_section_key() {
        let text = r#"{
            "section_scores": {
                "summary": {"completeness": 4, "faithfulness": 4, "clinical_accuracy": 4}
            },
            "hallucinations": [],
            "omissions": [],
            "overall_quality": 4
        }"#;
        let err = parse_judgment(text).unwrap_err();
        assert!(matches!(err, JudgeError::UnknownSection(_)));
    }
}
