//! Negation contradiction detector.
//!
//! Flags cases where the note denies a symptom the transcript has the
//! patient reporting. This is the cheapest hallucination pattern to catch
//! without an LLM.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::Contradiction;

static NOTE_DENIALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:denies|denied|no)\s+([\w\s]+?)(?:\.|,|;|$)").unwrap());

static TRANSCRIPT_REPORTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:I\s+have|I've\s+been\s+having|I\s+(?:feel|notice|experience)d?|yes.*?I\s+(?:do|have|am))\s+([\w\s]+?)(?:\.|,|;|\?|$)",
    )
    .unwrap()
});

static STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "i", "my", "is", "was", "been", "have", "has", "some", "any",
];

fn content_terms(phrase: &str) -> BTreeSet<String> {
    phrase
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Find note denials that overlap a transcript symptom report. One
/// contradiction per denial, matched against the first overlapping report.
pub fn detect_contradictions(note: &str, transcript: &str) -> Vec<Contradiction> {
    let denials: Vec<&str> = NOTE_DENIALS
        .captures_iter(note)
        .map(|c| c.get(1).map(|m| m.as_str()).unwrap_or(""))
        .collect();
    let reports: Vec<&str> = TRANSCRIPT_REPORTS
        .captures_iter(transcript)
        .map(|c| c.get(1).map(|m| m.as_str()).unwrap_or(""))
        .collect();

    let mut contradictions = Vec::new();

    for denial in &denials {
        let denial_terms = content_terms(denial);
        if denial_terms.is_empty() {
            continue;
        }
        // At least half the denial's content words must appear in a report.
        let threshold = std::cmp::max(1, denial_terms.len().div_ceil(2));

        for report in &reports {
            let report_terms = content_terms(report);
            let overlap: Vec<&str> = denial_terms
                .intersection(&report_terms)
                .map(|s| s.as_str())
                .collect();
            if overlap.len() >= threshold {
                let denial = denial.trim();
                let report = report.trim();
                contradictions.push(Contradiction {
                    note_claim: format!("Note states denial of: {denial}"),
                    transcript_evidence: format!("Patient reports: {report}"),
                    description: format!(
                        "Note denies '{denial}' but transcript indicates patient reports it. \
                         Overlapping terms: {}",
                        overlap.join(", ")
                    ),
                });
                break;
            }
        }
    }

    contradictions
}
