//! SOAP section parser and completeness check.
//!
//! Splits a note on recognized section headers (full names and common
//! abbreviations, case-insensitive) into the four canonical sections. Text
//! before the first recognized header is discarded. A header with an empty
//! or near-empty body does not count as present.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Section, SectionPresence};

/// Header patterns per section. For each section the first pattern with a
/// match wins; patterns are tried in order.
static SECTION_PATTERNS: LazyLock<Vec<(Section, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            Section::Subjective,
            vec![
                Regex::new(r"(?i)(?:^|\n)\s*S(?:ubjective)?[\s:.\-]").unwrap(),
                Regex::new(
                    r"(?i)(?:^|\n)\s*(?:Chief\s+Complaint|History\s+of\s+Present|HPI|CC)[\s:.\-]",
                )
                .unwrap(),
            ],
        ),
        (
            Section::Objective,
            vec![
                Regex::new(r"(?i)(?:^|\n)\s*O(?:bjective)?[\s:.\-]").unwrap(),
                Regex::new(r"(?i)(?:^|\n)\s*(?:Physical\s+Exam|Vital\s+Signs|PE|Vitals)[\s:.\-]")
                    .unwrap(),
            ],
        ),
        (
            Section::Assessment,
            vec![
                Regex::new(r"(?i)(?:^|\n)\s*A(?:ssessment)?[\s:.\-]").unwrap(),
                Regex::new(
                    r"(?i)(?:^|\n)\s*(?:Diagnosis|Impression|Assessment\s+and\s+Plan)[\s:.\-]",
                )
                .unwrap(),
            ],
        ),
        (
            Section::Plan,
            vec![
                Regex::new(r"(?i)(?:^|\n)\s*P(?:lan)?[\s:.\-]").unwrap(),
                Regex::new(r"(?i)(?:^|\n)\s*(?:Treatment\s+Plan|Follow[\s-]?up|Disposition)[\s:.\-]")
                    .unwrap(),
            ],
        ),
    ]
});

/// `S:` / `O:` / `A:` / `P:` shorthand, tried only when no long-form header
/// matched. Uppercase only: a lowercase single letter before a colon is far
/// more likely prose than a header.
static SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\n)\s*([SOAP]):").unwrap());

fn shorthand_section(letter: &str) -> Option<Section> {
    match letter {
        "S" => Some(Section::Subjective),
        "O" => Some(Section::Objective),
        "A" => Some(Section::Assessment),
        "P" => Some(Section::Plan),
        _ => None,
    }
}

/// Extract the body text of each SOAP section found in the note.
pub fn parse_sections(note: &str) -> BTreeMap<Section, String> {
    // (section, header_start, content_start)
    let mut boundaries: Vec<(Section, usize, usize)> = Vec::new();

    for (section, patterns) in SECTION_PATTERNS.iter() {
        for pattern in patterns {
            if let Some(m) = pattern.find(note) {
                boundaries.push((*section, m.start(), m.end()));
                break;
            }
        }
    }

    if boundaries.is_empty() {
        for caps in SHORTHAND.captures_iter(note) {
            let m = caps.get(0).unwrap();
            if let Some(section) = shorthand_section(&caps[1]) {
                boundaries.push((section, m.start(), m.end()));
            }
        }
    }

    boundaries.sort_by_key(|&(_, start, _)| start);

    let mut sections = BTreeMap::new();
    for (i, &(section, _, content_start)) in boundaries.iter().enumerate() {
        let content_end = boundaries
            .get(i + 1)
            .map(|&(_, next_start, _)| next_start)
            .unwrap_or(note.len());
        let text = note[content_start..content_end].trim().to_string();
        sections.insert(section, text);
    }

    sections
}

static COMBINED_A_AND_P: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)assessment\s+and\s+plan").unwrap());

/// Check which sections are present with meaningful content.
///
/// Returns presence flags, a completeness score (fraction of the four
/// sections present), and the parsed section bodies.
pub fn check_sections(
    note: &str,
    min_section_chars: usize,
) -> (SectionPresence, f64, BTreeMap<Section, String>) {
    let mut sections = parse_sections(note);

    // A combined "Assessment and Plan" header parses as assessment only.
    // Count it for both sections.
    if sections.contains_key(&Section::Assessment)
        && !sections.contains_key(&Section::Plan)
        && COMBINED_A_AND_P.is_match(note)
    {
        let body = sections[&Section::Assessment].clone();
        sections.insert(Section::Plan, body);
    }

    let present = |section: Section| {
        sections
            .get(&section)
            .map(|body| body.len() >= min_section_chars)
            .unwrap_or(false)
    };

    let presence = SectionPresence {
        subjective: present(Section::Subjective),
        objective: present(Section::Objective),
        assessment: present(Section::Assessment),
        plan: present(Section::Plan),
    };

    let completeness = presence.present_count() as f64 / Section::ALL.len() as f64;

    (presence, completeness, sections)
}
