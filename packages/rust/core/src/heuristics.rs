//! Pattern-based party and type extraction.
//!
//! Used when classifier output is unusable. Deterministic and free of I/O.

use std::collections::HashSet;
use std::sync::LazyLock;

use pactlens_shared::{ContractType, Party};
use regex::Regex;

/// Maximum number of parties returned.
pub const MAX_PARTIES: usize = 5;

/// A run of capitalized words on a single line, e.g. `Acme Corp.` or `John Smith`.
/// A dot may only end the run, so a name never spans two sentences.
const NAME: &str = r"[A-Z][\w&'\-]*(?:\.[A-Z][\w&'\-]*)*(?:[ \t]+[A-Z][\w&'\-]*(?:\.[A-Z][\w&'\-]*)*)*\.?";

/// Abbreviations whose trailing dot belongs to the name.
const DOTTED_SUFFIXES: [&str; 6] = ["Inc", "Corp", "Co", "Ltd", "L.L.C", "N.A"];

static BETWEEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i:\bby\s+and\s+between|\bbetween)\s+({NAME})(?:\s*,[^,\n]*,)?\s+(?i:and)\s+({NAME})"
    ))
    .expect("between pattern")
});

static ROLE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i:\b(employer|company|corporation|employee(?:\s+name)?))[ \t]*:[ \t]*({NAME})"
    ))
    .expect("role label pattern")
});

static PARTY_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i:\bpart(?:y|ies)[ \t]+(?:a|b|1|2|one|two))\b[ \t]*:[ \t]*({NAME})"
    ))
    .expect("party label pattern")
});

static ENTITY_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b((?:[A-Z][\w&'\-]*[ \t]+){1,4}(?:Corporation|Corp|Company|Co|Incorporated|Inc|LLC|L\.L\.C|Limited|Ltd)\b\.?)",
    )
    .expect("entity suffix pattern")
});

static DETECTED_TYPE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""detected_type"\s*:\s*"([^"]+)""#).expect("detected_type pattern")
});

const EMPLOYMENT_CUES: [&str; 6] = [
    "employment",
    "employee",
    "employer",
    "job duties",
    "salary",
    "benefits",
];

/// Collects unique party names in discovery order.
struct PartyCollector {
    seen: HashSet<String>,
    parties: Vec<Party>,
}

impl PartyCollector {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            parties: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.parties.len() >= MAX_PARTIES
    }

    fn push(&mut self, raw: &str, role: &str) {
        if self.is_full() {
            return;
        }
        let name = clean_name(raw);
        if name.chars().count() <= 2 || !self.seen.insert(name.clone()) {
            return;
        }
        let description = format!("Detected {} from contract text", role.to_lowercase());
        self.parties.push(Party::new(name, role, description));
    }
}

/// Extract up to [`MAX_PARTIES`] parties from raw contract text.
///
/// Pattern families run in order: "between X and Y", role-labeled lines,
/// "Party A/B" labels, and finally bare entity names with a corporate suffix
/// when nothing else matched. Names are deduplicated by exact trimmed text.
pub fn extract_parties(text: &str) -> Vec<Party> {
    let mut collector = PartyCollector::new();

    for caps in BETWEEN.captures_iter(text) {
        collector.push(&caps[1], "Party");
        collector.push(&caps[2], "Party");
    }

    for caps in ROLE_LABEL.captures_iter(text) {
        let role = if caps[1].to_ascii_lowercase().starts_with("employee") {
            "Employee"
        } else {
            "Employer"
        };
        collector.push(&caps[2], role);
    }

    for caps in PARTY_LABEL.captures_iter(text) {
        collector.push(&caps[1], "Party");
    }

    if collector.parties.is_empty() {
        for caps in ENTITY_SUFFIX.captures_iter(text) {
            collector.push(&caps[1], "Entity");
        }
    }

    collector.parties
}

/// Whether the text carries employment-specific vocabulary.
pub fn has_employment_cues(text: &str) -> bool {
    let lower = text.to_lowercase();
    EMPLOYMENT_CUES.iter().any(|cue| lower.contains(cue))
}

/// Pull a `"detected_type": "..."` value out of output that failed to parse.
pub fn salvage_detected_type(raw: &str) -> Option<ContractType> {
    DETECTED_TYPE_FIELD
        .captures(raw)
        .map(|caps| ContractType::from_label(&caps[1]))
}

fn clean_name(raw: &str) -> String {
    let mut name = raw.trim().trim_end_matches([',', ';', ':']).trim_end();
    if let Some(stripped) = name.strip_suffix('.') {
        let last_word = stripped.rsplit([' ', '\t']).next().unwrap_or(stripped);
        if !DOTTED_SUFFIXES.contains(&last_word) {
            name = stripped;
        }
    }
    name.to_string()
}
