use serde::{Deserialize, Serialize};

/// Phrases suggesting the intake review found everything it needs.
pub const COMPLETE_INDICATORS: &[&str] = &[
    "complete",
    "sufficient",
    "adequate",
    "ready for technical review",
    "all required information",
    "no missing items",
];

/// Phrases suggesting something is missing.
pub const INCOMPLETE_INDICATORS: &[&str] = &[
    "missing",
    "incomplete",
    "insufficient",
    "additional information required",
    "need more",
    "lacks",
];

/// Words that make a technical review raise a flag.
pub const CONCERN_INDICATORS: &[&str] = &["concern", "risk", "issue", "problem"];

/// Number of `phrases` that occur in `text` (each phrase counts once).
/// `text` is expected lower-cased.
pub fn count_hits(text: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|p| text.contains(*p)).count()
}

pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

/// Whether a review response mentions a concern.
pub fn has_concerns(response: &str) -> bool {
    contains_any(&response.to_lowercase(), CONCERN_INDICATORS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Completeness {
    Complete,
    Incomplete,
}

impl Completeness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "COMPLETE",
            Self::Incomplete => "INCOMPLETE",
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for Completeness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether an intake response says the item is complete.
pub trait CompletenessClassifier: Send + Sync {
    fn classify(&self, response: &str) -> Completeness;
}

/// Phrase-counting classifier.
///
/// Complete when positive hits outnumber negative ones, or when neither
/// list matches at all. Any tie with hits is incomplete.
#[derive(Debug, Clone)]
pub struct KeywordCompletenessClassifier {
    complete: Vec<String>,
    incomplete: Vec<String>,
}

impl Default for KeywordCompletenessClassifier {
    fn default() -> Self {
        Self::new(COMPLETE_INDICATORS, INCOMPLETE_INDICATORS)
    }
}

impl KeywordCompletenessClassifier {
    pub fn new(complete: &[&str], incomplete: &[&str]) -> Self {
        Self {
            complete: complete.iter().map(|p| p.to_lowercase()).collect(),
            incomplete: incomplete.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// (positive, negative) hit counts for `response`.
    pub fn score(&self, response: &str) -> (usize, usize) {
        let lower = response.to_lowercase();
        let positive = self.complete.iter().filter(|p| lower.contains(p.as_str())).count();
        let negative = self.incomplete.iter().filter(|p| lower.contains(p.as_str())).count();
        (positive, negative)
    }
}

impl CompletenessClassifier for KeywordCompletenessClassifier {
    fn classify(&self, response: &str) -> Completeness {
        let (positive, negative) = self.score(response);
        let verdict = if positive > negative || (positive == 0 && negative == 0) {
            Completeness::Complete
        } else {
            Completeness::Incomplete
        };
        tracing::debug!(positive, negative, verdict = %verdict, "Completeness classified");
        verdict
    }
}
