use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Default cap applied when raw text stands in for a missing explanation.
pub const RAW_TEXT_LIMIT: usize = 500;

static NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").ok());

/// Values of `LABEL: value` sections found in a free-text response.
///
/// A value runs from its label to the next known label (or end of text).
/// The first occurrence of a label wins. Never fails: unknown or missing
/// labels simply read as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSections {
    values: HashMap<String, String>,
    raw: String,
}

impl LabeledSections {
    pub fn parse(text: &str, labels: &[&str]) -> Self {
        let mut values = HashMap::new();

        if let Some(re) = label_regex(labels) {
            let matches: Vec<_> = re.captures_iter(text).collect();
            for (i, caps) in matches.iter().enumerate() {
                let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let end = matches
                    .get(i + 1)
                    .and_then(|next| next.get(0))
                    .map(|m| m.start())
                    .unwrap_or(text.len());
                let value = clean_value(&text[whole.end()..end]);
                values.entry(label.as_str().to_string()).or_insert(value);
            }
        }

        Self {
            values,
            raw: text.to_string(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn contains(&self, label: &str) -> bool {
        self.values.contains_key(label)
    }

    /// Trimmed value of `label`; `None` when absent or blank.
    pub fn text(&self, label: &str) -> Option<&str> {
        self.values
            .get(label)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn text_or(&self, label: &str, default: &str) -> String {
        self.text(label).unwrap_or(default).to_string()
    }

    /// Value of `label`, or the raw response capped at `limit` characters.
    pub fn text_or_raw(&self, label: &str, limit: usize) -> String {
        match self.text(label) {
            Some(value) => value.to_string(),
            None => truncate_chars(&self.raw, limit),
        }
    }

    /// First number inside the value of `label`.
    pub fn number(&self, label: &str) -> Option<f64> {
        let value = self.text(label)?;
        let re = NUMBER.as_ref()?;
        re.find(value).and_then(|m| m.as_str().parse().ok())
    }

    pub fn number_or(&self, label: &str, default: f64) -> f64 {
        self.number(label).unwrap_or(default)
    }
}

/// Render `LABEL: value` lines; the inverse of `LabeledSections::parse`.
pub fn render_sections(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(label, value)| format!("{label}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First `limit` characters of `text` (char-safe).
pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn label_regex(labels: &[&str]) -> Option<Regex> {
    if labels.is_empty() {
        return None;
    }
    // Longest first so a label that prefixes another cannot shadow it.
    let mut sorted: Vec<&str> = labels.to_vec();
    sorted.sort_by_key(|l| std::cmp::Reverse(l.len()));
    let alternation = sorted
        .iter()
        .map(|l| regex::escape(l))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\*{{0,2}}\b({alternation})\b\*{{0,2}}\s*:\**")).ok()
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_end_matches(['|', '*'])
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const L2_LABELS: &[&str] = &[
        "SCORE",
        "RISK_LEVEL",
        "RISK_FACTORS",
        "RECOMMENDATIONS",
        "EXPLANATION",
    ];

    #[test]
    fn single_line_pipe_format() {
        let sections = LabeledSections::parse(
            "SCORE: 75 | EXPLANATION: Large transfer to a high-risk jurisdiction.",
            &["SCORE", "EXPLANATION"],
        );
        assert_eq!(sections.number("SCORE"), Some(75.0));
        assert_eq!(
            sections.text("EXPLANATION"),
            Some("Large transfer to a high-risk jurisdiction.")
        );
    }

    #[test]
    fn multiline_values_run_to_next_label() {
        let text = "SCORE: 62\nRISK_LEVEL: Medium\nRISK_FACTORS:\n- cash intensive\n- new account\nRECOMMENDATIONS: Verify source of funds\nEXPLANATION: Several indicators.";
        let sections = LabeledSections::parse(text, L2_LABELS);
        assert_eq!(sections.text("RISK_LEVEL"), Some("Medium"));
        assert_eq!(
            sections.text("RISK_FACTORS"),
            Some("- cash intensive\n- new account")
        );
        assert_eq!(sections.text("RECOMMENDATIONS"), Some("Verify source of funds"));
    }

    #[test]
    fn markdown_bold_labels() {
        let sections = LabeledSections::parse("**SCORE:** 40\n**RISK_LEVEL**: Low", L2_LABELS);
        assert_eq!(sections.number("SCORE"), Some(40.0));
        assert_eq!(sections.text("RISK_LEVEL"), Some("Low"));
    }

    #[test]
    fn risk_level_does_not_match_inner_words() {
        // "RISK_LEVEL" must not be read as a bare "LEVEL" label or vice versa.
        let sections = LabeledSections::parse("RISK_LEVEL: High", &["SCORE", "RISK_LEVEL"]);
        assert!(!sections.contains("SCORE"));
        assert_eq!(sections.text("RISK_LEVEL"), Some("High"));
    }

    #[test]
    fn missing_labels_use_defaults() {
        let sections = LabeledSections::parse("The model rambled without labels.", L2_LABELS);
        assert_eq!(sections.number_or("SCORE", 0.0), 0.0);
        assert_eq!(sections.text_or("RISK_LEVEL", "Unknown"), "Unknown");
        assert_eq!(sections.text_or("RISK_FACTORS", "N/A"), "N/A");
        assert_eq!(
            sections.text_or_raw("EXPLANATION", RAW_TEXT_LIMIT),
            "The model rambled without labels."
        );
    }

    #[test]
    fn raw_fallback_is_capped() {
        let text = "é".repeat(800);
        let sections = LabeledSections::parse(&text, L2_LABELS);
        let explanation = sections.text_or_raw("EXPLANATION", RAW_TEXT_LIMIT);
        assert_eq!(explanation.chars().count(), 500);
    }

    #[test]
    fn blank_value_reads_as_absent() {
        let sections = LabeledSections::parse("SCORE: | EXPLANATION: n/a", &["SCORE", "EXPLANATION"]);
        assert_eq!(sections.number("SCORE"), None);
        assert_eq!(sections.text("EXPLANATION"), Some("n/a"));
    }

    #[test]
    fn first_occurrence_wins() {
        let sections = LabeledSections::parse("SCORE: 10\nSCORE: 90", &["SCORE"]);
        assert_eq!(sections.number("SCORE"), Some(10.0));
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = "SCORE: 55\nRISK_LEVEL: Medium\nEXPLANATION: Structuring pattern.";
        assert_eq!(
            LabeledSections::parse(text, L2_LABELS),
            LabeledSections::parse(text, L2_LABELS)
        );
    }

    #[test]
    fn render_then_parse_recovers_values() {
        let pairs = [
            ("SCORE", "81"),
            ("RISK_LEVEL", "High"),
            ("RISK_FACTORS", "Shell company; round amounts"),
            ("RECOMMENDATIONS", "File a SAR"),
            ("EXPLANATION", "Matches layering typology."),
        ];
        let sections = LabeledSections::parse(&render_sections(&pairs), L2_LABELS);
        for (label, value) in pairs {
            assert_eq!(sections.text(label), Some(value), "label {label}");
        }
    }

    #[test]
    fn negative_and_decimal_numbers() {
        let sections = LabeledSections::parse("SCORE: about 42.5 points", &["SCORE"]);
        assert_eq!(sections.number("SCORE"), Some(42.5));
    }

    #[test]
    fn no_labels_configured() {
        let sections = LabeledSections::parse("SCORE: 5", &[]);
        assert!(!sections.contains("SCORE"));
        assert_eq!(sections.raw(), "SCORE: 5");
    }
}
