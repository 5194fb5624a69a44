use serde_json::Value;

use crate::context::ContextData;

/// Placeholder for absent or blank fields in prompts.
pub const NOT_AVAILABLE: &str = "N/A";

/// Incremental prompt assembly.
///
/// ```text
/// You are a Technical Review Officer.
///
/// Application:
/// - Applicant: Acme
///
/// Respond in this format:
/// SCORE: ...
/// ```
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    blocks: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening role line.
    pub fn role(role: &str) -> Self {
        Self::new().line(&format!("You are a {role}."))
    }

    pub fn line(mut self, text: &str) -> Self {
        self.blocks.push(text.trim_end().to_string());
        self
    }

    /// Titled block; skipped when `body` is blank.
    pub fn section(mut self, title: &str, body: &str) -> Self {
        let body = body.trim();
        if !body.is_empty() {
            self.blocks.push(format!("{title}:\n{body}"));
        }
        self
    }

    /// Bulleted `- Label: value` list read from `data`, with "N/A" for gaps.
    pub fn fields(mut self, title: &str, data: &ContextData, fields: &[(&str, &str)]) -> Self {
        let lines: Vec<String> = fields
            .iter()
            .map(|(key, label)| format!("- {label}: {}", field_or_na(data, key)))
            .collect();
        self.blocks.push(format!("{title}:\n{}", lines.join("\n")));
        self
    }

    /// Numbered instructions.
    pub fn steps(mut self, title: &str, steps: &[&str]) -> Self {
        let lines: Vec<String> = steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {step}", i + 1))
            .collect();
        self.blocks.push(format!("{title}:\n{}", lines.join("\n")));
        self
    }

    /// Labelled response template the parser understands.
    pub fn response_format(mut self, labels: &[(&str, &str)]) -> Self {
        let lines: Vec<String> = labels
            .iter()
            .map(|(label, hint)| format!("{label}: {hint}"))
            .collect();
        self.blocks
            .push(format!("Respond in this format:\n{}", lines.join("\n")));
        self
    }

    pub fn build(self) -> String {
        self.blocks.join("\n\n")
    }
}

/// Display value of `key`, or "N/A" when absent, null or blank.
pub fn field_or_na(data: &ContextData, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => NOT_AVAILABLE.to_string(),
    }
}
