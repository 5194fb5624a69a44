use serde_json::{Map, Value};

/// Extract the first JSON object from a model response.
///
/// Accepts a fenced ```json block, a bare object, or an object surrounded by
/// prose. Returns `None` when nothing parses.
pub fn extract_json_object(response: &str) -> Option<Map<String, Value>> {
    if let Some(block) = fenced_json(response) {
        if let Some(obj) = parse_object(block) {
            return Some(obj);
        }
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&response[start..=end])
}

fn fenced_json(response: &str) -> Option<&str> {
    let start = response.find("```json")? + "```json".len();
    let len = response[start..].find("```")?;
    Some(response[start..start + len].trim())
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Field as display text: strings as-is, lists joined with `"; "`,
/// numbers and booleans stringified. Blank values read as absent.
pub fn field_text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match obj.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("; "),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric field clamped to 0..=100. Numeric strings ("72", "72.5") count;
/// "NaN" and "inf" do not.
pub fn field_score(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    let score: f64 = match obj.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };
    score.is_finite().then(|| score.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block() {
        let response = "Here you go:\n```json\n{\"risk_score\": 70}\n```\nDone.";
        let obj = extract_json_object(response).unwrap();
        assert_eq!(field_score(&obj, "risk_score"), Some(70.0));
    }

    #[test]
    fn bare_object_inside_prose() {
        let obj = extract_json_object("Result: {\"risk_level\": \"High\"} (end)").unwrap();
        assert_eq!(field_text(&obj, "risk_level").as_deref(), Some("High"));
    }

    #[test]
    fn garbage_returns_none() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("} backwards {").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }

    #[test]
    fn broken_fence_falls_back_to_braces() {
        let obj = extract_json_object("```json\nnot json\n``` then {\"a\": 1}").unwrap();
        assert_eq!(field_text(&obj, "a").as_deref(), Some("1"));
    }

    #[test]
    fn lists_join_with_semicolons() {
        let obj = extract_json_object(r#"{"risk_factors": ["cash", " ", "offshore", 3]}"#).unwrap();
        assert_eq!(
            field_text(&obj, "risk_factors").as_deref(),
            Some("cash; offshore; 3")
        );
    }

    #[test]
    fn blank_and_null_fields_are_absent() {
        let obj = extract_json_object(r#"{"a": "  ", "b": null, "c": []}"#).unwrap();
        assert!(field_text(&obj, "a").is_none());
        assert!(field_text(&obj, "b").is_none());
        assert!(field_text(&obj, "c").is_none());
        assert!(field_text(&obj, "missing").is_none());
    }

    #[test]
    fn scores_are_clamped() {
        let obj = extract_json_object(r#"{"hi": 250, "lo": -5, "s": "64%", "bad": "high"}"#).unwrap();
        assert_eq!(field_score(&obj, "hi"), Some(100.0));
        assert_eq!(field_score(&obj, "lo"), Some(0.0));
        assert_eq!(field_score(&obj, "s"), Some(64.0));
        assert_eq!(field_score(&obj, "bad"), None);
    }

    #[test]
    fn non_finite_scores_are_absent() {
        let obj = extract_json_object(r#"{"a": "NaN", "b": "inf", "c": "-infinity"}"#).unwrap();
        assert_eq!(field_score(&obj, "a"), None);
        assert_eq!(field_score(&obj, "b"), None);
        assert_eq!(field_score(&obj, "c"), None);
    }
}
