//! Parsing structured shapes out of free-text LLM responses
//!
//! Models asked to "respond in JSON" routinely wrap the payload in prose,
//! markdown fences, or commentary. These helpers pull the first balanced
//! JSON value out of surrounding text and translate structure failures into
//! `None` so callers can degrade instead of crash.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Extract the first balanced JSON object or array embedded in `text`.
pub fn extract_json_value(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{' || b == b'[')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' | b'[' if !in_string => depth += 1,
            b'}' | b']' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    if let Ok(value) = serde_json::from_str(candidate) {
                        return Some(value);
                    }
                    // Balanced but unparseable (e.g. mismatched bracket
                    // kinds); try the rest of the text.
                    return extract_json_value(&text[start + offset + 1..]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract a JSON array of values, accepting a bare object as a 1-element
/// array (models frequently return a single record where a list was asked).
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    match extract_json_value(text)? {
        Value::Array(items) => Some(items),
        object @ Value::Object(_) => Some(vec![object]),
        _ => None,
    }
}

/// Extract an array of strings, dropping non-string entries.
pub fn extract_string_array(text: &str) -> Option<Vec<String>> {
    let items = extract_json_array(text)?;
    let strings: Vec<String> = items
        .into_iter()
        .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect();
    if strings.is_empty() {
        None
    } else {
        Some(strings)
    }
}

/// Parse a numeric score out of a response.
///
/// Prefers a JSON shape like `{"score": 7, "reason": "..."}`; falls back to
/// the first number appearing anywhere in the text (the shape the original
/// rubric prompt asks for is "just a number").
pub fn parse_score(text: &str) -> Option<f64> {
    if let Some(value) = extract_json_value(text) {
        if let Some(score) = value.get("score").and_then(Value::as_f64) {
            return Some(score);
        }
        if let Some(score) = value.as_f64() {
            return Some(score);
        }
    }

    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = NUMBER.get_or_init(|| Regex::new(r"\d+(\.\d+)?").expect("static regex"));
    re.find(text)?.as_str().parse().ok()
}

/// Read a string field from a JSON object, treating empty/whitespace as
/// absent.
pub fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read a list-of-strings field; a bare string becomes a 1-element list.
pub fn string_list_field(value: &Value, field: &str) -> Vec<String> {
    match value.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
