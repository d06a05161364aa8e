//! Lenient readers for model output: models return messy types.
//!
//! These never fail. Hard requirements live in `validate.rs`.

use serde_json::{Map, Value};

use super::types::{Confidence, Severity, Urgency};

/// Maximum evidence spans kept per entry.
pub const MAX_SPANS_PER_ENTRY: usize = 5;

/// Maximum words kept per evidence span.
pub const MAX_WORDS_PER_SPAN: usize = 20;

/// Default for descriptive fields the model left empty.
pub const UNSPECIFIED: &str = "unspecified";

/// JSON type name for violation messages.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Strings pass through, numbers and booleans are rendered, anything else is `None`.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Optional text field: blank or non-scalar becomes `None`.
pub fn opt_string(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(scalar_to_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Text field with a default for null, blank or missing values.
pub fn string_or(fields: &Map<String, Value>, key: &str, default: &str) -> String {
    opt_string(fields, key).unwrap_or_else(|| default.to_string())
}

/// Placeholder strings models use for "nothing here".
fn is_placeholder(s: &str) -> bool {
    let lower = s.trim().to_lowercase();
    lower.is_empty() || lower == "n/a" || lower == "none"
}

/// List of strings: a lone string becomes a one-element list, placeholders
/// become empty, null becomes empty, non-scalar elements are dropped.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(scalar_to_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(other) => match scalar_to_string(other) {
            Some(s) if !is_placeholder(&s) => vec![s.trim().to_string()],
            _ => Vec::new(),
        },
    }
}

/// View a value as a sequence. A lone object becomes a one-element sequence,
/// null becomes empty. Returns `None` for any other non-array value.
pub fn as_sequence(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Object(_) => Some(vec![value]),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

pub fn confidence(fields: &Map<String, Value>) -> Confidence {
    fields
        .get("confidence")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Confidence>().ok())
        .unwrap_or(Confidence::Low)
}

pub fn urgency(fields: &Map<String, Value>) -> Urgency {
    fields
        .get("urgency")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Urgency>().ok())
        .unwrap_or(Urgency::Routine)
}

pub fn severity(fields: &Map<String, Value>) -> Severity {
    fields
        .get("severity")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Severity>().ok())
        .unwrap_or(Severity::NiceToHave)
}

/// Cut `text` after its first `max_words` words.
///
/// Slices the original string, so inner whitespace is preserved exactly and a
/// span that occurs in the note still occurs after capping.
pub fn cap_words(text: &str, max_words: usize) -> &str {
    let mut words = 0;
    let mut in_word = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                in_word = false;
                if words == max_words {
                    return &text[..idx];
                }
            }
        } else if !in_word {
            in_word = true;
            words += 1;
        }
    }
    text
}
