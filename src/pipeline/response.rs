//! Raw model response → JSON tree.
//!
//! Strips model artifacts (thinking tags, unused tokens, markdown fences),
//! then parses. Truncated output is always an error, never a partial value.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::error::Category;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty model response")]
    Empty,

    #[error("Truncated JSON: input ended at line {line}, column {column}")]
    Truncated { line: usize, column: usize },

    #[error("Malformed JSON at line {line}, column {column}: {message}")]
    Malformed {
        line: usize,
        column: usize,
        message: String,
    },
}

impl ParseError {
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            Category::Eof => Self::Truncated {
                line: e.line(),
                column: e.column(),
            },
            _ => Self::Malformed {
                line: e.line(),
                column: e.column(),
                message: e.to_string(),
            },
        }
    }
}

/// Strip model-specific artifacts from raw output.
///
/// Handles:
/// 1. MedGemma thinking blocks (`<unusedN>thought\n...`)
/// 2. Stray `<unusedN>` tokens from the Gemma tokenizer
/// 3. Markdown code fences around the JSON
pub fn clean_response(raw: &str) -> String {
    static UNUSED_TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<unused\d+>").expect("valid regex"));

    let mut text = raw;

    if let Some(idx) = text.find("<unused") {
        if let Some(thought_offset) = text[idx..].find("thought\n") {
            text = &text[idx + thought_offset + "thought\n".len()..];
            // The answer starts after the token that closes the thought.
            if let Some(close) = UNUSED_TOKEN_RE.find(text) {
                text = &text[close.end()..];
            }
        }
    }

    let text = UNUSED_TOKEN_RE.replace_all(text, "");

    strip_code_fences(text.trim()).trim().to_string()
}

/// Remove a leading ```` ``` ```` / ```` ```json ```` fence line and the closing fence.
fn strip_code_fences(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }
    let body = match text.split_once('\n') {
        Some((_, rest)) => rest,
        None => return "",
    };
    match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

/// Parse a raw model response into a JSON tree.
///
/// Leading chatter before the first `{` and trailing text after the first
/// complete value are tolerated; everything else is a `ParseError`.
pub fn parse_response(raw: &str) -> Result<Value, ParseError> {
    let cleaned = clean_response(raw);
    if cleaned.is_empty() {
        return Err(ParseError::Empty);
    }

    let start = if cleaned.starts_with('{') || cleaned.starts_with('[') {
        0
    } else {
        cleaned.find('{').unwrap_or(0)
    };

    let mut stream = serde_json::Deserializer::from_str(&cleaned[start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(e.into()),
        None => Err(ParseError::Empty),
    }
}
