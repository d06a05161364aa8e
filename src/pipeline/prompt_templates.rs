//! Prompt template registry for discharge extraction.
//!
//! Three templates, ordered by strictness:
//! - Contract: full field contract, permissive about span count
//! - Strict: terser output, fewer spans, conservative extraction
//! - StrictCapped: Strict plus an explicit per-entry span cap
//!
//! Templates only produce text; which one runs on which attempt is decided
//! in `strategy.rs`.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStrategyKind {
    Contract,
    Strict,
    StrictCapped,
}

impl PromptStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Strict => "strict",
            Self::StrictCapped => "strict_capped",
        }
    }
}

impl fmt::Display for PromptStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A chat prompt: system instructions plus the user turn carrying the note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

// ═══════════════════════════════════════════════════════════
// Note budget
// ═══════════════════════════════════════════════════════════

/// Notes longer than this (in characters) are cut before prompting.
pub const MAX_NOTE_CHARS: usize = 6000;

/// Characters kept from the start of a long note.
const NOTE_HEAD_CHARS: usize = 2000;

pub const TRUNCATION_MARKER: &str = "\n\n[...NOTE TRUNCATED FOR INFERENCE...]\n\n";

/// Fit a note into `max_chars`: keep the head and the tail, drop the middle.
///
/// Returns the text to prompt with and whether anything was cut.
pub fn fit_note(text: &str, max_chars: usize) -> (Cow<'_, str>, bool) {
    let total = text.chars().count();
    if total <= max_chars {
        return (Cow::Borrowed(text), false);
    }

    let head_chars = NOTE_HEAD_CHARS.min(max_chars);
    let tail_chars = max_chars - head_chars;

    let head_end = byte_offset_of_char(text, head_chars);
    let tail_start = byte_offset_of_char(text, total - tail_chars);

    let mut out = String::with_capacity(head_end + TRUNCATION_MARKER.len() + text.len() - tail_start);
    out.push_str(&text[..head_end]);
    out.push_str(TRUNCATION_MARKER);
    out.push_str(&text[tail_start..]);
    (Cow::Owned(out), true)
}

fn byte_offset_of_char(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(idx, _)| idx)
}

// ═══════════════════════════════════════════════════════════
// System prompts
// ═══════════════════════════════════════════════════════════

const CONTRACT_SYSTEM: &str = "\
You are Discharge Navigator, a clinical documentation assistant. You extract \
and structure discharge information from a raw clinical note.

RULES:
- Output ONLY valid JSON. No markdown, no explanations, no trailing text.
- Only include facts explicitly written in the note. DO NOT GUESS.
- ICD-10 codes are CANDIDATE codes for clinician review, not ground truth.
- Every evidence span must be text copied EXACTLY from the note, max 20 words.
- Every diagnosis, medication, follow-up and red flag needs at least one evidence span.
- If clinically expected information is absent, list it in missing_info.
- You do NOT diagnose. You extract what the clinician documented.";

const STRICT_SYSTEM: &str = "\
You are Discharge Navigator. Extract discharge information from a clinical note. \
Output ONLY valid JSON. DO NOT GUESS. Keep output SHORT. \
Every evidence span must be an exact substring of the note.";

/// Get the system prompt for a strategy kind.
pub fn system_prompt(kind: PromptStrategyKind) -> &'static str {
    match kind {
        PromptStrategyKind::Contract => CONTRACT_SYSTEM,
        PromptStrategyKind::Strict | PromptStrategyKind::StrictCapped => STRICT_SYSTEM,
    }
}

// ═══════════════════════════════════════════════════════════
// User prompts
// ═══════════════════════════════════════════════════════════

const CONTRACT_SHAPE: &str = r#"Return one JSON object with these exact keys:
- diagnoses: [{"label": str, "icd10": str or null, "confidence": "low"|"medium"|"high", "evidence_spans": [{"text": str, "locator": str or null}]}]
- medications: [{"name": str, "dose": str or null, "route": str or null, "frequency": str or null, "duration": str or null, "warnings": [str], "confidence": "low"|"medium"|"high", "evidence_spans": [{"text": str, "locator": str or null}]}]
- followups: [{"with_whom": str, "when": str, "why": str or null, "urgency": "routine"|"soon"|"urgent", "confidence": "low"|"medium"|"high", "evidence_spans": [{"text": str, "locator": str or null}]}]
- red_flags: [{"symptom": str, "action": str, "confidence": "low"|"medium"|"high", "evidence_spans": [{"text": str, "locator": str or null}]}]
- missing_info: [{"item": str, "why_required": str, "severity": "nice_to_have"|"important"|"critical"}]
- patient_summary: str (plain language, 8th grade reading level)
- notes: [str] (caveats or uncertainties)

All list fields MUST be JSON arrays, never strings. If a list has no items, use [].
missing_info MUST always be present, even when it is []."#;

const STRICT_SHAPE: &str = r#"Required keys (use [] when nothing is found):
- diagnoses: [{"label": str, "icd10": str or null, "confidence": "low"|"medium"|"high", "evidence_spans": [{"text": str}]}]
- medications: [{"name": str, "dose": str or null, "frequency": str or null, "confidence": "low"|"medium"|"high", "evidence_spans": [{"text": str}]}]
- followups: [{"with_whom": str, "when": str, "urgency": "routine"|"soon"|"urgent", "evidence_spans": [{"text": str}]}]
- red_flags: [{"symptom": str, "action": str, "evidence_spans": [{"text": str}]}]
- missing_info: [str]
missing_info is REQUIRED. Use [] if nothing is missing."#;

/// Build the chat prompt for `kind` over an already budgeted note.
///
/// `max_spans` is written into the instructions so the model keeps output short.
pub fn build_prompt(kind: PromptStrategyKind, note: &str, max_spans: usize) -> Prompt {
    let user = match kind {
        PromptStrategyKind::Contract => format!(
            "Extract a structured discharge packet from the clinical note below.\n\n\
             {CONTRACT_SHAPE}\n\
             Use at most {max_spans} evidence spans per entry.\n\n\
             CLINICAL NOTE:\n<<<\n{note}\n>>>"
        ),
        PromptStrategyKind::Strict => format!(
            "Extract discharge info as JSON. Be conservative: only what is explicitly stated.\n\n\
             {STRICT_SHAPE}\n\
             Prefer fewer, shorter evidence spans (at most {max_spans} per entry).\n\n\
             CLINICAL NOTE:\n<<<\n{note}\n>>>"
        ),
        PromptStrategyKind::StrictCapped => format!(
            "Extract discharge info as JSON. Be conservative: only what is explicitly stated.\n\n\
             {STRICT_SHAPE}\n\
             HARD LIMIT: at most {max_spans} evidence span(s) per entry, each under 12 words. \
             Stop as soon as the JSON object is complete.\n\n\
             CLINICAL NOTE:\n<<<\n{note}\n>>>"
        ),
    };

    Prompt {
        system: system_prompt(kind).to_string(),
        user,
    }
}
