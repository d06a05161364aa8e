//! Core types for one pipeline run.
//!
//! Lifecycle: SourceNote → ExtractionAttempt (1..=N) → PipelineOutcome.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::backend::BackendError;
use super::contract::{SchemaError, StructuredRecord};
use super::grounding::GroundingReport;
use super::prompt_templates::PromptStrategyKind;
use super::response::ParseError;

// ═══════════════════════════════════════════
// Input
// ═══════════════════════════════════════════

/// The note being processed. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNote {
    id: String,
    text: String,
}

impl SourceNote {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Note with a random identifier, for ad-hoc input.
    pub fn with_generated_id(text: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), text)
    }

    /// Use `id` when present and non-blank, otherwise a generated one.
    pub fn with_id_or_generated(id: Option<String>, text: impl Into<String>) -> Self {
        match id.filter(|id| !id.trim().is_empty()) {
            Some(id) => Self::new(id, text),
            None => Self::with_generated_id(text),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

// ═══════════════════════════════════════════
// Attempts
// ═══════════════════════════════════════════

/// Failure category written to the failure log.
/// Backend errors are logged as `parse`: no usable text came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Parse,
    Schema,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Schema => "schema",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an attempt did not produce a valid record. All variants are retriable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl AttemptError {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Backend(_) | Self::Parse(_) => FailureCategory::Parse,
            Self::Schema(_) => FailureCategory::Schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Validated(Box<StructuredRecord>),
    Failed(AttemptError),
}

/// One try at producing a structured record.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionAttempt {
    /// 1-based.
    pub index: u32,
    pub template: PromptStrategyKind,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// `None` when the backend failed before returning any text.
    pub raw_response: Option<String>,
    pub outcome: AttemptOutcome,
}

impl ExtractionAttempt {
    pub fn failure(&self) -> Option<&AttemptError> {
        match &self.outcome {
            AttemptOutcome::Failed(e) => Some(e),
            AttemptOutcome::Validated(_) => None,
        }
    }

    pub fn category(&self) -> Option<FailureCategory> {
        self.failure().map(AttemptError::category)
    }
}

// ═══════════════════════════════════════════
// Outcome
// ═══════════════════════════════════════════

/// Terminal value of a pipeline run.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Schema-valid record. The grounding report always travels with it.
    Accepted {
        record: StructuredRecord,
        grounding: GroundingReport,
        attempt: u32,
    },
    /// Every attempt failed. Callers show the original note, never partial data.
    Rejected { attempts: Vec<ExtractionAttempt> },
}

impl PipelineOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Number of backend calls the run made.
    pub fn attempts_used(&self) -> u32 {
        match self {
            Self::Accepted { attempt, .. } => *attempt,
            Self::Rejected { attempts } => attempts.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::contract::{SchemaViolation, ViolationKind};

    #[test]
    fn generated_ids_are_unique() {
        let a = SourceNote::with_generated_id("x");
        let b = SourceNote::with_generated_id("x");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.text(), "x");
    }

    #[test]
    fn blank_or_missing_id_is_generated() {
        let named = SourceNote::with_id_or_generated(Some("note_001".into()), "x");
        assert_eq!(named.id(), "note_001");

        let blank = SourceNote::with_id_or_generated(Some("  ".into()), "x");
        assert!(Uuid::parse_str(blank.id()).is_ok());
        let missing = SourceNote::with_id_or_generated(None, "x");
        assert!(Uuid::parse_str(missing.id()).is_ok());
    }

    #[test]
    fn char_len_counts_chars_not_bytes() {
        assert_eq!(SourceNote::new("n", "fièvre").char_len(), 6);
    }

    #[test]
    fn backend_errors_are_parse_category() {
        let err = AttemptError::from(BackendError::Timeout { secs: 300 });
        assert_eq!(err.category(), FailureCategory::Parse);
        assert_eq!(AttemptError::from(ParseError::Empty).category(), FailureCategory::Parse);
        let schema = SchemaError {
            violations: vec![SchemaViolation {
                path: "missing_info".into(),
                kind: ViolationKind::MissingKey,
            }],
        };
        assert_eq!(AttemptError::from(schema).category(), FailureCategory::Schema);
    }

    #[test]
    fn rejected_outcome_counts_attempts() {
        let attempt = ExtractionAttempt {
            index: 1,
            template: PromptStrategyKind::Contract,
            temperature: 0.2,
            max_output_tokens: 4096,
            raw_response: Some("{".into()),
            outcome: AttemptOutcome::Failed(ParseError::Empty.into()),
        };
        assert_eq!(attempt.category(), Some(FailureCategory::Parse));
        let outcome = PipelineOutcome::Rejected {
            attempts: vec![attempt.clone(), attempt],
        };
        assert!(!outcome.is_accepted());
        assert_eq!(outcome.attempts_used(), 2);
    }
}
