//! Output contract: the required shape of a discharge record and the
//! structural validator that turns parsed model JSON into a `StructuredRecord`.

pub mod types;
pub mod coerce;
pub mod constraints;
pub mod validate;

pub use types::*;
pub use constraints::*;
pub use validate::*;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// What went wrong at one JSON path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// A required key is absent.
    MissingKey,
    /// The value has the wrong JSON type.
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    /// A required string is present but blank.
    Blank,
    /// An entry carries no evidence spans.
    NoEvidence,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey => write!(f, "missing required key"),
            Self::WrongType { expected, found } => write!(f, "expected {expected}, found {found}"),
            Self::Blank => write!(f, "must not be blank"),
            Self::NoEvidence => write!(f, "at least one evidence span is required"),
        }
    }
}

/// One violated constraint, addressed by a JSON path such as `diagnoses[0].evidence_spans`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    pub path: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// Every constraint a candidate record violated, in document order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Schema validation failed ({} violation(s)): {}", .violations.len(), join_violations(.violations))]
pub struct SchemaError {
    pub violations: Vec<SchemaViolation>,
}

impl SchemaError {
    /// Top-level or nested keys reported as missing.
    pub fn missing_keys(&self) -> Vec<&str> {
        self.violations
            .iter()
            .filter(|v| v.kind == ViolationKind::MissingKey)
            .map(|v| v.path.as_str())
            .collect()
    }

    pub fn is_missing(&self, path: &str) -> bool {
        self.missing_keys().contains(&path)
    }
}

fn join_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_lists_every_violation() {
        let err = SchemaError {
            violations: vec![
                SchemaViolation {
                    path: "missing_info".into(),
                    kind: ViolationKind::MissingKey,
                },
                SchemaViolation {
                    path: "diagnoses[0].evidence_spans".into(),
                    kind: ViolationKind::NoEvidence,
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 violation(s)"));
        assert!(msg.contains("missing_info: missing required key"));
        assert!(msg.contains("diagnoses[0].evidence_spans: at least one evidence span"));
        assert!(err.is_missing("missing_info"));
        assert!(!err.is_missing("diagnoses"));
    }

    #[test]
    fn violation_serializes_flat() {
        let v = SchemaViolation {
            path: "medications".into(),
            kind: ViolationKind::WrongType {
                expected: "array",
                found: "string",
            },
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["path"], "medications");
        assert_eq!(json["kind"], "wrong_type");
        assert_eq!(json["expected"], "array");
    }
}
