//! Typed shape of a validated discharge record.
//!
//! Everything here is produced by `validate()`; nothing constructs a
//! `StructuredRecord` from unchecked model output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════
// Evidence
// ═══════════════════════════════════════════

/// A claimed excerpt of the source note supporting one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    pub text: String,
    /// Free-form hint where the excerpt sits (section name, line number).
    pub locator: Option<String>,
}

impl EvidenceSpan {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            locator: None,
        }
    }
}

// ═══════════════════════════════════════════
// Enumerated fields
// ═══════════════════════════════════════════

/// A string that names no variant of a contract enum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field}: {value}")]
pub struct InvalidEnum {
    pub field: &'static str,
    pub value: String,
}

/// Enum whose `FromStr` accepts exactly its snake_case wire names.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Confidence {
    Low => "low",
    Medium => "medium",
    High => "high",
});

str_enum!(Urgency {
    Routine => "routine",
    Soon => "soon",
    Urgent => "urgent",
});

str_enum!(Severity {
    NiceToHave => "nice_to_have",
    Important => "important",
    Critical => "critical",
});

// ═══════════════════════════════════════════
// Entries
// ═══════════════════════════════════════════

/// A diagnosis as documented, with a candidate ICD-10 code for clinician review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub label: String,
    pub icd10: Option<String>,
    pub confidence: Confidence,
    pub evidence_spans: Vec<EvidenceSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dose: Option<String>,
    pub route: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub warnings: Vec<String>,
    pub confidence: Confidence,
    pub evidence_spans: Vec<EvidenceSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub with_whom: String,
    pub when: String,
    pub why: Option<String>,
    pub urgency: Urgency,
    pub confidence: Confidence,
    pub evidence_spans: Vec<EvidenceSpan>,
}

/// A warning symptom: return immediately if this occurs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlag {
    pub symptom: String,
    pub action: String,
    pub confidence: Confidence,
    pub evidence_spans: Vec<EvidenceSpan>,
}

/// Something clinically expected but absent from the note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingInfoItem {
    pub item: String,
    pub why_required: Option<String>,
    pub severity: Severity,
}

// ═══════════════════════════════════════════
// Record
// ═══════════════════════════════════════════

/// A schema-valid discharge record. Canonical export shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub diagnoses: Vec<Diagnosis>,
    pub medications: Vec<Medication>,
    pub followups: Vec<FollowUp>,
    pub red_flags: Vec<RedFlag>,
    pub missing_info: Vec<MissingInfoItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_summary: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl StructuredRecord {
    /// Total entries across the four evidence-bearing categories.
    pub fn entry_count(&self) -> usize {
        self.diagnoses.len() + self.medications.len() + self.followups.len() + self.red_flags.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&Severity::NiceToHave).unwrap(), "\"nice_to_have\"");
        assert_eq!(serde_json::to_string(&Urgency::Soon).unwrap(), "\"soon\"");
        assert_eq!(serde_json::to_string(&Confidence::High).unwrap(), "\"high\"");
    }

    #[test]
    fn parse_rejects_unknown_variants() {
        assert_eq!(
            "certain".parse::<Confidence>(),
            Err(InvalidEnum {
                field: "Confidence",
                value: "certain".into()
            })
        );
        assert!("ROUTINE".parse::<Urgency>().is_err());
        assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
    }

    #[test]
    fn parse_accepts_serialized_names() {
        for sev in [Severity::NiceToHave, Severity::Important, Severity::Critical] {
            let wire = serde_json::to_value(sev).unwrap();
            assert_eq!(wire.as_str().unwrap().parse::<Severity>(), Ok(sev));
        }
        for urgency in [Urgency::Routine, Urgency::Soon, Urgency::Urgent] {
            let wire = serde_json::to_value(urgency).unwrap();
            assert_eq!(wire.as_str().unwrap().parse::<Urgency>(), Ok(urgency));
        }
    }

    #[test]
    fn record_export_omits_absent_summary() {
        let record = StructuredRecord {
            diagnoses: vec![],
            medications: vec![],
            followups: vec![],
            red_flags: vec![],
            missing_info: vec![],
            patient_summary: None,
            notes: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("patient_summary").is_none());
        assert_eq!(json["missing_info"], serde_json::json!([]));
        assert_eq!(record.entry_count(), 0);
    }
}
