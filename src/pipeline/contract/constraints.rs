//! Declarative definition of the discharge record contract.
//!
//! The validator in `validate.rs` walks `RECORD_FIELDS` generically; adding a
//! category means adding a row and an `EntryRule`, not new validation code.

use serde_json::{Map, Value};

use super::coerce::{self, UNSPECIFIED};
use super::types::*;

/// Key holding evidence spans inside every entry.
pub const EVIDENCE_KEY: &str = "evidence_spans";

/// Shape rule for one top-level field.
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    /// Sequence of entry objects, each with a primary field and evidence spans.
    Entries(&'static EntryRule),
    /// Sequence of missing-information items (strings or objects).
    MissingInfo,
    /// Sequence of free-text strings.
    TextList,
    /// Single free-text string.
    Text,
}

/// One row of the contract: name, required flag, shape rule.
#[derive(Debug, Clone, Copy)]
pub struct FieldConstraint {
    pub name: &'static str,
    pub required: bool,
    pub shape: Shape,
}

/// A typed entry produced by an `EntryRule`.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Diagnosis(Diagnosis),
    Medication(Medication),
    FollowUp(FollowUp),
    RedFlag(RedFlag),
}

/// Builds a typed entry once the structural checks have passed.
pub type EntryBuilder = fn(primary: String, fields: &Map<String, Value>, spans: Vec<EvidenceSpan>) -> Entry;

/// Entry-level rule: which key names the entry, and how to build it.
pub struct EntryRule {
    pub primary: &'static str,
    pub build: EntryBuilder,
}

impl std::fmt::Debug for EntryRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryRule").field("primary", &self.primary).finish()
    }
}

pub static DIAGNOSIS_RULE: EntryRule = EntryRule {
    primary: "label",
    build: |label, fields, evidence_spans| {
        Entry::Diagnosis(Diagnosis {
            label,
            icd10: coerce::opt_string(fields, "icd10"),
            confidence: coerce::confidence(fields),
            evidence_spans,
        })
    },
};

pub static MEDICATION_RULE: EntryRule = EntryRule {
    primary: "name",
    build: |name, fields, evidence_spans| {
        Entry::Medication(Medication {
            name,
            dose: coerce::opt_string(fields, "dose"),
            route: coerce::opt_string(fields, "route"),
            frequency: coerce::opt_string(fields, "frequency"),
            duration: coerce::opt_string(fields, "duration"),
            warnings: coerce::string_list(fields.get("warnings")),
            confidence: coerce::confidence(fields),
            evidence_spans,
        })
    },
};

pub static FOLLOWUP_RULE: EntryRule = EntryRule {
    primary: "with_whom",
    build: |with_whom, fields, evidence_spans| {
        Entry::FollowUp(FollowUp {
            with_whom,
            when: coerce::string_or(fields, "when", UNSPECIFIED),
            why: coerce::opt_string(fields, "why"),
            urgency: coerce::urgency(fields),
            confidence: coerce::confidence(fields),
            evidence_spans,
        })
    },
};

pub static RED_FLAG_RULE: EntryRule = EntryRule {
    primary: "symptom",
    build: |symptom, fields, evidence_spans| {
        Entry::RedFlag(RedFlag {
            symptom,
            action: coerce::string_or(fields, "action", UNSPECIFIED),
            confidence: coerce::confidence(fields),
            evidence_spans,
        })
    },
};

/// The discharge record contract, in validation order.
pub static RECORD_FIELDS: &[FieldConstraint] = &[
    FieldConstraint { name: "diagnoses", required: true, shape: Shape::Entries(&DIAGNOSIS_RULE) },
    FieldConstraint { name: "medications", required: true, shape: Shape::Entries(&MEDICATION_RULE) },
    FieldConstraint { name: "followups", required: true, shape: Shape::Entries(&FOLLOWUP_RULE) },
    FieldConstraint { name: "red_flags", required: true, shape: Shape::Entries(&RED_FLAG_RULE) },
    FieldConstraint { name: "missing_info", required: true, shape: Shape::MissingInfo },
    FieldConstraint { name: "patient_summary", required: false, shape: Shape::Text },
    FieldConstraint { name: "notes", required: false, shape: Shape::TextList },
];

/// Names of the keys whose absence invalidates a record.
pub fn required_keys() -> Vec<&'static str> {
    RECORD_FIELDS
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name)
        .collect()
}
