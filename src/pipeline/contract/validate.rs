//! Generic structural validator for the record contract.
//!
//! Walks `RECORD_FIELDS`, collects every violation (not just the first), and
//! only builds a `StructuredRecord` when none were found.

use serde_json::{Map, Value};

use super::coerce::{self, MAX_SPANS_PER_ENTRY, MAX_WORDS_PER_SPAN};
use super::constraints::{Entry, EntryRule, FieldConstraint, Shape, EVIDENCE_KEY, RECORD_FIELDS};
use super::types::*;
use super::{SchemaError, SchemaViolation, ViolationKind};

/// A field that passed its shape rule, already coerced.
enum FieldValue {
    Entries(Vec<Entry>),
    MissingInfo(Vec<MissingInfoItem>),
    TextList(Vec<String>),
    Text(Option<String>),
}

/// Validate a parsed candidate against the record contract.
///
/// Pure: no I/O, no mutation of the input. Unknown keys are ignored.
pub fn validate(candidate: &Value) -> Result<StructuredRecord, SchemaError> {
    let mut violations = Violations::default();

    let Some(top) = candidate.as_object() else {
        violations.wrong_type("$", "object", candidate);
        return Err(violations.into_error());
    };

    let mut fields = Vec::with_capacity(RECORD_FIELDS.len());
    for constraint in RECORD_FIELDS {
        if let Some(value) = check_field(constraint, top, &mut violations) {
            fields.push(value);
        }
    }

    if !violations.is_empty() {
        return Err(violations.into_error());
    }

    Ok(assemble(fields))
}

fn check_field(
    constraint: &FieldConstraint,
    top: &Map<String, Value>,
    violations: &mut Violations,
) -> Option<FieldValue> {
    let name = constraint.name;
    let Some(value) = top.get(name) else {
        if constraint.required {
            violations.push(name, ViolationKind::MissingKey);
        }
        return None;
    };

    match constraint.shape {
        Shape::Entries(rule) => check_entries(name, rule, value, violations).map(FieldValue::Entries),
        Shape::MissingInfo => check_missing_info(name, value, violations).map(FieldValue::MissingInfo),
        Shape::TextList => Some(FieldValue::TextList(coerce::string_list(Some(value)))),
        Shape::Text => match value {
            Value::Null => Some(FieldValue::Text(None)),
            other => match coerce::scalar_to_string(other) {
                Some(s) => Some(FieldValue::Text(Some(s.trim().to_string()).filter(|s| !s.is_empty()))),
                None => {
                    violations.wrong_type(name, "string", other);
                    None
                }
            },
        },
    }
}

fn check_entries(
    name: &str,
    rule: &EntryRule,
    value: &Value,
    violations: &mut Violations,
) -> Option<Vec<Entry>> {
    let Some(items) = coerce::as_sequence(value) else {
        violations.wrong_type(name, "array", value);
        return None;
    };

    let before = violations.len();
    let mut entries = Vec::with_capacity(items.len());

    for (idx, item) in items.into_iter().enumerate() {
        let path = format!("{name}[{idx}]");
        let Some(fields) = item.as_object() else {
            violations.wrong_type(&path, "object", item);
            continue;
        };

        let primary = check_primary(&path, rule.primary, fields, violations);
        let spans = check_evidence(&path, fields, violations);

        if let (Some(primary), Some(spans)) = (primary, spans) {
            entries.push((rule.build)(primary, fields, spans));
        }
    }

    (violations.len() == before).then_some(entries)
}

fn check_primary(
    path: &str,
    key: &str,
    fields: &Map<String, Value>,
    violations: &mut Violations,
) -> Option<String> {
    let field_path = format!("{path}.{key}");
    match fields.get(key) {
        None | Some(Value::Null) => {
            violations.push(&field_path, ViolationKind::MissingKey);
            None
        }
        Some(value) => match coerce::scalar_to_string(value) {
            Some(s) if s.trim().is_empty() => {
                violations.push(&field_path, ViolationKind::Blank);
                None
            }
            Some(s) => Some(s.trim().to_string()),
            None => {
                violations.wrong_type(&field_path, "string", value);
                None
            }
        },
    }
}

fn check_evidence(
    path: &str,
    fields: &Map<String, Value>,
    violations: &mut Violations,
) -> Option<Vec<EvidenceSpan>> {
    let spans_path = format!("{path}.{EVIDENCE_KEY}");
    let Some(value) = fields.get(EVIDENCE_KEY) else {
        violations.push(&spans_path, ViolationKind::MissingKey);
        return None;
    };

    // A bare string is a single span with no locator.
    let items: Vec<&Value> = match value {
        Value::String(_) => vec![value],
        other => match coerce::as_sequence(other) {
            Some(items) => items,
            None => {
                violations.wrong_type(&spans_path, "array", other);
                return None;
            }
        },
    };

    if items.is_empty() {
        violations.push(&spans_path, ViolationKind::NoEvidence);
        return None;
    }

    let before = violations.len();
    let mut spans = Vec::with_capacity(items.len().min(MAX_SPANS_PER_ENTRY));

    for (idx, item) in items.into_iter().enumerate() {
        let span_path = format!("{spans_path}[{idx}]");
        if let Some(span) = check_span(&span_path, item, violations) {
            if spans.len() < MAX_SPANS_PER_ENTRY {
                spans.push(span);
            }
        }
    }

    (violations.len() == before).then_some(spans)
}

fn check_span(path: &str, item: &Value, violations: &mut Violations) -> Option<EvidenceSpan> {
    let (text, locator) = match item {
        Value::String(s) => (s.as_str(), None),
        Value::Object(fields) => {
            let text_path = format!("{path}.text");
            let text = match fields.get("text") {
                None | Some(Value::Null) => {
                    violations.push(&text_path, ViolationKind::MissingKey);
                    return None;
                }
                Some(Value::String(s)) => s.as_str(),
                Some(other) => {
                    violations.wrong_type(&text_path, "string", other);
                    return None;
                }
            };
            (text, coerce::opt_string(fields, "locator"))
        }
        other => {
            violations.wrong_type(path, "object", other);
            return None;
        }
    };

    if text.trim().is_empty() {
        violations.push(&format!("{path}.text"), ViolationKind::Blank);
        return None;
    }

    Some(EvidenceSpan {
        text: coerce::cap_words(text, MAX_WORDS_PER_SPAN).to_string(),
        locator,
    })
}

fn check_missing_info(
    name: &str,
    value: &Value,
    violations: &mut Violations,
) -> Option<Vec<MissingInfoItem>> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        Value::String(_) => vec![value],
        other => {
            violations.wrong_type(name, "array", other);
            return None;
        }
    };

    let before = violations.len();
    let mut out = Vec::with_capacity(items.len());

    for (idx, item) in items.into_iter().enumerate() {
        match item {
            Value::String(s) if s.trim().is_empty() => {}
            Value::String(s) => out.push(MissingInfoItem {
                item: s.trim().to_string(),
                why_required: None,
                severity: Severity::NiceToHave,
            }),
            Value::Object(fields) => out.push(MissingInfoItem {
                item: coerce::string_or(fields, "item", coerce::UNSPECIFIED),
                why_required: coerce::opt_string(fields, "why_required"),
                severity: coerce::severity(fields),
            }),
            other => violations.wrong_type(&format!("{name}[{idx}]"), "string or object", other),
        }
    }

    (violations.len() == before).then_some(out)
}

fn assemble(fields: Vec<FieldValue>) -> StructuredRecord {
    let mut record = StructuredRecord {
        diagnoses: Vec::new(),
        medications: Vec::new(),
        followups: Vec::new(),
        red_flags: Vec::new(),
        missing_info: Vec::new(),
        patient_summary: None,
        notes: Vec::new(),
    };

    for field in fields {
        match field {
            FieldValue::Entries(entries) => {
                for entry in entries {
                    match entry {
                        Entry::Diagnosis(d) => record.diagnoses.push(d),
                        Entry::Medication(m) => record.medications.push(m),
                        Entry::FollowUp(f) => record.followups.push(f),
                        Entry::RedFlag(r) => record.red_flags.push(r),
                    }
                }
            }
            FieldValue::MissingInfo(items) => record.missing_info = items,
            FieldValue::TextList(notes) => record.notes = notes,
            FieldValue::Text(summary) => record.patient_summary = summary,
        }
    }

    record
}

#[derive(Default)]
struct Violations(Vec<SchemaViolation>);

impl Violations {
    fn push(&mut self, path: &str, kind: ViolationKind) {
        self.0.push(SchemaViolation {
            path: path.to_string(),
            kind,
        });
    }

    fn wrong_type(&mut self, path: &str, expected: &'static str, found: &Value) {
        self.push(
            path,
            ViolationKind::WrongType {
                expected,
                found: coerce::json_type(found),
            },
        );
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_error(self) -> SchemaError {
        SchemaError { violations: self.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_candidate() -> Value {
        json!({
            "diagnoses": [{
                "label": "Community-acquired pneumonia",
                "icd10": "J18.9",
                "confidence": "high",
                "evidence_spans": [{"text": "community-acquired pneumonia", "locator": "Assessment"}]
            }],
            "medications": [{
                "name": "Amoxicillin",
                "dose": "875 mg",
                "route": "oral",
                "frequency": "twice daily",
                "duration": "5 days",
                "warnings": [],
                "confidence": "medium",
                "evidence_spans": [{"text": "Amoxicillin 875 mg PO BID", "locator": null}]
            }],
            "followups": [{
                "with_whom": "primary care",
                "when": "1 week",
                "why": "recheck lungs",
                "urgency": "soon",
                "confidence": "medium",
                "evidence_spans": [{"text": "Follow up with PCP in 1 week"}]
            }],
            "red_flags": [{
                "symptom": "shortness of breath",
                "action": "return to ED",
                "confidence": "high",
                "evidence_spans": [{"text": "worsening shortness of breath"}]
            }],
            "missing_info": []
        })
    }

    #[test]
    fn complete_candidate_validates() {
        let record = validate(&complete_candidate()).unwrap();
        assert_eq!(record.diagnoses.len(), 1);
        assert_eq!(record.diagnoses[0].icd10.as_deref(), Some("J18.9"));
        assert_eq!(record.diagnoses[0].evidence_spans[0].locator.as_deref(), Some("Assessment"));
        assert_eq!(record.medications[0].evidence_spans[0].locator, None);
        assert_eq!(record.followups[0].urgency, Urgency::Soon);
        assert_eq!(record.red_flags[0].action, "return to ED");
        assert!(record.missing_info.is_empty());
    }

    #[test]
    fn missing_missing_info_is_hard_failure() {
        let mut candidate = complete_candidate();
        candidate.as_object_mut().unwrap().remove("missing_info");
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert!(err.is_missing("missing_info"));
    }

    #[test]
    fn missing_missing_info_fails_even_when_everything_else_is_empty() {
        let candidate = json!({
            "diagnoses": [], "medications": [], "followups": [], "red_flags": []
        });
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.missing_keys(), vec!["missing_info"]);
    }

    #[test]
    fn reports_every_violation_not_just_first() {
        let candidate = json!({
            "diagnoses": [{"label": "", "evidence_spans": []}],
            "medications": "metformin",
            "red_flags": [{"symptom": "fever"}]
        });
        let err = validate(&candidate).unwrap_err();
        let paths: Vec<&str> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "diagnoses[0].label",
                "diagnoses[0].evidence_spans",
                "medications",
                "followups",
                "red_flags[0].evidence_spans",
                "missing_info",
            ]
        );
        assert_eq!(err.violations[0].kind, ViolationKind::Blank);
        assert_eq!(err.violations[1].kind, ViolationKind::NoEvidence);
        assert_eq!(
            err.violations[2].kind,
            ViolationKind::WrongType { expected: "array", found: "string" }
        );
    }

    #[test]
    fn top_level_must_be_object() {
        let err = validate(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.violations[0].path, "$");
        assert_eq!(
            err.violations[0].kind,
            ViolationKind::WrongType { expected: "object", found: "array" }
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut candidate = complete_candidate();
        candidate["model_version"] = json!("4b");
        candidate["extra"] = json!({"nested": true});
        assert!(validate(&candidate).is_ok());
    }

    #[test]
    fn single_span_object_is_coerced_to_sequence() {
        let mut candidate = complete_candidate();
        candidate["diagnoses"][0]["evidence_spans"] = json!({"text": "pneumonia", "locator": "HPI"});
        let record = validate(&candidate).unwrap();
        assert_eq!(record.diagnoses[0].evidence_spans, vec![EvidenceSpan {
            text: "pneumonia".into(),
            locator: Some("HPI".into()),
        }]);
    }

    #[test]
    fn bare_string_spans_are_accepted() {
        let mut candidate = complete_candidate();
        candidate["medications"][0]["evidence_spans"] = json!(["Amoxicillin 875 mg", "PO BID"]);
        let record = validate(&candidate).unwrap();
        assert_eq!(record.medications[0].evidence_spans.len(), 2);
        assert_eq!(record.medications[0].evidence_spans[1].text, "PO BID");
    }

    #[test]
    fn single_entry_object_is_coerced_to_sequence() {
        let mut candidate = complete_candidate();
        let single = candidate["followups"][0].clone();
        candidate["followups"] = single;
        let record = validate(&candidate).unwrap();
        assert_eq!(record.followups.len(), 1);
    }

    #[test]
    fn spans_are_capped_per_entry_and_per_word() {
        let mut candidate = complete_candidate();
        let long = (1..=30).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        candidate["diagnoses"][0]["evidence_spans"] =
            json!([long, "b", "c", "d", "e", "f", "g"]);
        let record = validate(&candidate).unwrap();
        let spans = &record.diagnoses[0].evidence_spans;
        assert_eq!(spans.len(), MAX_SPANS_PER_ENTRY);
        assert_eq!(spans[0].text.split_whitespace().count(), MAX_WORDS_PER_SPAN);
        assert!(spans[0].text.ends_with("w20"));
    }

    #[test]
    fn span_without_text_is_a_violation() {
        let mut candidate = complete_candidate();
        candidate["red_flags"][0]["evidence_spans"] = json!([{"locator": "Plan"}, {"text": "  "}]);
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.violations.len(), 2);
        assert_eq!(err.violations[0].path, "red_flags[0].evidence_spans[0].text");
        assert_eq!(err.violations[0].kind, ViolationKind::MissingKey);
        assert_eq!(err.violations[1].kind, ViolationKind::Blank);
    }

    #[test]
    fn missing_info_accepts_strings_and_objects() {
        let mut candidate = complete_candidate();
        candidate["missing_info"] = json!([
            "none identified",
            {"item": "Discharge weight", "why_required": "Diuretic dosing", "severity": "important"},
            {"item": null, "severity": "urgent"}
        ]);
        let record = validate(&candidate).unwrap();
        assert_eq!(record.missing_info.len(), 3);
        assert_eq!(record.missing_info[0].item, "none identified");
        assert_eq!(record.missing_info[1].severity, Severity::Important);
        assert_eq!(record.missing_info[2].item, "unspecified");
        assert_eq!(record.missing_info[2].severity, Severity::NiceToHave);
    }

    #[test]
    fn missing_info_null_is_treated_as_empty() {
        let mut candidate = complete_candidate();
        candidate["missing_info"] = Value::Null;
        assert!(validate(&candidate).unwrap().missing_info.is_empty());
    }

    #[test]
    fn missing_info_number_is_wrong_type() {
        let mut candidate = complete_candidate();
        candidate["missing_info"] = json!(3);
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.violations[0].path, "missing_info");
    }

    #[test]
    fn optional_summary_and_notes_are_carried() {
        let mut candidate = complete_candidate();
        candidate["patient_summary"] = json!("You were treated for a lung infection.");
        candidate["notes"] = json!("Model unsure about duration");
        let record = validate(&candidate).unwrap();
        assert_eq!(
            record.patient_summary.as_deref(),
            Some("You were treated for a lung infection.")
        );
        assert_eq!(record.notes, vec!["Model unsure about duration"]);
    }

    #[test]
    fn numeric_primary_field_is_rendered() {
        let mut candidate = complete_candidate();
        candidate["diagnoses"][0]["label"] = json!(250.0);
        let record = validate(&candidate).unwrap();
        assert_eq!(record.diagnoses[0].label, "250.0");
    }

    #[test]
    fn validate_does_not_mutate_input() {
        let candidate = complete_candidate();
        let copy = candidate.clone();
        let _ = validate(&candidate);
        assert_eq!(candidate, copy);
    }
}
