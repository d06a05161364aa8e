//! Grounding verifier: checks every claimed evidence span against the note.
//!
//! Matching is exact: case-sensitive, whitespace-literal substring search
//! over the full note text. No normalization, no fuzzy matching.
//! The report annotates a record; it never rejects one.

use serde::Serialize;

use super::contract::{EvidenceSpan, StructuredRecord};
use super::types::SourceNote;

/// Evidence-bearing record categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Diagnoses,
    Medications,
    Followups,
    RedFlags,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[Self::Diagnoses, Self::Medications, Self::Followups, Self::RedFlags]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagnoses => "diagnoses",
            Self::Medications => "medications",
            Self::Followups => "followups",
            Self::RedFlags => "red_flags",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grounded / total span counts. `ratio` is `None` when there are no spans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundingCount {
    pub grounded: usize,
    pub total: usize,
    pub ratio: Option<f64>,
}

impl GroundingCount {
    fn from_counts(grounded: usize, total: usize) -> Self {
        let ratio = (total > 0).then(|| grounded as f64 / total as f64);
        Self { grounded, total, ratio }
    }
}

/// Result of checking one span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanCheck {
    pub category: Category,
    pub entry_index: usize,
    pub text: String,
    /// Byte offset of the first occurrence in the note; `None` means ungrounded.
    pub offset: Option<usize>,
}

impl SpanCheck {
    pub fn is_grounded(&self) -> bool {
        self.offset.is_some()
    }
}

/// Per-entry grounding. An entry with any ungrounded span is flagged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryGrounding {
    pub category: Category,
    pub index: usize,
    pub label: String,
    pub grounded_spans: usize,
    pub total_spans: usize,
}

impl EntryGrounding {
    pub fn is_grounded(&self) -> bool {
        self.total_spans > 0 && self.grounded_spans == self.total_spans
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundingReport {
    pub diagnoses: GroundingCount,
    pub medications: GroundingCount,
    pub followups: GroundingCount,
    pub red_flags: GroundingCount,
    /// Every span in the record, red flags included.
    pub overall: GroundingCount,
    pub entries: Vec<EntryGrounding>,
    pub spans: Vec<SpanCheck>,
}

impl GroundingReport {
    pub fn category(&self, category: Category) -> &GroundingCount {
        match category {
            Category::Diagnoses => &self.diagnoses,
            Category::Medications => &self.medications,
            Category::Followups => &self.followups,
            Category::RedFlags => &self.red_flags,
        }
    }

    /// Mean of the defined category ratios. Empty categories are excluded.
    pub fn category_average(&self) -> Option<f64> {
        let ratios: Vec<f64> = Category::all()
            .iter()
            .filter_map(|c| self.category(*c).ratio)
            .collect();
        if ratios.is_empty() {
            None
        } else {
            Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
        }
    }

    /// Entries with at least one span not found verbatim in the note.
    pub fn flagged_entries(&self) -> impl Iterator<Item = &EntryGrounding> {
        self.entries.iter().filter(|e| !e.is_grounded())
    }
}

/// Byte offset of the first exact occurrence of `span` in `note`.
/// An empty span is never grounded.
pub fn locate_span(note: &str, span: &str) -> Option<usize> {
    if span.is_empty() {
        return None;
    }
    note.find(span)
}

/// Check every evidence span of `record` against `note`.
///
/// Pure function: inputs are borrowed immutably.
pub fn verify(record: &StructuredRecord, note: &SourceNote) -> GroundingReport {
    let mut checker = Checker::new(note.text());

    for (idx, d) in record.diagnoses.iter().enumerate() {
        checker.check_entry(Category::Diagnoses, idx, &d.label, &d.evidence_spans);
    }
    for (idx, m) in record.medications.iter().enumerate() {
        checker.check_entry(Category::Medications, idx, &m.name, &m.evidence_spans);
    }
    for (idx, f) in record.followups.iter().enumerate() {
        checker.check_entry(Category::Followups, idx, &f.with_whom, &f.evidence_spans);
    }
    for (idx, r) in record.red_flags.iter().enumerate() {
        checker.check_entry(Category::RedFlags, idx, &r.symptom, &r.evidence_spans);
    }

    checker.finish()
}

struct Checker<'a> {
    note: &'a str,
    entries: Vec<EntryGrounding>,
    spans: Vec<SpanCheck>,
}

impl<'a> Checker<'a> {
    fn new(note: &'a str) -> Self {
        Self {
            note,
            entries: Vec::new(),
            spans: Vec::new(),
        }
    }

    fn check_entry(&mut self, category: Category, index: usize, label: &str, evidence: &[EvidenceSpan]) {
        let mut grounded = 0;
        for span in evidence {
            let offset = locate_span(self.note, &span.text);
            if offset.is_some() {
                grounded += 1;
            }
            self.spans.push(SpanCheck {
                category,
                entry_index: index,
                text: span.text.clone(),
                offset,
            });
        }
        self.entries.push(EntryGrounding {
            category,
            index,
            label: label.to_string(),
            grounded_spans: grounded,
            total_spans: evidence.len(),
        });
    }

    fn count(&self, category: Option<Category>) -> GroundingCount {
        let relevant = self
            .spans
            .iter()
            .filter(|s| category.map_or(true, |c| s.category == c));
        let (grounded, total) = relevant.fold((0, 0), |(g, t), s| {
            (g + usize::from(s.is_grounded()), t + 1)
        });
        GroundingCount::from_counts(grounded, total)
    }

    fn finish(self) -> GroundingReport {
        GroundingReport {
            diagnoses: self.count(Some(Category::Diagnoses)),
            medications: self.count(Some(Category::Medications)),
            followups: self.count(Some(Category::Followups)),
            red_flags: self.count(Some(Category::RedFlags)),
            overall: self.count(None),
            entries: self.entries,
            spans: self.spans,
        }
    }
}
