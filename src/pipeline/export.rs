//! Review packet: the shape an accepted run is exported in for clinician review.

use serde::Serialize;

use super::contract::StructuredRecord;
use super::grounding::{EntryGrounding, GroundingReport};
use super::types::PipelineOutcome;

/// Accepted record with its grounding report and the entries that need a
/// second look. Borrowed from the outcome; serialize it, don't keep it.
#[derive(Debug, Serialize)]
pub struct ReviewPacket<'a> {
    pub source_note_id: &'a str,
    pub attempt: u32,
    pub record: &'a StructuredRecord,
    pub grounding: &'a GroundingReport,
    /// Entries with at least one span not found verbatim in the note.
    pub flagged: Vec<&'a EntryGrounding>,
}

impl<'a> ReviewPacket<'a> {
    /// `None` for a rejected outcome: rejected runs are never exported.
    pub fn from_outcome(source_note_id: &'a str, outcome: &'a PipelineOutcome) -> Option<Self> {
        match outcome {
            PipelineOutcome::Accepted {
                record,
                grounding,
                attempt,
            } => Some(Self {
                source_note_id,
                attempt: *attempt,
                record,
                grounding,
                flagged: grounding.flagged_entries().collect(),
            }),
            PipelineOutcome::Rejected { .. } => None,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
