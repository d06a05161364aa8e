//! Failure sink: append-only record of rejected runs for offline analysis.
//!
//! One JSON line per failed attempt. All lines of one `record()` call are
//! written with a single locked `write_all`, so concurrent callers never
//! interleave partial records.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::prompt_templates::PromptStrategyKind;
use super::types::{ExtractionAttempt, FailureCategory};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failure sink lock poisoned")]
    Poisoned,
}

/// One line of the failure log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureLogEntry {
    pub source_note_id: String,
    pub attempt_index: u32,
    pub failure_category: FailureCategory,
    /// Empty when the backend returned no text.
    pub raw_response_text: String,
    pub template_used: PromptStrategyKind,
    pub temperature_used: f32,
    pub max_output_tokens: u32,
    pub error_detail: String,
    pub recorded_at: DateTime<Utc>,
}

impl FailureLogEntry {
    /// Log entry for a failed attempt; `None` for a validated one.
    pub fn from_attempt(
        source_note_id: &str,
        attempt: &ExtractionAttempt,
        recorded_at: DateTime<Utc>,
    ) -> Option<Self> {
        let failure = attempt.failure()?;
        Some(Self {
            source_note_id: source_note_id.to_string(),
            attempt_index: attempt.index,
            failure_category: failure.category(),
            raw_response_text: attempt.raw_response.clone().unwrap_or_default(),
            template_used: attempt.template,
            temperature_used: attempt.temperature,
            max_output_tokens: attempt.max_output_tokens,
            error_detail: failure.to_string(),
            recorded_at,
        })
    }
}

/// Durable destination for rejected runs. Shared across threads.
pub trait FailureSink: Send + Sync {
    /// Append the failed attempts of one rejected run. Atomic per call.
    fn record(&self, source_note_id: &str, attempts: &[ExtractionAttempt]) -> Result<(), SinkError>;
}

fn entries_for(source_note_id: &str, attempts: &[ExtractionAttempt]) -> Vec<FailureLogEntry> {
    let now = Utc::now();
    attempts
        .iter()
        .filter_map(|a| FailureLogEntry::from_attempt(source_note_id, a, now))
        .collect()
}

// ═══════════════════════════════════════════
// JSON Lines file
// ═══════════════════════════════════════════

/// Append-only JSON Lines failure log.
pub struct JsonlFailureSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlFailureSink {
    /// Open or create the log at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(path = %path.display(), "Failure log opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FailureSink for JsonlFailureSink {
    fn record(&self, source_note_id: &str, attempts: &[ExtractionAttempt]) -> Result<(), SinkError> {
        let entries = entries_for(source_note_id, attempts);
        if entries.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for entry in &entries {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }

        let mut file = self.file.lock().map_err(|_| SinkError::Poisoned)?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;

        tracing::debug!(
            note_id = %source_note_id,
            lines = entries.len(),
            path = %self.path.display(),
            "Failure log entries appended"
        );
        Ok(())
    }
}

/// Read every well-formed entry from a failure log. Malformed lines are skipped.
pub fn read_failure_log(path: &Path) -> Result<Vec<FailureLogEntry>, SinkError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

// ═══════════════════════════════════════════
// In-memory
// ═══════════════════════════════════════════

/// In-memory sink: one `Vec<FailureLogEntry>` per recorded run.
#[derive(Default)]
pub struct MemoryFailureSink {
    records: Mutex<Vec<Vec<FailureLogEntry>>>,
}

impl MemoryFailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Vec<FailureLogEntry>> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Total logged attempts across all records.
    pub fn entry_count(&self) -> usize {
        self.records
            .lock()
            .map(|r| r.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

impl FailureSink for MemoryFailureSink {
    fn record(&self, source_note_id: &str, attempts: &[ExtractionAttempt]) -> Result<(), SinkError> {
        let entries = entries_for(source_note_id, attempts);
        if entries.is_empty() {
            return Ok(());
        }
        self.records
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(entries);
        Ok(())
    }
}
