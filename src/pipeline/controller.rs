//! Retry controller: drives one note through at most three extraction attempts.
//!
//! States: `Attempting(k)` → `Accepted(k)` | `Attempting(k + 1)` | `Rejected`.
//! `transition` is pure; `RetryController::run` performs the side effects
//! (backend call, failure log) around it.
//!
//! Grounding never feeds back into the state machine. A schema-valid record
//! is accepted on the spot and the report travels with it.

use std::sync::Arc;

use super::backend::InferenceBackend;
use super::contract::validate;
use super::failure_sink::FailureSink;
use super::grounding;
use super::prompt_templates::{build_prompt, fit_note, MAX_NOTE_CHARS};
use super::response::parse_response;
use super::strategy::{clamp_attempts, strategy_for, PromptStrategy, ATTEMPT_BUDGET};
use super::types::{AttemptError, AttemptOutcome, ExtractionAttempt, PipelineOutcome, SourceNote};

/// Appended to `notes` of a record extracted from a cut note.
pub const TRUNCATED_INPUT_NOTE: &str =
    "Source note exceeded the input budget; its middle section was not shown to the model.";

// ═══════════════════════════════════════════
// State machine
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// About to make the k-th backend call (1-based).
    Attempting(u32),
    /// Attempt k produced a schema-valid record.
    Accepted(u32),
    Rejected,
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Attempting(_))
    }
}

/// What an attempt amounted to, as far as the state machine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Validated,
    Failed,
}

/// Next state after one attempt. Terminal states are absorbing.
pub fn transition(state: ControllerState, step: StepResult, max_attempts: u32) -> ControllerState {
    match (state, step) {
        (ControllerState::Attempting(k), StepResult::Validated) => ControllerState::Accepted(k),
        (ControllerState::Attempting(k), StepResult::Failed) if k < max_attempts => {
            ControllerState::Attempting(k + 1)
        }
        (ControllerState::Attempting(_), StepResult::Failed) => ControllerState::Rejected,
        (terminal, _) => terminal,
    }
}

// ═══════════════════════════════════════════
// Controller
// ═══════════════════════════════════════════

/// Runs the attempt loop against an injected backend.
pub struct RetryController {
    backend: Arc<dyn InferenceBackend>,
    sink: Option<Arc<dyn FailureSink>>,
    max_attempts: u32,
    note_budget: usize,
}

impl RetryController {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            sink: None,
            max_attempts: ATTEMPT_BUDGET,
            note_budget: MAX_NOTE_CHARS,
        }
    }

    /// Log rejected runs to `sink`.
    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attempt budget, clamped to the strategy table.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = clamp_attempts(max_attempts);
        self
    }

    /// Max note characters sent to the backend.
    pub fn with_note_budget(mut self, chars: usize) -> Self {
        self.note_budget = chars;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Process one note to a terminal outcome.
    ///
    /// Attempt failures never escape: the caller only sees Accepted or Rejected.
    pub fn run(&self, note: &SourceNote) -> PipelineOutcome {
        let span = tracing::info_span!(
            "pipeline_run",
            note_id = %note.id(),
            backend = %self.backend.name(),
            note_chars = note.char_len(),
        );
        let _guard = span.enter();

        let (prompt_note, was_cut) = fit_note(note.text(), self.note_budget);
        if was_cut {
            tracing::info!(budget = self.note_budget, "Note truncated for inference");
        }

        let mut state = ControllerState::Attempting(1);
        let mut failures: Vec<ExtractionAttempt> = Vec::new();

        while let ControllerState::Attempting(k) = state {
            let Some(strategy) = strategy_for(k) else {
                // Budget is clamped to the table, so this is unreachable in practice.
                state = ControllerState::Rejected;
                break;
            };

            let attempt = self.attempt(k, strategy, &prompt_note);
            match attempt.outcome {
                AttemptOutcome::Validated(record) => {
                    let mut record = *record;
                    if was_cut {
                        record.notes.push(TRUNCATED_INPUT_NOTE.to_string());
                    }
                    let report = grounding::verify(&record, note);
                    tracing::info!(
                        attempt = k,
                        template = %strategy.kind,
                        entries = record.entry_count(),
                        grounded = report.overall.grounded,
                        spans = report.overall.total,
                        flagged = report.flagged_entries().count(),
                        "Extraction accepted"
                    );
                    debug_assert_eq!(
                        transition(state, StepResult::Validated, self.max_attempts),
                        ControllerState::Accepted(k)
                    );
                    return PipelineOutcome::Accepted {
                        record,
                        grounding: report,
                        attempt: k,
                    };
                }
                AttemptOutcome::Failed(_) => {
                    if let Some(err) = attempt.failure() {
                        tracing::warn!(
                            attempt = k,
                            max_attempts = self.max_attempts,
                            template = %strategy.kind,
                            category = %err.category(),
                            error = %err,
                            "Extraction attempt failed"
                        );
                    }
                    failures.push(attempt);
                    state = transition(state, StepResult::Failed, self.max_attempts);
                }
            }
        }

        tracing::warn!(attempts = failures.len(), "Extraction rejected, attempt budget exhausted");
        self.log_rejection(note, &failures);
        PipelineOutcome::Rejected { attempts: failures }
    }

    /// One backend call plus parse and validate.
    fn attempt(&self, index: u32, strategy: PromptStrategy, note_text: &str) -> ExtractionAttempt {
        tracing::debug!(
            attempt = index,
            template = %strategy.kind,
            temperature = strategy.temperature,
            max_output_tokens = strategy.max_output_tokens,
            "Selected prompt strategy"
        );

        let prompt = build_prompt(strategy.kind, note_text, strategy.max_spans_per_entry);
        let generated = self
            .backend
            .generate(&prompt, strategy.temperature, strategy.max_output_tokens);

        let (raw_response, outcome) = match generated {
            Ok(raw) => {
                let outcome = match parse_response(&raw)
                    .map_err(AttemptError::from)
                    .and_then(|value| validate(&value).map_err(AttemptError::from))
                {
                    Ok(record) => AttemptOutcome::Validated(Box::new(record)),
                    Err(e) => AttemptOutcome::Failed(e),
                };
                (Some(raw), outcome)
            }
            Err(e) => (None, AttemptOutcome::Failed(e.into())),
        };

        ExtractionAttempt {
            index,
            template: strategy.kind,
            temperature: strategy.temperature,
            max_output_tokens: strategy.max_output_tokens,
            raw_response,
            outcome,
        }
    }

    fn log_rejection(&self, note: &SourceNote, failures: &[ExtractionAttempt]) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.record(note.id(), failures) {
            tracing::error!(error = %e, "Failed to write failure log entry");
        }
    }
}
