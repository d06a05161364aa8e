//! Batch evaluation: many notes, a small rayon pool, one shared failure log.
//!
//! Each note is an independent pipeline run. Workers share only the
//! controller (backend + sink), both of which are `Sync`.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use super::controller::RetryController;
use super::types::{PipelineOutcome, SourceNote};

/// Default worker count. A local Ollama instance serves one request at a time
/// on CPU, so more workers mostly queue.
pub const DEFAULT_WORKERS: usize = 2;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No .txt notes found in {0}")]
    NoNotes(PathBuf),

    #[error("Cannot start batch workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Outcome of one note within a batch.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub note_id: String,
    pub outcome: PipelineOutcome,
    /// Panic message when the run crashed. The outcome is then a rejection
    /// with no attempts.
    pub crash: Option<String>,
}

/// Aggregate view of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Rejections caused by a crashed run rather than exhausted attempts.
    pub crashed: usize,
    /// Accepted runs keyed by the attempt that succeeded.
    pub accepted_by_attempt: BTreeMap<u32, usize>,
    /// Mean overall grounding ratio over accepted records that had spans.
    pub mean_overall_grounding: Option<f64>,
    pub duration_ms: u64,
}

impl BatchSummary {
    pub fn from_items(items: &[BatchItem], duration_ms: u64) -> Self {
        let mut accepted_by_attempt = BTreeMap::new();
        let mut ratios = Vec::new();

        for item in items {
            if let PipelineOutcome::Accepted { grounding, attempt, .. } = &item.outcome {
                *accepted_by_attempt.entry(*attempt).or_insert(0) += 1;
                ratios.extend(grounding.overall.ratio);
            }
        }

        let accepted = accepted_by_attempt.values().sum();
        let mean_overall_grounding =
            (!ratios.is_empty()).then(|| ratios.iter().sum::<f64>() / ratios.len() as f64);

        Self {
            total: items.len(),
            accepted,
            rejected: items.len() - accepted,
            crashed: items.iter().filter(|i| i.crash.is_some()).count(),
            accepted_by_attempt,
            mean_overall_grounding,
            duration_ms,
        }
    }

    pub fn acceptance_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.accepted as f64 / self.total as f64)
    }
}

/// Run every note through `controller` on a pool of `workers` threads.
///
/// Results come back in input order. A run that panics is contained to its
/// note: it comes back as a rejection with the panic message attached.
pub fn run_batch(
    controller: &RetryController,
    notes: &[SourceNote],
    workers: usize,
) -> Result<Vec<BatchItem>, BatchError> {
    let workers = workers.clamp(1, notes.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("navigator-batch-{i}"))
        .build()?;

    tracing::info!(notes = notes.len(), workers, "Batch started");

    Ok(pool.install(|| notes.par_iter().map(|note| run_one(controller, note)).collect()))
}

fn run_one(controller: &RetryController, note: &SourceNote) -> BatchItem {
    match panic::catch_unwind(AssertUnwindSafe(|| controller.run(note))) {
        Ok(outcome) => BatchItem {
            note_id: note.id().to_string(),
            outcome,
            crash: None,
        },
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(note_id = %note.id(), panic = %message, "Pipeline run panicked");
            BatchItem {
                note_id: note.id().to_string(),
                outcome: PipelineOutcome::Rejected { attempts: Vec::new() },
                crash: Some(message),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run a batch and summarize it.
pub fn evaluate(
    controller: &RetryController,
    notes: &[SourceNote],
    workers: usize,
) -> Result<(Vec<BatchItem>, BatchSummary), BatchError> {
    let start = Instant::now();
    let items = run_batch(controller, notes, workers)?;
    let summary = BatchSummary::from_items(&items, start.elapsed().as_millis() as u64);
    tracing::info!(
        total = summary.total,
        accepted = summary.accepted,
        rejected = summary.rejected,
        crashed = summary.crashed,
        duration_ms = summary.duration_ms,
        "Batch complete"
    );
    Ok((items, summary))
}

/// Load every `*.txt` file in `dir` as a note named after its file stem,
/// sorted by file name.
pub fn load_notes(dir: &Path) -> Result<Vec<SourceNote>, BatchError> {
    let io_err = |source| BatchError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(io_err)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(BatchError::NoNotes(dir.to_path_buf()));
    }

    paths
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path).map_err(|source| BatchError::Io {
                path: path.clone(),
                source,
            })?;
            let id = path.file_stem().map(|s| s.to_string_lossy().into_owned());
            Ok(SourceNote::with_id_or_generated(id, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::pipeline::backend::{BackendError, InferenceBackend, ScriptedBackend};
    use crate::pipeline::failure_sink::MemoryFailureSink;
    use crate::pipeline::prompt_templates::Prompt;

    /// Answers with a valid record, except for notes mentioning `trigger`,
    /// where it panics.
    struct PanicsOn {
        trigger: &'static str,
    }

    impl InferenceBackend for PanicsOn {
        fn generate(&self, prompt: &Prompt, _: f32, _: u32) -> Result<String, BackendError> {
            if prompt.user.contains(self.trigger) {
                panic!("backend crashed on {}", self.trigger);
            }
            Ok(valid_response("heart failure"))
        }

        fn name(&self) -> &str {
            "panics-on"
        }
    }

    fn valid_response(span: &str) -> String {
        serde_json::json!({
            "diagnoses": [{"label": "Heart failure", "evidence_spans": [{"text": span}]}],
            "medications": [],
            "followups": [],
            "red_flags": [],
            "missing_info": []
        })
        .to_string()
    }

    fn notes(n: usize) -> Vec<SourceNote> {
        (0..n)
            .map(|i| SourceNote::new(format!("note_{i:03}"), "Acute decompensated heart failure."))
            .collect()
    }

    #[test]
    fn results_keep_input_order() {
        let backend = Arc::new(ScriptedBackend::repeating(&valid_response("heart failure")));
        let controller = RetryController::new(backend.clone());

        let items = run_batch(&controller, &notes(12), 4).unwrap();

        let ids: Vec<String> = items.iter().map(|i| i.note_id.clone()).collect();
        let expected: Vec<String> = (0..12).map(|i| format!("note_{i:03}")).collect();
        assert_eq!(ids, expected);
        assert_eq!(backend.call_count(), 12);
    }

    #[test]
    fn panicking_run_is_counted_not_lost() {
        let controller = RetryController::new(Arc::new(PanicsOn { trigger: "CRASH-ME" }));
        let mut batch = notes(6);
        batch[1] = SourceNote::new("note_001", "Acute decompensated heart failure. CRASH-ME");

        let (items, summary) = evaluate(&controller, &batch, 2).unwrap();

        assert_eq!(items.len(), 6);
        assert_eq!(items[1].note_id, "note_001");
        assert!(!items[1].outcome.is_accepted());
        assert!(items[1].crash.as_deref().is_some_and(|m| m.contains("CRASH-ME")));
        assert!(items.iter().enumerate().all(|(i, item)| i == 1 || item.crash.is_none()));
        assert_eq!(summary.total, 6);
        assert_eq!(summary.accepted, 5);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.crashed, 1);
    }

    #[test]
    fn shared_sink_collects_every_rejection() {
        let backend = Arc::new(ScriptedBackend::repeating("{\"diagnoses\": ["));
        let sink = Arc::new(MemoryFailureSink::new());
        let controller = RetryController::new(backend).with_failure_sink(sink.clone());

        let (items, summary) = evaluate(&controller, &notes(6), 3).unwrap();

        assert_eq!(items.len(), 6);
        assert_eq!(summary.rejected, 6);
        assert_eq!(summary.crashed, 0);
        assert_eq!(sink.records().len(), 6);
        assert_eq!(sink.entry_count(), 18);
    }

    #[test]
    fn summary_counts_acceptance_by_attempt_and_grounding() {
        let backend = Arc::new(ScriptedBackend::repeating(&valid_response("heart failure")));
        let controller = RetryController::new(backend);
        let mut items = run_batch(&controller, &notes(2), 1).unwrap();

        let ungrounded = Arc::new(ScriptedBackend::repeating(&valid_response("renal failure")));
        items.extend(run_batch(&RetryController::new(ungrounded), &notes(1), 1).unwrap());

        let rejecting = Arc::new(ScriptedBackend::repeating(""));
        items.extend(run_batch(&RetryController::new(rejecting), &notes(1), 1).unwrap());

        let summary = BatchSummary::from_items(&items, 5);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.accepted, 3);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.accepted_by_attempt.get(&1), Some(&3));
        let mean = summary.mean_overall_grounding.unwrap();
        assert!((mean - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.acceptance_rate(), Some(0.75));
    }

    #[test]
    fn empty_batch_summarizes_to_zero() {
        let backend = Arc::new(ScriptedBackend::repeating("{}"));
        let items = run_batch(&RetryController::new(backend.clone()), &[], 4).unwrap();
        assert!(items.is_empty());
        assert_eq!(backend.call_count(), 0);
        let summary = BatchSummary::from_items(&items, 0);
        assert_eq!(summary.acceptance_rate(), None);
        assert_eq!(summary.mean_overall_grounding, None);
    }

    #[test]
    fn load_notes_reads_txt_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note_002.txt"), "second").unwrap();
        std::fs::write(dir.path().join("note_001.txt"), "first").unwrap();
        std::fs::write(dir.path().join("readme.md"), "ignored").unwrap();

        let notes = load_notes(dir.path()).unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].id(), "note_001");
        assert_eq!(notes[0].text(), "first");
        assert_eq!(notes[1].id(), "note_002");
    }

    #[test]
    fn load_notes_rejects_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_notes(dir.path()), Err(BatchError::NoNotes(_))));
        assert!(matches!(
            load_notes(&dir.path().join("absent")),
            Err(BatchError::Io { .. })
        ));
    }
}
