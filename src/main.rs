//! navigator: run the discharge extraction pipeline against a local Ollama server.
//!
//! `extract` prints the review packet for one note, or the untouched note
//! text when every attempt fails. `batch` runs a directory of notes and
//! prints a summary.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use discharge_navigator::config;
use discharge_navigator::pipeline::backend::{InferenceBackend, OllamaBackend, DEFAULT_MODEL};
use discharge_navigator::pipeline::batch::{self, DEFAULT_WORKERS};
use discharge_navigator::pipeline::export::ReviewPacket;
use discharge_navigator::pipeline::failure_sink::JsonlFailureSink;
use discharge_navigator::pipeline::{PipelineOutcome, RetryController, SourceNote};
use discharge_navigator::pipeline_config::PipelineConfig;

#[derive(Parser)]
#[command(name = "navigator", version)]
#[command(about = "Structure discharge notes into validated, evidence-grounded records")]
struct Cli {
    /// Ollama base URL (overrides NAVIGATOR_OLLAMA_URL)
    #[arg(long, global = true)]
    ollama_url: Option<String>,

    /// Model name; the best installed model is picked when omitted
    #[arg(long, global = true)]
    model: Option<String>,

    /// Backend request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Attempts per note (1-3)
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Failure log path
    #[arg(long, global = true)]
    failure_log: Option<PathBuf>,

    /// Do not write rejected runs to the failure log
    #[arg(long, global = true)]
    no_failure_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract one note
    Extract {
        /// Plain-text note file
        file: PathBuf,

        /// Note identifier (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,
    },
    /// Extract every .txt note in a directory
    Batch {
        dir: PathBuf,

        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,

        /// Write one review packet per accepted note into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    discharge_navigator::init_tracing();
    let cli = Cli::parse();

    let mut config = PipelineConfig::from_env()?;
    if let Some(url) = cli.ollama_url {
        config.ollama_url = url;
    }
    if cli.model.is_some() {
        config.model = cli.model;
    }
    if let Some(secs) = cli.timeout_secs {
        config.timeout_secs = secs;
    }
    if let Some(n) = cli.max_attempts {
        config.max_attempts = n;
    }
    if let Some(path) = cli.failure_log {
        config.failure_log = path;
    }
    config.validate()?;

    tracing::info!(
        "{} v{} (ollama: {}, max attempts: {})",
        config::APP_NAME,
        config::APP_VERSION,
        config.ollama_url,
        config.effective_max_attempts()
    );

    let controller = build_controller(&config, !cli.no_failure_log)?;

    match cli.command {
        Command::Extract { file, id } => extract(&controller, &file, id),
        Command::Batch {
            dir,
            workers,
            out_dir,
        } => run_batch(&controller, &dir, workers, out_dir.as_deref()),
    }
}

fn build_controller(config: &PipelineConfig, log_failures: bool) -> anyhow::Result<RetryController> {
    let backend = connect_backend(config)?;
    let mut controller = RetryController::new(backend)
        .with_max_attempts(config.max_attempts)
        .with_note_budget(config.note_char_budget);

    if log_failures {
        let sink = JsonlFailureSink::open(&config.failure_log)
            .with_context(|| format!("opening failure log {}", config.failure_log.display()))?;
        tracing::info!(path = %sink.path().display(), "Logging rejected runs");
        controller = controller.with_failure_sink(Arc::new(sink));
    }
    Ok(controller)
}

fn connect_backend(config: &PipelineConfig) -> anyhow::Result<Arc<dyn InferenceBackend>> {
    let backend = OllamaBackend::new(&config.ollama_url, config.model_or_default(), config.timeout_secs)?;
    if config.model.is_some() {
        return Ok(Arc::new(backend));
    }

    match backend.with_best_model() {
        Ok(best) => {
            tracing::info!(model = %best.model(), "Selected model");
            Ok(Arc::new(best))
        }
        Err(e) => {
            tracing::warn!(error = %e, model = DEFAULT_MODEL, "Model discovery failed, using default");
            Ok(Arc::new(OllamaBackend::new(
                &config.ollama_url,
                DEFAULT_MODEL,
                config.timeout_secs,
            )?))
        }
    }
}

fn extract(controller: &RetryController, file: &Path, id: Option<String>) -> anyhow::Result<ExitCode> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let id = id.or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()));
    let note = SourceNote::with_id_or_generated(id, text);

    let outcome = controller.run(&note);
    match ReviewPacket::from_outcome(note.id(), &outcome) {
        Some(packet) => {
            println!("{}", packet.to_json_pretty()?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!(
                "Could not produce a validated record after {} attempt(s). Showing the original note.",
                outcome.attempts_used()
            );
            println!("{}", note.text());
            Ok(ExitCode::from(2))
        }
    }
}

fn run_batch(
    controller: &RetryController,
    dir: &Path,
    workers: usize,
    out_dir: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let notes = batch::load_notes(dir)?;
    let (items, summary) = batch::evaluate(controller, &notes, workers)?;

    if let Some(out_dir) = out_dir {
        std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
        for item in &items {
            if let Some(packet) = ReviewPacket::from_outcome(&item.note_id, &item.outcome) {
                let path = out_dir.join(format!("{}.json", item.note_id));
                std::fs::write(&path, packet.to_json_pretty()?)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
    }

    for item in &items {
        match (&item.outcome, &item.crash) {
            (_, Some(panic)) => eprintln!("{}: run crashed: {}", item.note_id, panic),
            (PipelineOutcome::Rejected { attempts }, None) => {
                eprintln!("{}: rejected after {} attempt(s)", item.note_id, attempts.len());
            }
            _ => {}
        }
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::SUCCESS)
}
