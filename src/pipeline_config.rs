//! Pipeline configuration: backend endpoint, attempt budget, note budget and
//! failure-log location.
//!
//! Resolution order: defaults, then `NAVIGATOR_*` environment variables, then
//! whatever the caller (CLI flags) overrides on the returned value.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::pipeline::backend::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
use crate::pipeline::prompt_templates::MAX_NOTE_CHARS;
use crate::pipeline::strategy::{clamp_attempts, ATTEMPT_BUDGET};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

pub const ENV_OLLAMA_URL: &str = "NAVIGATOR_OLLAMA_URL";
pub const ENV_MODEL: &str = "NAVIGATOR_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "NAVIGATOR_TIMEOUT_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "NAVIGATOR_MAX_ATTEMPTS";
pub const ENV_FAILURE_LOG: &str = "NAVIGATOR_FAILURE_LOG";

/// Backend request timeout. CPU inference of a long note can take minutes.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub ollama_url: String,
    /// `None` picks the best model the server has.
    pub model: Option<String>,
    pub timeout_secs: u64,
    /// Clamped to the strategy table when the controller is built.
    pub max_attempts: u32,
    /// Note characters sent to the backend.
    pub note_char_budget: usize,
    pub failure_log: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: ATTEMPT_BUDGET,
            note_char_budget: MAX_NOTE_CHARS,
            failure_log: config::default_failure_log_path(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Resolution
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup` (variable name → value).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_OLLAMA_URL) {
            self.ollama_url = non_empty(ENV_OLLAMA_URL, url)?;
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.model = Some(non_empty(ENV_MODEL, model)?);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = positive(ENV_TIMEOUT_SECS, &secs)?;
        }
        if let Some(n) = lookup(ENV_MAX_ATTEMPTS) {
            self.max_attempts = positive(ENV_MAX_ATTEMPTS, &n)?;
        }
        if let Some(path) = lookup(ENV_FAILURE_LOG) {
            self.failure_log = PathBuf::from(non_empty(ENV_FAILURE_LOG, path)?);
        }
        Ok(self)
    }

    /// Check the final values, after every override source has been applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ollama_url.trim().is_empty() {
            return Err(ConfigError::Empty { var: "ollama_url" });
        }
        if self.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ConfigError::Empty { var: "model" });
        }
        if self.failure_log.as_os_str().is_empty() {
            return Err(ConfigError::Empty { var: "failure_log" });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Zero { field: "timeout_secs" });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero { field: "max_attempts" });
        }
        if self.note_char_budget == 0 {
            return Err(ConfigError::Zero { field: "note_char_budget" });
        }
        Ok(())
    }

    /// Attempt budget the controller will actually use.
    pub fn effective_max_attempts(&self) -> u32 {
        clamp_attempts(self.max_attempts)
    }

    /// Model to use, falling back to the default name.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

fn non_empty(var: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Empty { var });
    }
    Ok(trimmed.to_string())
}

fn positive<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        }),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
