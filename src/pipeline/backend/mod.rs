//! Inference backend interface.
//!
//! The pipeline only needs "prompt + temperature + token limit → text".
//! Backends own their own timeouts; the controller never inspects the
//! environment to find one, it is handed one.

pub mod ollama;
pub mod mock;

pub use ollama::*;
pub use mock::*;

use thiserror::Error;

use super::prompt_templates::Prompt;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend is not reachable at {0}")]
    Connection(String),

    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Model returned error (status {status}): {body}")]
    Model { status: u16, body: String },

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("No compatible model available")]
    NoModelAvailable,
}

/// Text generation backend (allows mocking).
pub trait InferenceBackend: Send + Sync {
    /// Generate a response. Blocking; bounded by the backend's own timeout.
    fn generate(
        &self,
        prompt: &Prompt,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<String, BackendError>;

    /// Short label for logs.
    fn name(&self) -> &str;
}
