use std::sync::Mutex;

use super::{BackendError, InferenceBackend};
use crate::pipeline::prompt_templates::Prompt;

/// One call received by a `ScriptedBackend`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: Prompt,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Mock backend for testing: replays scripted results in order and records
/// every call. After the script runs out the last entry repeats.
pub struct ScriptedBackend {
    script: Vec<Result<String, BackendError>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<String, BackendError>>) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always return the same response.
    pub fn repeating(response: &str) -> Self {
        Self::new(vec![Ok(response.to_string())])
    }

    /// Return each response once, in order.
    pub fn responses<S: AsRef<str>>(responses: &[S]) -> Self {
        Self::new(responses.iter().map(|r| Ok(r.as_ref().to_string())).collect())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl InferenceBackend for ScriptedBackend {
    fn generate(
        &self,
        prompt: &Prompt,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<String, BackendError> {
        let call_index = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| BackendError::HttpClient("scripted backend lock poisoned".into()))?;
            calls.push(RecordedCall {
                prompt: prompt.clone(),
                temperature,
                max_output_tokens,
            });
            calls.len() - 1
        };

        match self.script.get(call_index).or_else(|| self.script.last()) {
            Some(result) => result.clone(),
            None => Err(BackendError::Connection("scripted backend has no script".into())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
