use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{BackendError, InferenceBackend};
use crate::pipeline::prompt_templates::Prompt;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Model used when none is configured and listing is not possible.
pub const DEFAULT_MODEL: &str = "medgemma:latest";

/// Ollama HTTP client for local inference.
#[derive(Debug)]
pub struct OllamaBackend {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaBackend {
    /// Create a backend pointing at an Ollama instance.
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BackendError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    /// Default Ollama instance at localhost:11434 with 5-minute timeout.
    pub fn default_local() -> Result<Self, BackendError> {
        Self::new(DEFAULT_OLLAMA_URL, DEFAULT_MODEL, 300)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Switch to the best available model on the server.
    pub fn with_best_model(mut self) -> Result<Self, BackendError> {
        let available = self.list_models()?;
        self.model = select_model(&available).ok_or(BackendError::NoModelAvailable)?;
        Ok(self)
    }

    pub fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Model {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    fn map_transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_connect() {
            BackendError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            BackendError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            BackendError::HttpClient(e.to_string())
        }
    }
}

/// Pick the best available model: medgemma, then gemma, then anything.
pub fn select_model(available: &[String]) -> Option<String> {
    let find = |needle: &str| {
        available
            .iter()
            .find(|m| m.to_lowercase().contains(needle))
            .cloned()
    };
    find("medgemma")
        .or_else(|| find("gemma"))
        .or_else(|| available.first().cloned())
}

/// Request body for Ollama /api/chat
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: [OllamaMessage<'a>; 2],
    options: OllamaOptions,
    stream: bool,
    format: &'a str,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response body from Ollama /api/chat
#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    content: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl InferenceBackend for OllamaBackend {
    fn generate(
        &self,
        prompt: &Prompt,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<String, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model: &self.model,
            messages: [
                OllamaMessage {
                    role: "system",
                    content: &prompt.system,
                },
                OllamaMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            options: OllamaOptions {
                temperature,
                num_predict: max_output_tokens,
            },
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Model {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaChatResponse = response
            .json()
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        if parsed.done_reason.as_deref() == Some("length") {
            tracing::warn!(
                model = %self.model,
                max_output_tokens,
                "Generation stopped at token limit, output is likely truncated"
            );
        }

        Ok(parsed.message.content)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_backend_constructor() {
        let backend = OllamaBackend::new("http://localhost:11434", "medgemma", 120).unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434");
        assert_eq!(backend.timeout_secs, 120);
        assert_eq!(backend.model(), "medgemma");
    }

    #[test]
    fn ollama_backend_trims_trailing_slash() {
        let backend = OllamaBackend::new("http://localhost:11434/", "m", 60).unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434");
    }

    #[test]
    fn default_local_uses_standard_port() {
        let backend = OllamaBackend::default_local().unwrap();
        assert_eq!(backend.base_url, DEFAULT_OLLAMA_URL);
        assert_eq!(backend.model(), DEFAULT_MODEL);
    }

    #[test]
    fn select_model_prefers_medgemma() {
        let available = vec![
            "llama3:8b".to_string(),
            "gemma2:9b".to_string(),
            "williamljx/medgemma-4b-it-Q4_K_M-GGUF:latest".to_string(),
        ];
        assert_eq!(
            select_model(&available).as_deref(),
            Some("williamljx/medgemma-4b-it-Q4_K_M-GGUF:latest")
        );
    }

    #[test]
    fn select_model_falls_back_to_gemma_then_first() {
        let gemma = vec!["llama3:8b".to_string(), "Gemma2:2b".to_string()];
        assert_eq!(select_model(&gemma).as_deref(), Some("Gemma2:2b"));
        let other = vec!["llama3:8b".to_string()];
        assert_eq!(select_model(&other).as_deref(), Some("llama3:8b"));
        assert_eq!(select_model(&[]), None);
    }

    #[test]
    fn chat_request_shape() {
        let req = OllamaChatRequest {
            model: "medgemma",
            messages: [
                OllamaMessage { role: "system", content: "S" },
                OllamaMessage { role: "user", content: "U" },
            ],
            options: OllamaOptions {
                temperature: 0.1,
                num_predict: 4096,
            },
            stream: false,
            format: "json",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["format"], "json");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 4096);
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn chat_response_without_done_reason_parses() {
        let parsed: OllamaChatResponse =
            serde_json::from_str(r#"{"message": {"role": "assistant", "content": "{}"}}"#).unwrap();
        assert_eq!(parsed.message.content, "{}");
        assert!(parsed.done_reason.is_none());
    }

    #[test]
    fn unreachable_server_is_connection_or_timeout() {
        let backend = OllamaBackend::new("http://127.0.0.1:9", "m", 2).unwrap();
        let prompt = Prompt {
            system: "s".into(),
            user: "u".into(),
        };
        let err = backend.generate(&prompt, 0.0, 16).unwrap_err();
        assert!(
            matches!(
                err,
                BackendError::Connection(_) | BackendError::Timeout { .. } | BackendError::HttpClient(_)
            ),
            "got {err:?}"
        );
    }

    #[test]
    fn best_model_discovery_fails_cleanly_without_server() {
        let backend = OllamaBackend::new("http://127.0.0.1:9", "m", 2).unwrap();
        let err = backend.with_best_model().unwrap_err();
        assert!(
            matches!(
                err,
                BackendError::Connection(_) | BackendError::Timeout { .. } | BackendError::HttpClient(_)
            ),
            "got {err:?}"
        );
    }
}
