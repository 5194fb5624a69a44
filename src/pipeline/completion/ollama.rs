use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::GenerationOptions;
use super::{CompletionError, TextCompletion};

/// Ollama HTTP client for local LLM inference.
///
/// Single-shot: wrap it in `RetryingCompletion` for bounded retries.
/// Construct it outside any async runtime (the blocking client owns one).
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a new OllamaClient pointing at an Ollama instance.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, CompletionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CompletionError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    /// Default Ollama instance at localhost:11434 with a 2-minute timeout.
    pub fn default_local() -> Result<Self, CompletionError> {
        Self::new(
            crate::config::DEFAULT_OLLAMA_URL,
            crate::config::DEFAULT_TIMEOUT_SECS,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_connect() {
            CompletionError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            CompletionError::Timeout(self.timeout_secs)
        } else {
            CompletionError::HttpClient(e.to_string())
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: &'a GenerationOptions,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str, model: &'a str, options: &'a GenerationOptions) -> Self {
        Self {
            model,
            prompt,
            stream: false,
            format: options.json_format.then_some("json"),
            options,
        }
    }
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagsModel>,
}

#[derive(Deserialize)]
struct TagsModel {
    name: String,
}

impl TextCompletion for OllamaClient {
    fn complete(
        &self,
        prompt: &str,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest::new(prompt, model, options);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| CompletionError::ResponseParsing(e.to_string()))?;

        tracing::debug!(
            model,
            prompt_chars = prompt.len(),
            response_chars = parsed.response.len(),
            "Completion received"
        );

        Ok(parsed.response)
    }

    fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TagsResponse = response
            .json()
            .map_err(|e| CompletionError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::completion::{RetryPolicy, RetryingCompletion};

    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    #[test]
    fn constructor_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 30).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn default_local_points_at_localhost() {
        let client = OllamaClient::default_local().unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.timeout_secs, 120);
    }

    #[test]
    fn generate_request_shape() {
        let options = GenerationOptions::default();
        let body = GenerateRequest::new("Review this", "mistral:latest", &options);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "mistral:latest");
        assert_eq!(json["prompt"], "Review this");
        assert_eq!(json["stream"], false);
        assert!(json.get("format").is_none());
        assert_eq!(json["options"]["seed"], 42);
        assert_eq!(json["options"]["num_ctx"], 4096);
    }

    #[test]
    fn json_mode_sets_format_field() {
        let options = GenerationOptions::extraction().json();
        let body = GenerateRequest::new("Score this", "mistral:latest", &options);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["format"], "json");
    }

    #[test]
    fn generate_response_deserializes() {
        let raw = r#"{"model":"mistral","response":"SCORE: 40 | EXPLANATION: ok","done":true}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.response, "SCORE: 40 | EXPLANATION: ok");
    }

    #[test]
    fn tags_response_deserializes() {
        let raw = r#"{"models":[{"name":"mistral:latest","size":1},{"name":"llama3:8b"}]}"#;
        let parsed: TagsResponse = serde_json::from_str(raw).unwrap();
        let names: Vec<_> = parsed.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["mistral:latest", "llama3:8b"]);
    }

    #[test]
    fn unreachable_server_is_a_connection_error() {
        let client = OllamaClient::new(&closed_port_url(), 5).unwrap();
        let err = client
            .complete("hello", "mistral:latest", &GenerationOptions::default())
            .unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }

    #[test]
    fn unreachable_server_exhausts_retry_budget() {
        let client = OllamaClient::new(&closed_port_url(), 5).unwrap();
        let retrying = RetryingCompletion::new(client, RetryPolicy::new(2, Duration::ZERO));
        let err = retrying
            .complete("hello", "mistral:latest", &GenerationOptions::default())
            .unwrap_err();
        assert!(matches!(err, CompletionError::Unavailable { attempts: 2, .. }));
    }
}
