//! Text completion collaborator.
//!
//! Every stage talks to the LLM through `TextCompletion`. The production
//! implementation is `OllamaClient` wrapped in `RetryingCompletion`; tests and
//! offline demos use `MockCompletion`.

pub mod types;
pub mod retry;
pub mod ollama;
pub mod mock;
pub mod fallback;

pub use types::*;
pub use retry::{run_with_retry, RetryingCompletion};
pub use ollama::OllamaClient;
pub use mock::{MockCompletion, RecordedCall};
pub use fallback::{canned_response, unavailable_notice, BASIC_RESPONSE_PLAN};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    #[error("Ollama is not running at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Ollama returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Completion service unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable { attempts: u32, last_error: String },
}

impl CompletionError {
    /// Connection and timeout failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }

    /// The service could not be reached at all (as opposed to answering badly).
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Connection(_) | Self::Timeout(_)
        )
    }
}

/// LLM text completion abstraction (allows mocking).
pub trait TextCompletion: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<String, CompletionError>;

    fn list_models(&self) -> Result<Vec<String>, CompletionError>;

    fn is_model_available(&self, model: &str) -> Result<bool, CompletionError> {
        let models = self.list_models()?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }

    /// Single availability check for status reporting. Never retried.
    fn probe_model(&self, model: &str) -> Result<bool, CompletionError> {
        self.is_model_available(model)
    }
}
