use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fixed seed so repeated runs against the same model are reproducible.
pub const DEFAULT_SEED: u64 = 42;

/// Generation parameters for Ollama `/api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature. Lower = more deterministic.
    pub temperature: f32,
    /// Top-p (nucleus) sampling threshold.
    pub top_p: f32,
    /// Top-k sampling: number of top tokens to consider.
    pub top_k: u32,
    /// Context window size. None = model default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    /// Maximum tokens in the generated response. None = model default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
    pub repeat_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Ask the server to constrain output to JSON (`"format": "json"`).
    /// Sent as a top-level request field, not inside `options`.
    #[serde(skip)]
    pub json_format: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            num_ctx: Some(4096),
            num_predict: Some(500),
            repeat_penalty: 1.1,
            seed: Some(DEFAULT_SEED),
            json_format: false,
        }
    }
}

impl GenerationOptions {
    /// Low-temperature settings for label/JSON extraction.
    pub fn extraction() -> Self {
        Self {
            temperature: 0.1,
            ..Self::default()
        }
    }

    /// Long-form settings for tutoring answers.
    pub fn long_form() -> Self {
        Self {
            num_ctx: Some(16384),
            num_predict: Some(4096),
            ..Self::default()
        }
    }

    pub fn json(mut self) -> Self {
        self.json_format = true;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i32) -> Self {
        self.num_predict = Some(max_tokens);
        self
    }
}

/// Bounded retry policy for transient completion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Single attempt, no waiting.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}
