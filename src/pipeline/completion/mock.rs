use std::sync::Mutex;

use super::types::GenerationOptions;
use super::{CompletionError, TextCompletion};

/// One recorded `complete` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub model: String,
}

/// Scripted completion client for tests and offline demos.
///
/// Rules are checked in insertion order; the first rule whose needle occurs
/// in the prompt decides the response. Unmatched prompts get the default.
pub struct MockCompletion {
    rules: Vec<(String, Result<String, CompletionError>)>,
    default: Result<String, CompletionError>,
    available_models: Vec<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockCompletion {
    pub fn new(default_response: &str) -> Self {
        Self {
            rules: Vec::new(),
            default: Ok(default_response.to_string()),
            available_models: vec![crate::config::DEFAULT_MODEL.to_string()],
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every unmatched call fails with `error`.
    pub fn failing(error: CompletionError) -> Self {
        Self {
            default: Err(error),
            ..Self::new("")
        }
    }

    pub fn when(mut self, needle: &str, response: &str) -> Self {
        self.rules
            .push((needle.to_string(), Ok(response.to_string())));
        self
    }

    pub fn when_fails(mut self, needle: &str, error: CompletionError) -> Self {
        self.rules.push((needle.to_string(), Err(error)));
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

impl TextCompletion for MockCompletion {
    fn complete(
        &self,
        prompt: &str,
        model: &str,
        _options: &GenerationOptions,
    ) -> Result<String, CompletionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                model: model.to_string(),
            });
        }

        self.rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default.clone())
    }

    fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        Ok(self.available_models.clone())
    }
}
