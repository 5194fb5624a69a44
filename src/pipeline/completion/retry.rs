use super::types::{GenerationOptions, RetryPolicy};
use super::{CompletionError, TextCompletion};

/// Run `call` until it succeeds, fails permanently, or the policy runs out.
///
/// Only transient errors (connection, timeout) are retried. Exhausting the
/// budget yields `CompletionError::Unavailable` carrying the last error.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, CompletionError>
where
    F: FnMut(u32) -> Result<T, CompletionError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<CompletionError> = None;

    for attempt in 1..=attempts {
        match call(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Completion succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() => {
                if attempt < attempts {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Completion attempt failed, retrying"
                    );
                    if !policy.backoff.is_zero() {
                        std::thread::sleep(policy.backoff);
                    }
                } else {
                    tracing::warn!(
                        operation,
                        attempts,
                        error = %e,
                        "Completion retry budget exhausted"
                    );
                }
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(CompletionError::Unavailable {
        attempts,
        last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

/// Decorator adding bounded retries to any `TextCompletion`.
pub struct RetryingCompletion<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: TextCompletion> RetryingCompletion<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: TextCompletion> TextCompletion for RetryingCompletion<C> {
    fn complete(
        &self,
        prompt: &str,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<String, CompletionError> {
        run_with_retry(&self.policy, "complete", |_| {
            self.inner.complete(prompt, model, options)
        })
    }

    fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        run_with_retry(&self.policy, "list_models", |_| self.inner.list_models())
    }

    fn probe_model(&self, model: &str) -> Result<bool, CompletionError> {
        self.inner.probe_model(model)
    }
}
