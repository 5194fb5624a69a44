//! Shared application state.
//!
//! `CoreState` owns the context store, the completion client and the context
//! retriever. It is built once at startup, wrapped in `Arc`, and handed to
//! the HTTP layer. Apps take `&CoreState` explicitly.

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::context::ContextStore;
use crate::pipeline::completion::{
    CompletionError, OllamaClient, RetryingCompletion, TextCompletion,
};
use crate::retrieval::{ContextRetriever, ContextSource, HttpContextSource, KnowledgeBase, RetrievalError};

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    config: AppConfig,
    store: ContextStore,
    completion: Arc<dyn TextCompletion>,
    retriever: ContextRetriever,
    started_at: Instant,
}

impl CoreState {
    pub fn new(
        config: AppConfig,
        completion: Arc<dyn TextCompletion>,
        retriever: ContextRetriever,
    ) -> Self {
        Self {
            config,
            store: ContextStore::new(),
            completion,
            retriever,
            started_at: Instant::now(),
        }
    }

    /// Wire the real collaborators described by `config`: a retrying Ollama
    /// client, the on-disk knowledge base and the optional remote context
    /// endpoint.
    ///
    /// Builds blocking HTTP clients, so call it outside any async runtime.
    pub fn from_config(config: AppConfig) -> Result<Self, CoreError> {
        let client = OllamaClient::new(&config.ollama_url, config.timeout_secs)?;
        let completion = Arc::new(RetryingCompletion::new(client, config.retry));

        let knowledge = KnowledgeBase::load_dir(&config.knowledge_dir)?;
        let remote: Option<Box<dyn ContextSource>> = match &config.retrieval_url {
            Some(url) => Some(Box::new(HttpContextSource::new(url, &config.model)?)),
            None => None,
        };

        tracing::info!(
            ollama_url = %config.ollama_url,
            model = %config.model,
            screening_model = %config.screening_model,
            knowledge_chunks = knowledge.len(),
            remote_context = remote.is_some(),
            "Core state initialised"
        );

        Ok(Self::new(
            config,
            completion,
            ContextRetriever::new(knowledge, remote),
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn completion(&self) -> &dyn TextCompletion {
        self.completion.as_ref()
    }

    pub fn retriever(&self) -> &ContextRetriever {
        &self.retriever
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Errors from building `CoreState`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Completion client error: {0}")]
    Completion(#[from] CompletionError),
    #[error("Retrieval setup error: {0}")]
    Retrieval(#[from] RetrievalError),
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::completion::MockCompletion;

    /// Default config, empty local retriever and the given client.
    pub(crate) fn core_with(completion: Arc<dyn TextCompletion>) -> CoreState {
        CoreState::new(
            AppConfig::default(),
            completion,
            ContextRetriever::local_only(KnowledgeBase::empty()),
        )
    }

    #[test]
    fn new_state_is_empty() {
        let core = core_with(Arc::new(MockCompletion::new("ok")));
        assert!(core.store().is_empty().unwrap());
        assert!(!core.retriever().has_remote());
        assert_eq!(core.config().model, crate::config::DEFAULT_MODEL);
    }

    #[test]
    fn from_config_loads_knowledge_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("typologies.json"),
            r#"{"typologies": [{"name": "Smurfing", "description": "small deposits", "indicators": []}]}"#,
        )
        .unwrap();

        let config = AppConfig {
            knowledge_dir: dir.path().to_path_buf(),
            retrieval_url: Some("http://127.0.0.1:5000".into()),
            ..AppConfig::default()
        };
        let core = CoreState::from_config(config).unwrap();
        assert_eq!(core.retriever().knowledge().len(), 1);
        assert!(core.retriever().has_remote());
    }

    #[test]
    fn completion_is_shared() {
        let mock = Arc::new(MockCompletion::new("hello"));
        let core = core_with(mock.clone());
        let options = crate::pipeline::completion::GenerationOptions::default();
        assert_eq!(core.completion().complete("p", "m", &options).unwrap(), "hello");
        assert_eq!(mock.call_count(), 1);
    }
}
