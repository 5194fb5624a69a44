//! Context retrieval for retrieval-augmented prompts.
//!
//! A local keyword-searched knowledge base plus an optional remote context
//! endpoint. Remote failures always fall back to local context.

pub mod client;
pub mod knowledge;

pub use client::{ContextSource, ExternalContext, HttpContextSource};
pub use knowledge::{KnowledgeBase, KnowledgeChunk};

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("Context request failed: {0}")]
    Http(String),

    #[error("Context endpoint returned status {0}")]
    Status(u16),

    #[error("Invalid context data: {0}")]
    InvalidResponse(String),

    #[error("Cannot read {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Everything retrieved for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub query: String,
    pub chunks: Vec<KnowledgeChunk>,
    pub external: ExternalContext,
}

/// Knowledge base search plus optional remote context.
pub struct ContextRetriever {
    knowledge: KnowledgeBase,
    remote: Option<Box<dyn ContextSource>>,
}

impl ContextRetriever {
    pub fn new(knowledge: KnowledgeBase, remote: Option<Box<dyn ContextSource>>) -> Self {
        Self { knowledge, remote }
    }

    pub fn local_only(knowledge: KnowledgeBase) -> Self {
        Self::new(knowledge, None)
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn retrieve(&self, query: &str, context_type: &str, top_k: usize) -> RetrievedContext {
        let chunks = self.knowledge.search(query, top_k);

        let external = match &self.remote {
            Some(remote) => remote.fetch(query, context_type).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Remote context unavailable, using local context");
                ExternalContext::local(query)
            }),
            None => ExternalContext::local(query),
        };

        tracing::debug!(
            chunks = chunks.len(),
            source = %external.source,
            "Context retrieved"
        );

        RetrievedContext {
            query: query.to_string(),
            chunks,
            external,
        }
    }
}

/// Render retrieved context as a prompt block.
pub fn format_context(ctx: &RetrievedContext) -> String {
    let mut lines = Vec::new();

    if !ctx.chunks.is_empty() {
        lines.push("=== Knowledge Base Context ===".to_string());
        for chunk in &ctx.chunks {
            lines.push(format!("Source: {}", chunk.source));
            lines.push(format!("Content: {}", chunk.text));
            lines.push(format!("Relevance: {:.2}", chunk.relevance));
            lines.push(String::new());
        }
    }

    lines.push("=== External Context ===".to_string());
    lines.push(format!("Source: {}", ctx.external.source));
    lines.push(format!("Context: {}", ctx.external.context));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DownSource;

    impl ContextSource for DownSource {
        fn fetch(&self, _query: &str, _context_type: &str) -> Result<ExternalContext, RetrievalError> {
            Err(RetrievalError::Status(503))
        }
    }

    struct FixedSource;

    impl ContextSource for FixedSource {
        fn fetch(&self, query: &str, context_type: &str) -> Result<ExternalContext, RetrievalError> {
            Ok(ExternalContext {
                context: format!("{context_type}:{query}"),
                source: "remote".into(),
            })
        }
    }

    fn knowledge() -> KnowledgeBase {
        let mut base = KnowledgeBase::empty();
        base.add_json(
            "typologies",
            r#"{"typologies": [{"name": "Smurfing", "description": "Many small cash deposits", "indicators": ["structuring"]}]}"#,
        )
        .unwrap();
        base
    }

    #[test]
    fn remote_failure_falls_back_to_local() {
        let retriever = ContextRetriever::new(knowledge(), Some(Box::new(DownSource)));
        let ctx = retriever.retrieve("cash deposits", "rag", 3);
        assert!(ctx.external.is_local());
        assert_eq!(ctx.chunks.len(), 1);
        assert!(retriever.has_remote());
    }

    #[test]
    fn remote_success_is_used() {
        let retriever = ContextRetriever::new(KnowledgeBase::empty(), Some(Box::new(FixedSource)));
        let ctx = retriever.retrieve("wire", "rag", 3);
        assert_eq!(ctx.external.context, "rag:wire");
        assert!(ctx.chunks.is_empty());
    }

    #[test]
    fn format_includes_both_sections() {
        let retriever = ContextRetriever::local_only(knowledge());
        let text = format_context(&retriever.retrieve("structuring cash", "rag", 3));
        assert!(text.starts_with("=== Knowledge Base Context ==="));
        assert!(text.contains("Source: typologies"));
        assert!(text.contains("Relevance: 1.00"));
        assert!(text.contains("=== External Context ===\nSource: local"));
    }

    #[test]
    fn format_without_chunks() {
        let retriever = ContextRetriever::local_only(KnowledgeBase::empty());
        let text = format_context(&retriever.retrieve("anything", "rag", 3));
        assert!(!text.contains("Knowledge Base"));
        assert!(text.contains("Local context for: anything"));
        assert_eq!(retriever.knowledge().len(), 0);
    }
}
