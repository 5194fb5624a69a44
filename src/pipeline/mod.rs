//! Staged LLM pipelines.
//!
//! completion → prompt → parse → runner. The runner drives any ordered list
//! of `Stage`s over one item in the `ContextStore`, handing context from each
//! stage to the next.

pub mod completion;
pub mod parse;
pub mod prompt;
pub mod runner;

pub use runner::{
    PipelineOutcome, RaisedFlag, RunStatus, Stage, StageEnv, StageOutput, StageRecord,
    StageRunner,
};

use thiserror::Error;

use crate::context::StoreError;
use completion::CompletionError;

/// Rejected input, detected before any state is created.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The completion service stayed unreachable for the whole retry budget.
    #[error("{stage} stage: completion service unavailable: {source}")]
    CollaboratorUnavailable {
        stage: String,
        #[source]
        source: CompletionError,
        /// Deterministic text a caller may show instead of a stage result.
        fallback: String,
    },

    #[error("{stage} stage: completion failed: {source}")]
    Completion {
        stage: String,
        #[source]
        source: CompletionError,
    },

    #[error("Context store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{stage} stage failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Pipeline {0} has no stages")]
    Empty(String),
}

impl PipelineError {
    /// Wrap a completion failure raised inside `stage`.
    pub fn from_completion(stage: &str, source: CompletionError) -> Self {
        if source.is_unavailable() {
            Self::CollaboratorUnavailable {
                stage: stage.to_string(),
                fallback: completion::fallback::unavailable_notice(stage),
                source,
            }
        } else {
            Self::Completion {
                stage: stage.to_string(),
                source,
            }
        }
    }

    /// Stage that failed, when the error came from a stage.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::CollaboratorUnavailable { stage, .. }
            | Self::Completion { stage, .. }
            | Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
