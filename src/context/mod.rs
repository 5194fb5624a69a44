//! Per-item context store.
//!
//! Holds the accumulating payload, pipeline state and the append-only
//! decision, flag and handoff logs for every submitted item.

pub mod store;
pub mod types;

pub use store::ContextStore;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Item already exists: {0}")]
    AlreadyExists(String),

    #[error("Internal lock error")]
    LockPoisoned,
}
