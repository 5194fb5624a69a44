//! Dashboard API.
//!
//! Exposes the pipelines and the context store as JSON over HTTP. Routes are
//! nested under `/api/`; pipeline work runs on the blocking pool.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::{start_server_on, ApiServer, ServerSession};
pub use types::ApiContext;
