//! API endpoint handlers.
//!
//! One module per resource. Handlers are thin: decode, run the app entry
//! point on the blocking pool, encode.

pub mod emergency;
pub mod health;
pub mod items;
pub mod permits;
pub mod screening;
pub mod tutor;
