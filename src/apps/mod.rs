//! Applications built on the staged pipeline.
//!
//! Each app owns its item type, its stages and an entry point taking
//! `&CoreState`. Item ids follow `<PREFIX>-<SLUG>-<32 hex>`.

pub mod emergency;
pub mod permit;
pub mod screening;
pub mod teacher;
pub mod tutor;

use uuid::Uuid;

const SLUG_LEN: usize = 8;

/// `<prefix>-<slug>-<v4 uuid, simple form>`.
pub fn short_id(prefix: &str, slug: &str) -> String {
    format!("{prefix}-{slug}-{}", Uuid::new_v4().simple())
}

/// Upper-case alphanumerics of `text`, at most eight. `UNKNOWN` when none.
pub fn slug(text: &str) -> String {
    let slug: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(SLUG_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if slug.is_empty() {
        "UNKNOWN".to_string()
    } else {
        slug
    }
}
