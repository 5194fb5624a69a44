//! Response parsing: labelled sections, lenient JSON and keyword heuristics.
//!
//! Nothing here returns an error. Malformed responses degrade to defaults.

pub mod json;
pub mod keywords;
pub mod labeled;

pub use keywords::{
    has_concerns, Completeness, CompletenessClassifier, KeywordCompletenessClassifier,
};
pub use labeled::{render_sections, truncate_chars, LabeledSections, RAW_TEXT_LIMIT};
