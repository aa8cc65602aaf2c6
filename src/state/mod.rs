//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `VisitState`: Tracks the outcome of a single node visit (unchanged, changed, error, ...)
//! - `Watermark`: A remote modification timestamp or the unknown sentinel
//! - `is_unchanged`: The change detector deciding whether re-descent can be skipped

mod visit_state;
mod watermark;

// Re-export main types
pub use visit_state::VisitState;
pub use watermark::{is_unchanged, parse_timestamp, Watermark, UNKNOWN_SENTINEL};
