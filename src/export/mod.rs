//! External export integration
//!
//! Loads page bodies from an unpacked Notion Markdown export into the node
//! registry. New notes and their id-bearing ancestor directories are inserted
//! without watermarks, so a later refresh pass fetches their metadata.

mod integrate;

pub use integrate::{extract_id, integrate, ExportIntegrator};
