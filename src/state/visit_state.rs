/// Visit state definitions for tracking crawl progress
///
/// Each node visit starts in `FetchingMetadata` and ends in exactly one
/// terminal state. Only `ChangedOrNew` leads to descent into children.
use crate::state::watermark::{is_unchanged, Watermark};
use std::fmt;

/// Represents the state of a single node visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitState {
    // ===== Active States =====
    /// Metadata for the node is being fetched
    FetchingMetadata,

    // ===== Terminal States =====
    /// Stored watermark equals the fresh one - no write, no descent
    Unchanged,

    /// Node is new or its watermark moved - persist and descend
    ChangedOrNew,

    /// Already recorded under the same parent (resume-incomplete only)
    AlreadyRecorded,

    /// Metadata fetch failed - error recorded, placeholder persisted
    MetadataError,
}

impl VisitState {
    /// Classifies a successful metadata fetch against the stored watermark
    pub fn classify(stored: Option<&Watermark>, fresh: &Watermark) -> Self {
        if is_unchanged(stored, fresh) {
            Self::Unchanged
        } else {
            Self::ChangedOrNew
        }
    }

    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::FetchingMetadata)
    }

    /// Returns true if the visit continues into the node's children
    pub fn descends(&self) -> bool {
        matches!(self, Self::ChangedOrNew)
    }

    /// Returns true if the visit ended without touching the store
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Unchanged | Self::AlreadyRecorded)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::MetadataError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchingMetadata => "fetching_metadata",
            Self::Unchanged => "unchanged",
            Self::ChangedOrNew => "changed_or_new",
            Self::AlreadyRecorded => "already_recorded",
            Self::MetadataError => "metadata_error",
        }
    }
}

impl fmt::Display for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
