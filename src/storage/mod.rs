//! Storage module for persisting harvest data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - The node registry (upsert by id, preserve-on-null content)
//! - The append-only crawl error log
//! - Versioned question sets and enrichment results

mod schema;
mod sqlite;
mod traits;

pub use schema::{get_schema_version, SCHEMA_VERSION};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{Watermark, UNKNOWN_SENTINEL};
use crate::HarvestError;
use serde_json::{Map, Value};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// A node as stored in the registry
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub created_at: Option<Watermark>,
    pub modified_at: Option<Watermark>,
    pub content: Option<String>,
    /// Character count of `content`, 0 when there is none
    pub content_length: u64,
}

impl NodeRecord {
    /// Returns true if the node carries non-whitespace content
    pub fn has_content(&self) -> bool {
        self.content
            .as_deref()
            .map_or(false, |c| !c.trim().is_empty())
    }
}

/// Fields written by `Storage::save_node`
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpsert {
    pub id: String,
    pub parent_id: Option<String>,
    pub created_at: Option<Watermark>,
    pub modified_at: Option<Watermark>,
    /// `None` leaves stored content untouched
    pub content: Option<String>,
}

impl NodeUpsert {
    /// A node with no watermarks and no content
    pub fn new(id: &str, parent_id: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            created_at: None,
            modified_at: None,
            content: None,
        }
    }

    /// A node whose metadata could not be fetched
    pub fn placeholder(id: &str, parent_id: Option<&str>) -> Self {
        Self::new(id, parent_id).with_watermarks(Watermark::Unknown, Watermark::Unknown)
    }

    pub fn with_watermarks(mut self, created_at: Watermark, modified_at: Watermark) -> Self {
        self.created_at = Some(created_at);
        self.modified_at = Some(modified_at);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// One entry of the crawl error log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlErrorRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub error_message: String,
    /// Best-effort title snapshot, `NA` when unavailable
    pub head_title: String,
    /// Best-effort content snapshot, `NA` when unavailable
    pub head_content: String,
}

impl CrawlErrorRecord {
    pub fn new(id: &str, parent_id: Option<&str>, error_message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            error_message: error_message.into(),
            head_title: UNKNOWN_SENTINEL.to_string(),
            head_content: UNKNOWN_SENTINEL.to_string(),
        }
    }

    /// Attaches diagnostic snapshots of the failing node
    pub fn with_head(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.head_title = title.into();
        self.head_content = content.into();
        self
    }
}

/// A stored question set; the payload is kept as serialized JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSetRecord {
    pub version: String,
    pub date_updated: String,
    pub questions_json: String,
}

/// A stored enrichment result
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRow {
    pub note_id: String,
    pub questions_version: String,
    pub model: String,
    pub date_executed: String,
    /// Question tag to answer
    pub answers: Map<String, Value>,
}
