//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{
    CrawlErrorRecord, EnrichmentRow, NodeRecord, NodeUpsert, QuestionSetRecord,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every write commits on its own; there is no transaction spanning a node
/// and its children.
pub trait Storage {
    // ===== Node Registry =====

    /// Inserts or updates a node keyed by id
    ///
    /// Watermarks and parent are overwritten. Content is preserve-on-null:
    /// `None` keeps whatever content is stored, `Some` replaces it and
    /// recomputes `content_length`.
    ///
    /// # Arguments
    ///
    /// * `node` - The node fields to write
    fn save_node(&mut self, node: &NodeUpsert) -> StorageResult<()>;

    /// Gets a node by id
    fn get_node(&self, id: &str) -> StorageResult<Option<NodeRecord>>;

    /// Returns true if a node row exists for `id`
    fn node_exists(&self, id: &str) -> StorageResult<bool>;

    /// Replaces the content of an existing node, leaving watermarks alone
    ///
    /// # Returns
    ///
    /// `StorageError::NodeNotFound` if no row exists for `id`
    fn set_content(&mut self, id: &str, content: &str) -> StorageResult<()>;

    /// Gets nodes whose created or modified watermark is null
    fn nodes_missing_metadata(&self) -> StorageResult<Vec<NodeRecord>>;

    /// Gets nodes with non-blank content, longest content first
    fn enrichment_candidates(&self) -> StorageResult<Vec<NodeRecord>>;

    // ===== Crawl Error Log =====

    /// Appends a crawl error; never replaces earlier entries
    fn record_crawl_error(&mut self, error: &CrawlErrorRecord) -> StorageResult<()>;

    /// Gets every recorded error for one node, oldest first
    fn crawl_errors_for(&self, id: &str) -> StorageResult<Vec<CrawlErrorRecord>>;

    // ===== Question Sets =====

    /// Inserts a question set
    ///
    /// # Arguments
    ///
    /// * `record` - The question set to store
    /// * `force` - Replace an existing row with the same version
    ///
    /// # Returns
    ///
    /// `true` if the row was written, `false` if the version existed and
    /// `force` was not set
    fn insert_question_set(&mut self, record: &QuestionSetRecord, force: bool)
        -> StorageResult<bool>;

    /// Gets a question set by version
    fn get_question_set(&self, version: &str) -> StorageResult<Option<QuestionSetRecord>>;

    /// Gets the numerically highest stored version
    fn latest_question_version(&self) -> StorageResult<Option<String>>;

    /// Lists stored versions in numeric order
    fn list_question_versions(&self) -> StorageResult<Vec<String>>;

    // ===== Enrichment Results =====

    /// Inserts or replaces the result for `(note_id, questions_version, model)`
    fn upsert_enrichment(&mut self, row: &EnrichmentRow) -> StorageResult<()>;

    /// Returns true if a result exists for the exact key
    fn has_enrichment(&self, note_id: &str, questions_version: &str, model: &str)
        -> StorageResult<bool>;

    /// Gets every stored result for one note
    fn enrichments_for(&self, note_id: &str) -> StorageResult<Vec<EnrichmentRow>>;

    // ===== Statistics =====

    /// Gets total node count
    fn count_nodes(&self) -> StorageResult<u64>;

    /// Counts nodes with non-blank content
    fn count_nodes_with_content(&self) -> StorageResult<u64>;

    /// Counts nodes carrying the unknown watermark sentinel
    fn count_unknown_watermarks(&self) -> StorageResult<u64>;

    /// Counts crawl error log entries
    fn count_crawl_errors(&self) -> StorageResult<u64>;

    /// Gets enrichment row counts grouped by `(questions_version, model)`
    fn enrichment_breakdown(&self) -> StorageResult<Vec<(String, String, u64)>>;
}
