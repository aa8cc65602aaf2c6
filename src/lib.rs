//! Notion-Harvest: incremental Notion mirror with LLM enrichment
//!
//! This crate mirrors a Notion workspace tree (pages, databases and database
//! rows) into a local SQLite store, skipping subtrees whose last-edited
//! watermark has not moved, and then enriches each stored note with
//! structured answers produced by a Gemini model.

pub mod config;
pub mod crawler;
pub mod enrich;
pub mod export;
pub mod output;
pub mod state;
pub mod storage;
pub mod transport;

use thiserror::Error;

/// Main error type for Notion-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("ID {0} is neither a valid page nor database ID, or you lack access")]
    UnresolvedId(String),

    #[error("Question set version {0} not found; run sync-questions first")]
    QuestionSetNotFound(String),

    #[error("Gemini quota exhausted while processing {node_id}: {message}")]
    QuotaExhausted { node_id: String, message: String },

    #[error("Unexpected response from {url}: {message}")]
    Protocol { url: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns the HTTP status carried by this error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing credential: set {0} or provide it inline in the config")]
    MissingCredential(String),
}

/// Result type alias for Notion-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlMode, CrawlReport};
pub use state::{VisitState, Watermark};
pub use storage::{NodeRecord, SqliteStorage, Storage};
