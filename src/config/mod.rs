//! Configuration module for Notion-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; omitted keys fall back to the public Notion and
//! Gemini endpoints and the default local paths.
//!
//! # Example
//!
//! ```no_run
//! use notion_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Enriching with model: {}", config.gemini.model);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, GeminiConfig, NotionConfig, PathsConfig, StorageConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, hash_config, load_config, load_config_with_hash, parse_config,
};
