//! Crawler module for mirroring the Notion tree
//!
//! This module contains the core crawling logic, including:
//! - Notion response parsing (children, collection rows, metadata)
//! - Paginated discovery over the rate-limited transport
//! - The explicit depth-first work-list
//! - Overall crawl coordination

mod coordinator;
mod parser;
mod walker;
mod worklist;

pub use coordinator::{Coordinator, CrawlMode, CrawlReport, INACCESSIBLE_COLLECTION};
pub use parser::{
    parse_children_page, parse_collection_title, parse_metadata, parse_rows_page, ChildRef,
    ChildrenPage, RowsPage, NO_TITLE,
};
pub use walker::{NodeKind, NodeMetadata, TreeWalker};
pub use worklist::{TaskKind, VisitTask, WorkList};

use crate::config::NotionConfig;
use crate::storage::Storage;
use crate::transport::build_notion_client;
use crate::Result;

/// Builds a tree walker from the Notion configuration
pub fn build_walker(config: &NotionConfig) -> Result<TreeWalker> {
    let client = build_notion_client(config)?;
    Ok(TreeWalker::new(client, config.page_size))
}

/// Runs a complete crawl operation
///
/// # Arguments
///
/// * `config` - The Notion configuration
/// * `storage` - The store to mirror into
/// * `root_id` - Page or database id to start from
/// * `mode` - Normal incremental or resume-incomplete
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl finished (node-level failures are logged, not returned)
/// * `Err(HarvestError)` - The root did not resolve, or the store failed
///
/// # Example
///
/// ```no_run
/// use notion_harvest::config::load_config;
/// use notion_harvest::crawler::{run_crawl, CrawlMode};
/// use notion_harvest::storage::SqliteStorage;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let mut storage = SqliteStorage::new(Path::new(&config.storage.database_path))?;
/// let report = run_crawl(&config.notion, &mut storage, "1f2e...", CrawlMode::Normal).await?;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl<S: Storage + ?Sized>(
    config: &NotionConfig,
    storage: &mut S,
    root_id: &str,
    mode: CrawlMode,
) -> Result<CrawlReport> {
    let walker = build_walker(config)?;
    Coordinator::new(walker, storage).crawl(root_id, mode).await
}

/// Fetches watermarks for every stored node that lacks them
pub async fn run_refresh<S: Storage + ?Sized>(
    config: &NotionConfig,
    storage: &mut S,
) -> Result<CrawlReport> {
    let walker = build_walker(config)?;
    Coordinator::new(walker, storage).refresh_missing().await
}
