//! Statistics over the local store
//!
//! This module extracts and displays a summary of what the store holds:
//! mirrored nodes, crawl errors, question sets and enrichment results.

use crate::storage::Storage;
use crate::Result;

/// Store statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Total number of nodes in the registry
    pub total_nodes: u64,

    /// Nodes with a non-blank body
    pub nodes_with_content: u64,

    /// Nodes whose metadata fetch failed (`NA` watermark)
    pub unknown_watermarks: u64,

    /// Rows in the crawl error log
    pub crawl_errors: u64,

    /// Stored question set versions, oldest first
    pub question_versions: Vec<String>,

    /// Enrichment rows per (questions version, model)
    pub enrichments: Vec<(String, String, u64)>,
}

impl StoreStatistics {
    /// Total enrichment rows across all versions and models
    pub fn total_enrichments(&self) -> u64 {
        self.enrichments.iter().map(|(_, _, count)| count).sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<StoreStatistics> {
    Ok(StoreStatistics {
        total_nodes: storage.count_nodes()?,
        nodes_with_content: storage.count_nodes_with_content()?,
        unknown_watermarks: storage.count_unknown_watermarks()?,
        crawl_errors: storage.count_crawl_errors()?,
        question_versions: storage.list_question_versions()?,
        enrichments: storage.enrichment_breakdown()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Store Statistics ===\n");

    println!("Nodes:");
    println!("  Total nodes: {}", stats.total_nodes);
    let percentage = if stats.total_nodes > 0 {
        (stats.nodes_with_content as f64 / stats.total_nodes as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "  With content: {} ({:.1}%)",
        stats.nodes_with_content, percentage
    );
    println!("  Unknown watermarks: {}", stats.unknown_watermarks);
    println!("  Crawl errors logged: {}", stats.crawl_errors);
    println!();

    if stats.question_versions.is_empty() {
        println!("Question sets: none (run sync-questions)");
    } else {
        println!("Question sets: {}", stats.question_versions.join(", "));
    }
    println!();

    println!("Enrichment results: {}", stats.total_enrichments());
    for (version, model, count) in &stats.enrichments {
        println!("  {} / {}: {}", version, model, count);
    }
}
