//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the traversal loop that ties discovery, change
//! detection and the store together, including:
//! - Resolving the crawl root (the only fatal failure)
//! - Applying the watermark skip (normal mode) or the recorded-child skip
//!   (resume-incomplete mode)
//! - Persisting each parent before its children are queued
//! - Recording per-node failures in the crawl error log and moving on

use crate::crawler::parser::ChildRef;
use crate::crawler::walker::{NodeKind, TreeWalker};
use crate::crawler::worklist::{TaskKind, VisitTask, WorkList};
use crate::state::{VisitState, Watermark, UNKNOWN_SENTINEL};
use crate::storage::{CrawlErrorRecord, NodeUpsert, Storage};
use crate::{HarvestError, Result};
use std::fmt;
use std::time::Instant;

/// Error message recorded for a collection the integration cannot open
pub const INACCESSIBLE_COLLECTION: &str = "Not accessible or cross-workspace DB";

/// Traversal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlMode {
    /// Skip any node whose stored watermark equals the remote one
    Normal,

    /// Skip children already recorded under the same parent, regardless of watermark
    ResumeIncomplete,
}

impl CrawlMode {
    pub fn from_resume_flag(resume_incomplete: bool) -> Self {
        if resume_incomplete {
            Self::ResumeIncomplete
        } else {
            Self::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ResumeIncomplete => "resume-incomplete",
        }
    }
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters for one traversal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Tasks popped from the work-list
    pub visited: u64,

    /// Node rows written with fresh watermarks
    pub saved: u64,

    /// Nodes skipped because their watermark did not move
    pub skipped_unchanged: u64,

    /// Children skipped because they were already recorded under this parent
    pub skipped_recorded: u64,

    /// Collections whose rows were listed
    pub collections: u64,

    /// Nodes left as placeholders because their metadata could not be fetched
    pub metadata_errors: u64,

    /// Entries appended to the crawl error log
    pub errors: u64,
}

impl CrawlReport {
    /// Counts a terminal visit state; a visit still in flight is ignored
    pub fn record(&mut self, state: VisitState) {
        if !state.is_terminal() {
            return;
        }
        if state.descends() {
            self.saved += 1;
        } else if state.is_error() {
            self.metadata_errors += 1;
        } else if state == VisitState::AlreadyRecorded {
            self.skipped_recorded += 1;
        } else if state.is_skipped() {
            self.skipped_unchanged += 1;
        }
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} visited, {} saved, {} unchanged, {} already recorded, {} collections, {} errors",
            self.visited,
            self.saved,
            self.skipped_unchanged,
            self.skipped_recorded,
            self.collections,
            self.errors
        )
    }
}

/// Main crawl coordinator structure
///
/// Owns the walker and borrows the store for the duration of a crawl. Every
/// store write commits on its own, so an interrupted crawl leaves a
/// parent-before-child prefix of the tree behind.
pub struct Coordinator<'a, S: Storage + ?Sized> {
    walker: TreeWalker,
    storage: &'a mut S,
    report: CrawlReport,
}

impl<'a, S: Storage + ?Sized> Coordinator<'a, S> {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `walker` - Discovery over the Notion API
    /// * `storage` - The node registry to write into
    pub fn new(walker: TreeWalker, storage: &'a mut S) -> Self {
        Self {
            walker,
            storage,
            report: CrawlReport::default(),
        }
    }

    /// Crawls the tree below `root_id`
    ///
    /// A page root is visited with no parent. A collection root is persisted
    /// and its rows are visited with the collection as parent.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Traversal finished; per-node failures are in the error log
    /// * `Err(HarvestError::UnresolvedId)` - The root is neither a page nor a collection
    pub async fn crawl(&mut self, root_id: &str, mode: CrawlMode) -> Result<CrawlReport> {
        tracing::info!("Resolving crawl root {} ({} mode)", root_id, mode);

        let mut worklist = WorkList::new();
        match self.walker.resolve(root_id).await {
            NodeKind::Page => worklist.push(VisitTask::node(root_id, None, mode)),
            NodeKind::Collection => worklist.push(VisitTask::collection(root_id, None, mode)),
            NodeKind::Unresolved => {
                tracing::error!("Root {} resolves to neither a page nor a database", root_id);
                return Err(HarvestError::UnresolvedId(root_id.to_string()));
            }
        }

        self.drain(&mut worklist).await
    }

    /// Visits every stored node that is missing a watermark
    ///
    /// Nodes are visited in normal mode under their stored parent. An id that
    /// no longer resolves is recorded like any other node failure.
    pub async fn refresh_missing(&mut self) -> Result<CrawlReport> {
        let missing = self.storage.nodes_missing_metadata()?;
        tracing::info!("Refreshing metadata for {} nodes", missing.len());

        let mut worklist = WorkList::new();
        worklist.push_children(
            missing
                .iter()
                .map(|n| VisitTask::node(&n.id, n.parent_id.as_deref(), CrawlMode::Normal))
                .collect::<Vec<_>>(),
        );

        self.drain(&mut worklist).await
    }

    /// Runs the traversal loop until the work-list is empty
    async fn drain(&mut self, worklist: &mut WorkList) -> Result<CrawlReport> {
        self.report = CrawlReport::default();
        let start_time = Instant::now();

        while let Some(task) = worklist.pop() {
            match task.kind {
                TaskKind::Node => {
                    let state = self.visit_node(&task, worklist).await?;
                    tracing::debug!("Visited {}: {}", task.node_id, state);
                    self.report.record(state);
                }
                TaskKind::Collection => self.visit_collection(&task, worklist).await?,
            }

            self.report.visited += 1;

            // Progress reporting every 10 nodes
            if self.report.visited % 10 == 0 {
                let rate = self.report.visited as f64 / start_time.elapsed().as_secs_f64();
                tracing::info!(
                    "Progress: {} nodes visited, {} pending, {:.2} nodes/sec",
                    self.report.visited,
                    worklist.len(),
                    rate
                );
            }
        }

        tracing::info!(
            "Crawl completed in {:?}: {} (peak work-list {})",
            start_time.elapsed(),
            self.report,
            worklist.high_water()
        );

        Ok(self.report.clone())
    }

    /// Visits a page or collection row and returns the state it ended in
    async fn visit_node(&mut self, task: &VisitTask, worklist: &mut WorkList) -> Result<VisitState> {
        let id = task.node_id.as_str();
        let parent = task.parent_id.as_deref();

        if task.mode == CrawlMode::ResumeIncomplete {
            if let Some(parent_id) = parent {
                let recorded = self
                    .storage
                    .get_node(id)?
                    .map_or(false, |n| n.parent_id.as_deref() == Some(parent_id));
                if recorded {
                    tracing::debug!("{} already recorded under {}. Skipping.", id, parent_id);
                    return Ok(VisitState::AlreadyRecorded);
                }
            }
        }

        tracing::trace!("{}: {}", id, VisitState::FetchingMetadata);
        let meta = match self.walker.fetch_metadata(id).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Error fetching metadata for {}: {}", id, e);
                self.log_error(CrawlErrorRecord::new(id, parent, e.to_string()))?;
                self.storage.save_node(&NodeUpsert::placeholder(id, parent))?;
                return Ok(VisitState::MetadataError);
            }
        };

        let state = match task.mode {
            CrawlMode::Normal => {
                let stored = self.storage.get_node(id)?.and_then(|n| n.modified_at);
                VisitState::classify(stored.as_ref(), &meta.modified_at)
            }
            CrawlMode::ResumeIncomplete => VisitState::ChangedOrNew,
        };
        if !state.descends() {
            tracing::debug!("{} unchanged since last crawl. Skipping descendants.", id);
            return Ok(state);
        }

        self.storage.save_node(
            &NodeUpsert::new(id, parent)
                .with_watermarks(meta.created_at.clone(), meta.modified_at.clone()),
        )?;
        tracing::info!("Saved {} (parent: {})", id, parent.unwrap_or("none"));

        if meta.kind == NodeKind::Collection {
            self.expand_collection(id, parent, task.mode, worklist).await?;
            return Ok(state);
        }

        match self.walker.list_children(id).await {
            Ok((sub_pages, sub_collections)) => {
                worklist.push_children(child_tasks(id, task.mode, &sub_pages, &sub_collections));
            }
            Err(e) => {
                tracing::warn!("Error listing children of {}: {}", id, e);
                self.log_error(CrawlErrorRecord::new(
                    id,
                    parent,
                    format!("Failed to list children: {}", e),
                ))?;
                // Forget the watermark so the next normal run revisits this subtree
                self.storage.save_node(
                    &NodeUpsert::new(id, parent).with_watermarks(meta.created_at, Watermark::Unknown),
                )?;
            }
        }

        Ok(state)
    }

    /// Visits a collection discovered as a child (or given as the root)
    async fn visit_collection(&mut self, task: &VisitTask, worklist: &mut WorkList) -> Result<()> {
        let id = task.node_id.as_str();
        let parent = task.parent_id.as_deref();
        tracing::info!("Entering collection {} (parent: {})", id, parent.unwrap_or("none"));

        let meta = match self.walker.probe_collection(id).await {
            Some(meta) => meta,
            None => {
                tracing::warn!(
                    "{} is not a valid or accessible database. Skipping.",
                    id
                );
                let (title, first_row) = self.collection_head(id).await;
                self.storage.save_node(&NodeUpsert::placeholder(id, parent))?;
                self.log_error(
                    CrawlErrorRecord::new(id, parent, INACCESSIBLE_COLLECTION)
                        .with_head(title, first_row),
                )?;
                return Ok(());
            }
        };

        self.storage.save_node(
            &NodeUpsert::new(id, parent).with_watermarks(meta.created_at, meta.modified_at),
        )?;
        self.report.saved += 1;

        self.expand_collection(id, parent, task.mode, worklist).await
    }

    /// Lists a persisted collection's rows and queues them
    async fn expand_collection(
        &mut self,
        id: &str,
        parent: Option<&str>,
        mode: CrawlMode,
        worklist: &mut WorkList,
    ) -> Result<()> {
        match self.walker.list_collection_rows(id).await {
            Ok(rows) => {
                self.report.collections += 1;
                worklist.push_children(
                    rows.iter()
                        .map(|row| VisitTask::node(row, Some(id), mode))
                        .collect::<Vec<_>>(),
                );
            }
            Err(e) => {
                tracing::warn!("Error querying database {}: {}. Skipping.", id, e);
                let (title, first_row) = self.collection_head(id).await;
                self.storage.save_node(&NodeUpsert::placeholder(id, parent))?;
                self.log_error(
                    CrawlErrorRecord::new(id, parent, e.to_string()).with_head(title, first_row),
                )?;
            }
        }
        Ok(())
    }

    /// Best-effort title and first row of a collection, `NA` on any failure
    async fn collection_head(&self, id: &str) -> (String, String) {
        let title = self
            .walker
            .collection_title(id)
            .await
            .unwrap_or_else(|_| UNKNOWN_SENTINEL.to_string());

        let first_row = match self.walker.first_collection_row(id).await {
            Ok(Some(row)) => row.to_string(),
            Ok(None) | Err(_) => UNKNOWN_SENTINEL.to_string(),
        };

        (title, first_row)
    }

    fn log_error(&mut self, error: CrawlErrorRecord) -> Result<()> {
        self.storage.record_crawl_error(&error)?;
        self.report.errors += 1;
        Ok(())
    }
}

/// Builds the child tasks of a page: sub-pages first, then sub-collections
fn child_tasks(
    parent_id: &str,
    mode: CrawlMode,
    sub_pages: &[ChildRef],
    sub_collections: &[ChildRef],
) -> Vec<VisitTask> {
    sub_pages
        .iter()
        .map(|child| VisitTask::node(&child.id, Some(parent_id), mode))
        .chain(
            sub_collections
                .iter()
                .map(|child| VisitTask::collection(&child.id, Some(parent_id), mode)),
        )
        .collect()
}
