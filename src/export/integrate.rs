//! Markdown export integration
//!
//! Notion's "Export as Markdown" produces a nested tree where every page
//! file and page directory name ends with the page id, e.g.
//! `Projects 1f2e3d4c5b6a79881f2e3d4c5b6a7988/Roadmap 0a1b...9f.md`.
//! This module loads those files as node content.

use crate::storage::{NodeUpsert, Storage};
use crate::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A bare 32-hex id or the dashed 8-4-4-4-12 form
const NOTION_ID_PATTERN: &str = r"^(?:[0-9a-fA-F]{32}|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})$";

/// Extension of exported page bodies
const CONTENT_EXTENSION: &str = "md";

/// Scans an export directory and writes its page bodies into the store
pub struct ExportIntegrator<'a, S: Storage + ?Sized> {
    storage: &'a mut S,
    root: PathBuf,
    id_pattern: Regex,
}

impl<'a, S: Storage + ?Sized> ExportIntegrator<'a, S> {
    pub fn new(storage: &'a mut S, root: &Path) -> Result<Self> {
        Ok(Self {
            storage,
            root: root.to_path_buf(),
            id_pattern: Regex::new(NOTION_ID_PATTERN)?,
        })
    }

    /// Walks the export tree and integrates every content file
    ///
    /// # Returns
    ///
    /// Number of notes inserted or backfilled
    pub fn run(&mut self) -> Result<usize> {
        let mut notes_added = 0;

        let files: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .map_or(false, |ext| ext.eq_ignore_ascii_case(CONTENT_EXTENSION))
            })
            .collect();

        for path in files {
            if self.integrate_file(&path)? {
                notes_added += 1;
            }
        }

        tracing::info!(
            "Integrated {} notes from {}",
            notes_added,
            self.root.display()
        );
        Ok(notes_added)
    }

    /// Integrates one file; returns true if the store changed
    ///
    /// A file that cannot be read as UTF-8 text is skipped with a warning.
    fn integrate_file(&mut self, path: &Path) -> Result<bool> {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let Some(id) = extract_id(&self.id_pattern, stem).map(str::to_string) else {
            tracing::debug!("Skipping {}: no trailing id", path.display());
            return Ok(false);
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                return Ok(false);
            }
        };
        let content = content.trim();
        if content.is_empty() {
            tracing::debug!("Skipping empty note {}", path.display());
            return Ok(false);
        }

        match self.storage.get_node(&id)? {
            Some(existing) if existing.has_content() => Ok(false),
            Some(_) => {
                self.storage.set_content(&id, content)?;
                tracing::debug!("Backfilled content for {}", id);
                Ok(true)
            }
            None => {
                let parent = match path.parent() {
                    Some(dir) => self.ensure_ancestor(dir)?,
                    None => None,
                };
                self.storage
                    .save_node(&NodeUpsert::new(&id, parent.as_deref()).with_content(content))?;
                tracing::debug!("Inserted note {} (parent: {:?})", id, parent);
                Ok(true)
            }
        }
    }

    /// Returns the id of the nearest id-bearing directory at or above `dir`
    ///
    /// Directories without an id are passed through. A matched directory not
    /// yet in the store is inserted with null watermarks after its own
    /// ancestor has been ensured.
    fn ensure_ancestor(&mut self, dir: &Path) -> Result<Option<String>> {
        if !dir.starts_with(&self.root) || dir == self.root {
            return Ok(None);
        }

        let name = dir.file_name().and_then(|s| s.to_str()).unwrap_or_default();
        let Some(id) = extract_id(&self.id_pattern, name).map(str::to_string) else {
            return match dir.parent() {
                Some(parent) => self.ensure_ancestor(parent),
                None => Ok(None),
            };
        };

        if self.storage.node_exists(&id)? {
            return Ok(Some(id));
        }

        let grandparent = match dir.parent() {
            Some(parent) => self.ensure_ancestor(parent)?,
            None => None,
        };
        self.storage
            .save_node(&NodeUpsert::new(&id, grandparent.as_deref()))?;
        tracing::debug!("Inserted export directory node {}", id);

        Ok(Some(id))
    }
}

/// Extracts the trailing id from a file stem or directory name
///
/// The id is the last space-separated word (or the whole name when there is
/// no space) and must match the id pattern in full.
pub fn extract_id<'n>(pattern: &Regex, name: &'n str) -> Option<&'n str> {
    let candidate = name.rsplit_once(' ').map_or(name, |(_, last)| last);
    pattern.is_match(candidate).then_some(candidate)
}

/// Integrates a Markdown export directory into the store
///
/// # Arguments
///
/// * `storage` - The node registry
/// * `directory` - Root of the unpacked export
///
/// # Returns
///
/// Number of notes inserted or backfilled
pub fn integrate<S: Storage + ?Sized>(storage: &mut S, directory: &Path) -> Result<usize> {
    ExportIntegrator::new(storage, directory)?.run()
}
