//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{Watermark, UNKNOWN_SENTINEL};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{CrawlErrorRecord, EnrichmentRow, NodeRecord, NodeUpsert, QuestionSetRecord};
use crate::HarvestError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::path::Path;

const NODE_COLUMNS: &str =
    "id, parent_id, created_time, last_edited_time, content, content_length";

/// Whitespace set passed to SQLite TRIM, which strips only spaces by default
const BLANK_CHARS: &str = "' ' || char(9) || char(10) || char(13)";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_nodes(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> StorageResult<Vec<NodeRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let nodes = stmt
            .query_map(args, node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    fn count(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, args, |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<NodeRecord> {
    let created: Option<String> = row.get(2)?;
    let modified: Option<String> = row.get(3)?;
    let content_length: i64 = row.get(5)?;

    Ok(NodeRecord {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        created_at: created.as_deref().map(Watermark::from_db_string),
        modified_at: modified.as_deref().map(Watermark::from_db_string),
        content: row.get(4)?,
        content_length: content_length.max(0) as u64,
    })
}

fn char_len(content: &str) -> i64 {
    content.chars().count() as i64
}

impl Storage for SqliteStorage {
    // ===== Node Registry =====

    fn save_node(&mut self, node: &NodeUpsert) -> StorageResult<()> {
        let content_length = node.content.as_deref().map_or(0, char_len);

        self.conn.execute(
            "INSERT INTO pages (id, parent_id, created_time, last_edited_time, content, content_length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 parent_id = excluded.parent_id,
                 created_time = excluded.created_time,
                 last_edited_time = excluded.last_edited_time,
                 content = COALESCE(excluded.content, pages.content),
                 content_length = CASE
                     WHEN excluded.content IS NULL THEN pages.content_length
                     ELSE excluded.content_length
                 END",
            params![
                node.id,
                node.parent_id,
                node.created_at.as_ref().map(|w| w.to_db_string()),
                node.modified_at.as_ref().map(|w| w.to_db_string()),
                node.content,
                content_length,
            ],
        )?;
        Ok(())
    }

    fn get_node(&self, id: &str) -> StorageResult<Option<NodeRecord>> {
        let node = self
            .conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE id = ?1", NODE_COLUMNS),
                params![id],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    fn node_exists(&self, id: &str) -> StorageResult<bool> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM pages WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(exists.is_some())
    }

    fn set_content(&mut self, id: &str, content: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE pages SET content = ?2, content_length = ?3 WHERE id = ?1",
            params![id, content, char_len(content)],
        )?;
        if updated == 0 {
            return Err(StorageError::NodeNotFound(id.to_string()));
        }
        Ok(())
    }

    fn nodes_missing_metadata(&self) -> StorageResult<Vec<NodeRecord>> {
        self.query_nodes(
            &format!(
                "SELECT {} FROM pages
                 WHERE created_time IS NULL OR last_edited_time IS NULL
                 ORDER BY rowid",
                NODE_COLUMNS
            ),
            &[],
        )
    }

    fn enrichment_candidates(&self) -> StorageResult<Vec<NodeRecord>> {
        self.query_nodes(
            &format!(
                "SELECT {} FROM pages
                 WHERE content IS NOT NULL AND TRIM(content, {}) != ''
                 ORDER BY content_length DESC, id",
                NODE_COLUMNS, BLANK_CHARS
            ),
            &[],
        )
    }

    // ===== Crawl Error Log =====

    fn record_crawl_error(&mut self, error: &CrawlErrorRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO crawl_errors (id, parent_id, error_message, head_title, head_content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                error.id,
                error.parent_id,
                error.error_message,
                error.head_title,
                error.head_content
            ],
        )?;
        Ok(())
    }

    fn crawl_errors_for(&self, id: &str) -> StorageResult<Vec<CrawlErrorRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, parent_id, error_message, head_title, head_content
             FROM crawl_errors WHERE id = ?1 ORDER BY rowid",
        )?;

        let errors = stmt
            .query_map(params![id], |row| {
                Ok(CrawlErrorRecord {
                    id: row.get(0)?,
                    parent_id: row.get(1)?,
                    error_message: row.get(2)?,
                    head_title: row.get(3)?,
                    head_content: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(errors)
    }

    // ===== Question Sets =====

    fn insert_question_set(
        &mut self,
        record: &QuestionSetRecord,
        force: bool,
    ) -> StorageResult<bool> {
        let sql = if force {
            "INSERT OR REPLACE INTO questions (version, date_updated, questions_json) VALUES (?1, ?2, ?3)"
        } else {
            "INSERT OR IGNORE INTO questions (version, date_updated, questions_json) VALUES (?1, ?2, ?3)"
        };
        let written = self.conn.execute(
            sql,
            params![record.version, record.date_updated, record.questions_json],
        )?;
        Ok(written > 0)
    }

    fn get_question_set(&self, version: &str) -> StorageResult<Option<QuestionSetRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT version, date_updated, questions_json FROM questions WHERE version = ?1",
                params![version],
                |row| {
                    Ok(QuestionSetRecord {
                        version: row.get(0)?,
                        date_updated: row.get(1)?,
                        questions_json: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn latest_question_version(&self) -> StorageResult<Option<String>> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM questions
                 ORDER BY CAST(version AS REAL) DESC, version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    fn list_question_versions(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT version FROM questions ORDER BY CAST(version AS REAL), version")?;
        let versions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(versions)
    }

    // ===== Enrichment Results =====

    fn upsert_enrichment(&mut self, row: &EnrichmentRow) -> StorageResult<()> {
        let answers_json = serde_json::to_string(&row.answers)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.conn.execute(
            "INSERT OR REPLACE INTO gemini_analysis
             (note_id, questions_version, model, date_executed, answers_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.note_id,
                row.questions_version,
                row.model,
                row.date_executed,
                answers_json
            ],
        )?;
        Ok(())
    }

    fn has_enrichment(
        &self,
        note_id: &str,
        questions_version: &str,
        model: &str,
    ) -> StorageResult<bool> {
        let count = self.count(
            "SELECT COUNT(*) FROM gemini_analysis
             WHERE note_id = ?1 AND questions_version = ?2 AND model = ?3",
            &[&note_id, &questions_version, &model],
        )?;
        Ok(count > 0)
    }

    fn enrichments_for(&self, note_id: &str) -> StorageResult<Vec<EnrichmentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT note_id, questions_version, model, date_executed, answers_json
             FROM gemini_analysis WHERE note_id = ?1
             ORDER BY questions_version, model",
        )?;

        let raw = stmt
            .query_map(params![note_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(note_id, questions_version, model, date_executed, answers_json)| {
                let answers: Map<String, Value> = serde_json::from_str(&answers_json)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(EnrichmentRow {
                    note_id,
                    questions_version,
                    model,
                    date_executed,
                    answers,
                })
            })
            .collect()
    }

    // ===== Statistics =====

    fn count_nodes(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM pages", &[])
    }

    fn count_nodes_with_content(&self) -> StorageResult<u64> {
        self.count(
            &format!(
                "SELECT COUNT(*) FROM pages WHERE content IS NOT NULL AND TRIM(content, {}) != ''",
                BLANK_CHARS
            ),
            &[],
        )
    }

    fn count_unknown_watermarks(&self) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM pages WHERE created_time = ?1 OR last_edited_time = ?1",
            &[&UNKNOWN_SENTINEL],
        )
    }

    fn count_crawl_errors(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM crawl_errors", &[])
    }

    fn enrichment_breakdown(&self) -> StorageResult<Vec<(String, String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT questions_version, model, COUNT(*)
             FROM gemini_analysis
             GROUP BY questions_version, model
             ORDER BY questions_version, model",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? as u64,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
