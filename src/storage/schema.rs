//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Notion-Harvest database.
//! Table and column names match the ones read by the local notes viewer, so an
//! existing `notion_pages.db` opens without migration.

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Mirrored nodes (pages, databases and database rows)
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    parent_id TEXT,
    created_time TEXT,
    last_edited_time TEXT,
    content TEXT,
    content_length INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id);
CREATE INDEX IF NOT EXISTS idx_pages_content_length ON pages(content_length);

-- Append-only log of per-node crawl failures
CREATE TABLE IF NOT EXISTS crawl_errors (
    id TEXT NOT NULL,
    parent_id TEXT,
    error_message TEXT NOT NULL,
    head_title TEXT NOT NULL DEFAULT 'NA',
    head_content TEXT NOT NULL DEFAULT 'NA'
);

CREATE INDEX IF NOT EXISTS idx_crawl_errors_id ON crawl_errors(id);

-- Versioned enrichment question sets
CREATE TABLE IF NOT EXISTS questions (
    version TEXT PRIMARY KEY,
    date_updated TEXT NOT NULL,
    questions_json TEXT NOT NULL
);

-- Enrichment answers, one row per (note, question set, model)
CREATE TABLE IF NOT EXISTS gemini_analysis (
    note_id TEXT NOT NULL,
    questions_version TEXT NOT NULL,
    model TEXT NOT NULL,
    date_executed TEXT NOT NULL,
    answers_json TEXT NOT NULL,
    PRIMARY KEY (note_id, questions_version, model)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Reads the schema version recorded in the database
pub fn get_schema_version(conn: &rusqlite::Connection) -> Result<u32, rusqlite::Error> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}
