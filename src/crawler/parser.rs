//! Notion response parser
//!
//! This module decodes the JSON bodies returned by the Notion API into the
//! small set of fields the crawler needs:
//! - Child blocks classified as sub-pages or sub-collections
//! - Collection query results filtered to page rows
//! - Node watermarks
//! - Collection titles (for crawl error diagnostics)

use serde::Deserialize;
use serde_json::Value;

/// Title shown when a collection has no plain-text title
pub const NO_TITLE: &str = "(No title found)";

/// A discovered child with its display title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub id: String,
    pub title: String,
}

/// One page of `GET /blocks/{id}/children`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenPage {
    pub sub_pages: Vec<ChildRef>,
    pub sub_collections: Vec<ChildRef>,
    pub next_cursor: Option<String>,
}

/// One page of `POST /databases/{id}/query`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowsPage {
    pub row_ids: Vec<String>,
    pub next_cursor: Option<String>,
}

/// Watermarks as returned by the page or database endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawMetadata {
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub last_edited_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockList {
    #[serde(default)]
    results: Vec<Block>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Block {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    child_page: Option<TitleHolder>,
    #[serde(default)]
    child_database: Option<TitleHolder>,
}

#[derive(Debug, Deserialize)]
struct TitleHolder {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct QueryResults {
    #[serde(default)]
    results: Vec<QueryRow>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    #[serde(default)]
    object: String,
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct DatabaseTitle {
    #[serde(default)]
    title: Vec<RichText>,
}

#[derive(Debug, Deserialize)]
struct RichText {
    #[serde(default)]
    plain_text: String,
}

/// Parses one page of child blocks
///
/// Blocks other than `child_page` and `child_database` are ignored.
///
/// # Example
///
/// ```
/// use notion_harvest::crawler::parse_children_page;
/// use serde_json::json;
///
/// let body = json!({
///     "results": [
///         {"id": "p1", "type": "child_page", "child_page": {"title": "Notes"}},
///         {"id": "b1", "type": "paragraph", "paragraph": {}},
///         {"id": "d1", "type": "child_database", "child_database": {"title": "Tasks"}}
///     ],
///     "next_cursor": null,
///     "has_more": false
/// });
///
/// let page = parse_children_page(&body).unwrap();
/// assert_eq!(page.sub_pages[0].title, "Notes");
/// assert_eq!(page.sub_collections[0].id, "d1");
/// assert!(page.next_cursor.is_none());
/// ```
pub fn parse_children_page(body: &Value) -> Result<ChildrenPage, serde_json::Error> {
    let list = BlockList::deserialize(body)?;
    let mut page = ChildrenPage {
        next_cursor: list.next_cursor.filter(|c| !c.is_empty()),
        ..ChildrenPage::default()
    };

    for block in list.results {
        match block.kind.as_str() {
            "child_page" => page.sub_pages.push(ChildRef {
                title: block.child_page.map(|t| t.title).unwrap_or_default(),
                id: block.id,
            }),
            "child_database" => page.sub_collections.push(ChildRef {
                title: block.child_database.map(|t| t.title).unwrap_or_default(),
                id: block.id,
            }),
            _ => {}
        }
    }

    Ok(page)
}

/// Parses one page of collection query results, keeping only page rows
pub fn parse_rows_page(body: &Value) -> Result<RowsPage, serde_json::Error> {
    let results = QueryResults::deserialize(body)?;
    Ok(RowsPage {
        row_ids: results
            .results
            .into_iter()
            .filter(|row| row.object == "page" && !row.id.is_empty())
            .map(|row| row.id)
            .collect(),
        next_cursor: results.next_cursor.filter(|c| !c.is_empty()),
    })
}

/// Parses the watermark pair from a page or database object
pub fn parse_metadata(body: &Value) -> Result<RawMetadata, serde_json::Error> {
    RawMetadata::deserialize(body)
}

/// Joins a database object's title fragments
///
/// Returns `NO_TITLE` when the title is empty or missing.
pub fn parse_collection_title(body: &Value) -> String {
    let title = DatabaseTitle::deserialize(body)
        .map(|db| {
            db.title
                .into_iter()
                .map(|t| t.plain_text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if title.is_empty() {
        NO_TITLE.to_string()
    } else {
        title
    }
}

/// Returns the first row object of a query result, if any
pub fn first_result(body: &Value) -> Option<Value> {
    body.get("results")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .cloned()
}
