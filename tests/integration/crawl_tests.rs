//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the Notion API and run the full
//! crawl cycle end-to-end against an in-memory store.

use notion_harvest::config::NotionConfig;
use notion_harvest::crawler::{
    build_walker, run_crawl, run_refresh, CrawlMode, NodeKind, INACCESSIBLE_COLLECTION,
};
use notion_harvest::state::Watermark;
use notion_harvest::storage::{NodeUpsert, SqliteStorage, Storage};
use notion_harvest::HarvestError;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CREATED: &str = "2024-01-01T09:00:00.000Z";
const EDITED: &str = "2024-02-01T09:00:00.000Z";
const REEDITED: &str = "2024-03-15T17:30:00.000Z";

/// Creates a Notion configuration pointed at the mock server
fn create_test_config(base_url: &str) -> NotionConfig {
    NotionConfig {
        api_url: base_url.to_string(),
        token: Some("secret_test".to_string()),
        page_size: 100,
        default_retry_after: 0,
        ..NotionConfig::default()
    }
}

fn metadata(object: &str, id: &str) -> Value {
    json!({
        "object": object,
        "id": id,
        "created_time": CREATED,
        "last_edited_time": EDITED,
    })
}

fn children(pages: &[&str], databases: &[&str]) -> Value {
    children_page(pages, databases, None)
}

/// One page of a child listing, continued at `next_cursor` when given
fn children_page(pages: &[&str], databases: &[&str], next_cursor: Option<&str>) -> Value {
    let mut results: Vec<Value> = pages
        .iter()
        .map(|id| json!({"object": "block", "id": id, "type": "child_page", "child_page": {"title": id}}))
        .collect();
    results.extend(databases.iter().map(|id| {
        json!({"object": "block", "id": id, "type": "child_database", "child_database": {"title": id}})
    }));
    json!({
        "object": "list",
        "results": results,
        "next_cursor": next_cursor,
        "has_more": next_cursor.is_some()
    })
}

fn rows_page(rows: &[&str], next_cursor: Option<&str>) -> Value {
    json!({
        "object": "list",
        "results": rows.iter().map(|id| json!({"object": "page", "id": id})).collect::<Vec<_>>(),
        "next_cursor": next_cursor,
        "has_more": next_cursor.is_some()
    })
}

async fn mount_page(server: &MockServer, id: &str, kids: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/pages/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata("page", id)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/blocks/{}/children", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(kids))
        .mount(server)
        .await;
}

/// Mounts `root` with one sub-page and one database holding one row
async fn mount_small_tree(server: &MockServer) {
    mount_page(server, "root", children(&["page-a"], &["db-1"])).await;
    mount_page(server, "page-a", children(&[], &[])).await;
    mount_page(server, "row-1", children(&[], &[])).await;

    Mock::given(method("GET"))
        .and(path("/databases/db-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata("database", "db-1")))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows_page(&["row-1"], None)))
        .mount(server)
        .await;
}

/// Mounts `root` and `page-a` with both watermarks at `edited`
async fn mount_edited_pages(server: &MockServer, edited: &str) {
    for (id, kids) in [
        ("root", children(&["page-a"], &[])),
        ("page-a", children(&[], &[])),
    ] {
        let mut meta = metadata("page", id);
        meta["last_edited_time"] = json!(edited);
        Mock::given(method("GET"))
            .and(path(format!("/pages/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/blocks/{}/children", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(kids))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_full_crawl_small_tree() {
    let mock_server = MockServer::start().await;
    mount_small_tree(&mock_server).await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();

    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();

    assert_eq!(storage.count_nodes().unwrap(), 4);
    assert_eq!(report.errors, 0);
    assert_eq!(report.collections, 1);

    let root = storage.get_node("root").unwrap().unwrap();
    assert_eq!(root.parent_id, None);
    assert_eq!(root.modified_at, Some(Watermark::at(EDITED)));

    let page = storage.get_node("page-a").unwrap().unwrap();
    assert_eq!(page.parent_id.as_deref(), Some("root"));

    let db = storage.get_node("db-1").unwrap().unwrap();
    assert_eq!(db.parent_id.as_deref(), Some("root"));
    assert_eq!(db.created_at, Some(Watermark::at(CREATED)));

    let row = storage.get_node("row-1").unwrap().unwrap();
    assert_eq!(row.parent_id.as_deref(), Some("db-1"));
}

#[tokio::test]
async fn test_second_crawl_skips_unchanged_root() {
    let mock_server = MockServer::start().await;
    mount_small_tree(&mock_server).await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();

    run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();
    let before = storage.get_node("row-1").unwrap();

    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();

    assert_eq!(report.skipped_unchanged, 1);
    assert_eq!(report.saved, 0);
    assert_eq!(report.visited, 1);
    assert_eq!(storage.count_nodes().unwrap(), 4);
    assert_eq!(storage.get_node("row-1").unwrap(), before);
}

#[tokio::test]
async fn test_resume_skips_recorded_children() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "root", children(&["done", "todo"], &[])).await;
    mount_page(&mock_server, "todo", children(&[], &[])).await;

    // A recorded child must not be fetched at all
    Mock::given(method("GET"))
        .and(path("/pages/done"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata("page", "done")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();
    storage
        .save_node(&NodeUpsert::new("done", Some("root")).with_content("kept"))
        .unwrap();

    let report = run_crawl(&config, &mut storage, "root", CrawlMode::ResumeIncomplete)
        .await
        .unwrap();

    assert_eq!(report.skipped_recorded, 1);
    let done = storage.get_node("done").unwrap().unwrap();
    assert_eq!(done.created_at, None);
    assert_eq!(done.content.as_deref(), Some("kept"));

    let todo = storage.get_node("todo").unwrap().unwrap();
    assert_eq!(todo.parent_id.as_deref(), Some("root"));
    assert_eq!(todo.modified_at, Some(Watermark::at(EDITED)));
}

#[tokio::test]
async fn test_inaccessible_collection_is_recorded() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "root", children(&[], &["db-x"])).await;

    Mock::given(method("GET"))
        .and(path("/databases/db-x"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "object": "error", "status": 404, "code": "object_not_found"
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();

    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();
    assert_eq!(report.errors, 1);

    let db = storage.get_node("db-x").unwrap().unwrap();
    assert_eq!(db.parent_id.as_deref(), Some("root"));
    assert_eq!(db.created_at, Some(Watermark::Unknown));
    assert_eq!(db.modified_at, Some(Watermark::Unknown));

    let errors = storage.crawl_errors_for("db-x").unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_message, INACCESSIBLE_COLLECTION);
    assert_eq!(errors[0].head_title, "NA");
    assert_eq!(errors[0].head_content, "NA");
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pages/root"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "root", children(&[], &[])).await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();

    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();

    assert_eq!(report.errors, 0);
    assert_eq!(storage.count_crawl_errors().unwrap(), 0);
    assert_eq!(
        storage.get_node("root").unwrap().unwrap().modified_at,
        Some(Watermark::at(EDITED))
    );
}

#[tokio::test]
async fn test_unresolved_root_is_fatal() {
    let mock_server = MockServer::start().await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();

    let result = run_crawl(&config, &mut storage, "ghost", CrawlMode::Normal).await;

    assert!(matches!(result, Err(HarvestError::UnresolvedId(id)) if id == "ghost"));
    assert_eq!(storage.count_nodes().unwrap(), 0);
    assert_eq!(storage.count_crawl_errors().unwrap(), 0);
}

#[tokio::test]
async fn test_child_listing_failure_forgets_watermark() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pages/root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata("page", "root")))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blocks/root/children"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();

    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();
    assert_eq!(report.errors, 1);

    let root = storage.get_node("root").unwrap().unwrap();
    assert_eq!(root.created_at, Some(Watermark::at(CREATED)));
    assert_eq!(root.modified_at, Some(Watermark::Unknown));
    assert_eq!(storage.crawl_errors_for("root").unwrap().len(), 1);
}

#[tokio::test]
async fn test_collection_root_rows_are_parented() {
    let mock_server = MockServer::start().await;
    mount_small_tree(&mock_server).await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();

    // No page exists at db-1, so the root resolves as a database
    let report = run_crawl(&config, &mut storage, "db-1", CrawlMode::Normal)
        .await
        .unwrap();

    assert_eq!(report.collections, 1);
    let row = storage.get_node("row-1").unwrap().unwrap();
    assert_eq!(row.parent_id.as_deref(), Some("db-1"));
}

#[tokio::test]
async fn test_refresh_fills_missing_metadata() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "note", children(&[], &[])).await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();
    storage
        .save_node(&NodeUpsert::new("note", Some("folder")).with_content("exported body"))
        .unwrap();
    storage
        .save_node(&NodeUpsert::new("gone", Some("folder")))
        .unwrap();

    let report = run_refresh(&config, &mut storage).await.unwrap();
    assert_eq!(report.errors, 1);

    let note = storage.get_node("note").unwrap().unwrap();
    assert_eq!(note.parent_id.as_deref(), Some("folder"));
    assert_eq!(note.modified_at, Some(Watermark::at(EDITED)));
    assert_eq!(note.content.as_deref(), Some("exported body"));

    let gone = storage.get_node("gone").unwrap().unwrap();
    assert_eq!(gone.modified_at, Some(Watermark::Unknown));
    assert_eq!(storage.crawl_errors_for("gone").unwrap().len(), 1);
    assert!(storage.nodes_missing_metadata().unwrap().is_empty());
}

#[tokio::test]
async fn test_walker_discovery() {
    let mock_server = MockServer::start().await;
    mount_small_tree(&mock_server).await;

    let walker = build_walker(&create_test_config(&mock_server.uri())).unwrap();

    assert!(walker.is_valid_collection("db-1").await);
    assert!(!walker.is_valid_collection("root").await);
    assert_eq!(walker.resolve("root").await, NodeKind::Page);
    assert_eq!(walker.resolve("db-1").await, NodeKind::Collection);
    assert_eq!(walker.resolve("nowhere").await, NodeKind::Unresolved);

    let (pages, collections) = walker.list_children("root").await.unwrap();
    assert_eq!(pages[0].id, "page-a");
    assert_eq!(collections[0].id, "db-1");
    assert_eq!(walker.list_collection_rows("db-1").await.unwrap(), vec!["row-1".to_string()]);
}

#[tokio::test]
async fn test_paginated_listings_are_followed() {
    let mock_server = MockServer::start().await;

    // Cursor-specific pages are mounted first so they win over the first page
    Mock::given(method("GET"))
        .and(path("/blocks/root/children"))
        .and(query_param("start_cursor", "c2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(children(&["page-b"], &["db-1"])))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .and(body_partial_json(json!({"start_cursor": "r2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows_page(&["row-2"], None)))
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_page(&mock_server, "root", children_page(&["page-a"], &[], Some("c2"))).await;
    for id in ["page-a", "page-b", "row-1", "row-2"] {
        mount_page(&mock_server, id, children(&[], &[])).await;
    }
    Mock::given(method("GET"))
        .and(path("/databases/db-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata("database", "db-1")))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .and(body_partial_json(json!({"page_size": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows_page(&["row-1"], Some("r2"))))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let walker = build_walker(&config).unwrap();
    let (pages, collections) = walker.list_children("root").await.unwrap();
    let page_ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(page_ids, vec!["page-a", "page-b"]);
    assert_eq!(collections.len(), 1);

    let mut storage = SqliteStorage::new_in_memory().unwrap();
    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();

    assert_eq!(report.errors, 0);
    assert_eq!(storage.count_nodes().unwrap(), 6);
    for (id, parent) in [("page-b", "root"), ("row-1", "db-1"), ("row-2", "db-1")] {
        let node = storage.get_node(id).unwrap().unwrap();
        assert_eq!(node.parent_id.as_deref(), Some(parent));
    }
}

#[tokio::test]
async fn test_crawl_continues_past_inaccessible_collection() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "root", children(&["page-a"], &["db-x", "db-2"])).await;
    mount_page(&mock_server, "page-a", children(&[], &[])).await;
    mount_page(&mock_server, "row-2", children(&[], &[])).await;

    Mock::given(method("GET"))
        .and(path("/databases/db-x"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "object": "error", "status": 403, "code": "restricted_resource"
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/databases/db-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata("database", "db-2")))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/databases/db-2/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows_page(&["row-2"], None)))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();

    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();

    assert_eq!(report.errors, 1);
    assert_eq!(report.collections, 1);
    assert_eq!(storage.crawl_errors_for("db-x").unwrap().len(), 1);

    let sibling = storage.get_node("db-2").unwrap().unwrap();
    assert_eq!(sibling.modified_at, Some(Watermark::at(EDITED)));
    let row = storage.get_node("row-2").unwrap().unwrap();
    assert_eq!(row.parent_id.as_deref(), Some("db-2"));
    assert!(storage.get_node("page-a").unwrap().is_some());
}

#[tokio::test]
async fn test_row_query_failure_records_collection_head() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "root", children(&[], &["db-1"])).await;

    let mut database = metadata("database", "db-1");
    database["title"] = json!([{"type": "text", "plain_text": "Reading list"}]);
    Mock::given(method("GET"))
        .and(path("/databases/db-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(database))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .and(body_partial_json(json!({"page_size": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows_page(&["row-9"], None)))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .respond_with(ResponseTemplate::new(500).set_body_string("query failed"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();

    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();

    assert_eq!(report.errors, 1);
    assert_eq!(report.collections, 0);

    let db = storage.get_node("db-1").unwrap().unwrap();
    assert_eq!(db.parent_id.as_deref(), Some("root"));
    assert_eq!(db.modified_at, Some(Watermark::Unknown));

    let errors = storage.crawl_errors_for("db-1").unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].error_message.contains("500"));
    assert_eq!(errors[0].head_title, "Reading list");
    assert!(errors[0].head_content.contains("row-9"));
    assert!(storage.get_node("row-9").unwrap().is_none());
}

#[tokio::test]
async fn test_child_metadata_failure_leaves_placeholder() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "root", children(&["broken", "page-a"], &[])).await;
    mount_page(&mock_server, "page-a", children(&[], &[])).await;

    // Neither /pages/broken nor /databases/broken is mounted, so both answer 404
    Mock::given(method("GET"))
        .and(path("/blocks/broken/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(children(&[], &[])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();

    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();

    assert_eq!(report.errors, 1);
    assert_eq!(report.metadata_errors, 1);
    assert_eq!(report.saved, 2);

    let broken = storage.get_node("broken").unwrap().unwrap();
    assert_eq!(broken.parent_id.as_deref(), Some("root"));
    assert_eq!(broken.created_at, Some(Watermark::Unknown));
    assert_eq!(broken.modified_at, Some(Watermark::Unknown));
    assert_eq!(storage.crawl_errors_for("broken").unwrap().len(), 1);

    let sibling = storage.get_node("page-a").unwrap().unwrap();
    assert_eq!(sibling.modified_at, Some(Watermark::at(EDITED)));
}

#[tokio::test]
async fn test_resume_after_normal_run_keeps_recorded_children() {
    let first = MockServer::start().await;
    mount_edited_pages(&first, EDITED).await;

    let mut storage = SqliteStorage::new_in_memory().unwrap();
    run_crawl(&create_test_config(&first.uri()), &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();

    // Both pages were edited remotely since the normal run
    let second = MockServer::start().await;
    mount_edited_pages(&second, REEDITED).await;
    let config = create_test_config(&second.uri());

    let report = run_crawl(&config, &mut storage, "root", CrawlMode::ResumeIncomplete)
        .await
        .unwrap();
    assert_eq!(report.skipped_recorded, 1);
    assert_eq!(
        storage.get_node("root").unwrap().unwrap().modified_at,
        Some(Watermark::at(REEDITED))
    );
    assert_eq!(
        storage.get_node("page-a").unwrap().unwrap().modified_at,
        Some(Watermark::at(EDITED))
    );

    // The resume run moved the root watermark, so a normal run now prunes at the root
    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();
    assert_eq!(report.skipped_unchanged, 1);
    assert_eq!(report.visited, 1);
    assert_eq!(
        storage.get_node("page-a").unwrap().unwrap().modified_at,
        Some(Watermark::at(EDITED))
    );
}

#[tokio::test]
async fn test_refresh_after_resume_fills_skipped_children() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "root", children(&["done", "todo"], &[])).await;
    mount_page(&mock_server, "done", children(&[], &[])).await;
    mount_page(&mock_server, "todo", children(&[], &[])).await;

    let config = create_test_config(&mock_server.uri());
    let mut storage = SqliteStorage::new_in_memory().unwrap();
    storage
        .save_node(&NodeUpsert::new("done", Some("root")).with_content("kept"))
        .unwrap();

    run_crawl(&config, &mut storage, "root", CrawlMode::ResumeIncomplete)
        .await
        .unwrap();
    assert_eq!(storage.get_node("done").unwrap().unwrap().modified_at, None);

    // The root is unchanged since the resume run, so a normal run never reaches "done"
    let report = run_crawl(&config, &mut storage, "root", CrawlMode::Normal)
        .await
        .unwrap();
    assert_eq!(report.visited, 1);
    assert_eq!(report.skipped_unchanged, 1);
    assert_eq!(storage.get_node("done").unwrap().unwrap().modified_at, None);

    let report = run_refresh(&config, &mut storage).await.unwrap();
    assert_eq!(report.saved, 1);
    let done = storage.get_node("done").unwrap().unwrap();
    assert_eq!(done.parent_id.as_deref(), Some("root"));
    assert_eq!(done.modified_at, Some(Watermark::at(EDITED)));
    assert_eq!(done.content.as_deref(), Some("kept"));
}
