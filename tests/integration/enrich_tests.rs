//! Integration tests for the enrichment batch
//!
//! A wiremock server stands in for the Gemini `generateContent` endpoint.
//! Quota errors carry `retryDelay: "0s"` so retries never sleep.

use notion_harvest::enrich::{load_outputs, BatchDriver, GeminiClient};
use notion_harvest::storage::{NodeUpsert, QuestionSetRecord, SqliteStorage, Storage};
use notion_harvest::HarvestError;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gemini-test";
const GENERATE_PATH: &str = "/models/gemini-test:generateContent";

const LONG_NOTE: &str = "long note: planted tomatoes, basil and peppers with Ana";
const MID_NOTE: &str = "mid note: called the plumber";
const SHORT_NOTE: &str = "short note: rain";

fn create_client(server: &MockServer, model: &str) -> GeminiClient {
    GeminiClient::new(reqwest::Client::new(), &server.uri(), "test-key", model, 0.0)
}

/// Store with one question set and three notes of different lengths
fn seeded_storage() -> SqliteStorage {
    let mut storage = SqliteStorage::new_in_memory().unwrap();
    storage
        .insert_question_set(
            &QuestionSetRecord {
                version: "1".to_string(),
                date_updated: "2024-05-01T00:00:00+00:00".to_string(),
                questions_json: json!({
                    "instructions": "Answer about the note.",
                    "questions": ["What is the topic?", "Who is mentioned?"]
                })
                .to_string(),
            },
            false,
        )
        .unwrap();

    for (id, content) in [("short", SHORT_NOTE), ("long", LONG_NOTE), ("mid", MID_NOTE)] {
        storage
            .save_node(&NodeUpsert::new(id, Some("root")).with_content(content))
            .unwrap();
    }
    storage
        .save_node(&NodeUpsert::new("blank", Some("root")).with_content("   "))
        .unwrap();
    storage
}

fn answer_body(answers: Value) -> Value {
    let text = format!("```json\n{}\n```", answers);
    json!({"candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]})
}

fn quota_body() -> Value {
    json!({"error": {
        "code": 429,
        "status": "RESOURCE_EXHAUSTED",
        "message": "Resource has been exhausted (e.g. check quota).",
        "details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "0s"}]
    }})
}

#[tokio::test]
async fn test_batch_enriches_longest_first() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "test-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(answer_body(json!({"q1": "topic", "q2": "none"}))),
        )
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut storage = seeded_storage();
    let outputs = TempDir::new().unwrap();

    let report = BatchDriver::new(&mut storage, create_client(&mock_server, MODEL), 3)
        .with_outputs_dir(outputs.path())
        .run("1", None)
        .await
        .unwrap();

    assert_eq!(report.candidates, 3);
    assert_eq!(report.enriched, 3);
    assert!(storage.has_enrichment("long", "v1", MODEL).unwrap());
    assert!(!storage.has_enrichment("blank", "v1", MODEL).unwrap());

    let rows = storage.enrichments_for("mid").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].answers.get("q1"), Some(&json!("topic")));

    // Longest content is sent first
    let requests = mock_server.received_requests().await.unwrap();
    let first = String::from_utf8_lossy(&requests[0].body).to_string();
    assert!(first.contains("long note"));

    assert!(outputs
        .path()
        .join("gemini_long_v1_gemini-test.json")
        .is_file());
}

#[tokio::test]
async fn test_rerun_skips_existing_results() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer_body(json!({"q1": "x"}))))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut storage = seeded_storage();
    let client = create_client(&mock_server, MODEL);

    BatchDriver::new(&mut storage, client.clone(), 3)
        .run("1", None)
        .await
        .unwrap();
    let report = BatchDriver::new(&mut storage, client, 3)
        .run("1", None)
        .await
        .unwrap();

    assert_eq!(report.enriched, 0);
    assert_eq!(report.skipped_existing, 3);
}

#[tokio::test]
async fn test_quota_exhaustion_halts_batch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(quota_body()))
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut storage = seeded_storage();

    let result = BatchDriver::new(&mut storage, create_client(&mock_server, MODEL), 2)
        .run("1", None)
        .await;

    match result {
        Err(HarvestError::QuotaExhausted { node_id, .. }) => assert_eq!(node_id, "long"),
        other => panic!("expected quota exhaustion, got {:?}", other),
    }
    for id in ["long", "mid", "short"] {
        assert!(storage.enrichments_for(id).unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_quota_retry_then_success() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(quota_body()))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer_body(json!({"q1": "ok"}))))
        .mount(&mock_server)
        .await;

    let mut storage = seeded_storage();
    let report = BatchDriver::new(&mut storage, create_client(&mock_server, MODEL), 5)
        .run("1", None)
        .await
        .unwrap();

    assert_eq!(report.enriched, 3);
    assert_eq!(report.skipped_errors, 0);
}

#[tokio::test]
async fn test_non_quota_error_is_skipped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("mid note"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "status": "INVALID_ARGUMENT", "message": "bad input"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("short note"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "I could not answer that."}]}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer_body(json!({"q1": "garden"}))))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut storage = seeded_storage();
    let outputs = TempDir::new().unwrap();

    let report = BatchDriver::new(&mut storage, create_client(&mock_server, MODEL), 3)
        .with_outputs_dir(outputs.path())
        .run("1", None)
        .await
        .unwrap();

    assert_eq!(report.enriched, 1);
    assert_eq!(report.skipped_errors, 2);
    assert!(storage.has_enrichment("long", "v1", MODEL).unwrap());
    assert!(!storage.has_enrichment("mid", "v1", MODEL).unwrap());

    // Error outcomes are still written as files
    let parse_error: Value = serde_json::from_str(
        &std::fs::read_to_string(outputs.path().join("gemini_short_v1_gemini-test.json")).unwrap(),
    )
    .unwrap();
    assert!(parse_error["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to parse Gemini response"));
    assert_eq!(parse_error["raw"], "I could not answer that.");
    assert_eq!(parse_error["questions_version"], "v1");
}

#[tokio::test]
async fn test_models_are_kept_apart() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer_body(json!({"q1": "y"}))))
        .mount(&mock_server)
        .await;

    let mut storage = seeded_storage();
    BatchDriver::new(&mut storage, create_client(&mock_server, MODEL), 1)
        .run("1", None)
        .await
        .unwrap();
    BatchDriver::new(&mut storage, create_client(&mock_server, "gemini-other"), 1)
        .run("1", None)
        .await
        .unwrap();

    let rows = storage.enrichments_for("long").unwrap();
    assert_eq!(rows.len(), 2);
    let breakdown = storage.enrichment_breakdown().unwrap();
    assert_eq!(breakdown.len(), 2);
    assert!(breakdown.iter().all(|(version, _, count)| version == "v1" && *count == 3));
}

#[tokio::test]
async fn test_missing_question_set() {
    let mock_server = MockServer::start().await;
    let mut storage = seeded_storage();

    let result = BatchDriver::new(&mut storage, create_client(&mock_server, MODEL), 1)
        .run("7", None)
        .await;

    assert!(matches!(result, Err(HarvestError::QuestionSetNotFound(v)) if v == "7"));
}

#[tokio::test]
async fn test_outputs_reload_into_fresh_store() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer_body(json!({"q1": "z", "q2": "w"}))))
        .mount(&mock_server)
        .await;

    let mut storage = seeded_storage();
    let outputs = TempDir::new().unwrap();
    BatchDriver::new(&mut storage, create_client(&mock_server, MODEL), 1)
        .with_outputs_dir(outputs.path())
        .run("1", None)
        .await
        .unwrap();

    let mut fresh = SqliteStorage::new_in_memory().unwrap();
    assert_eq!(load_outputs(&mut fresh, outputs.path()).unwrap(), 3);

    let original = storage.enrichments_for("long").unwrap();
    let reloaded = fresh.enrichments_for("long").unwrap();
    assert_eq!(reloaded, original);
}

#[tokio::test]
async fn test_results_carry_question_file_label() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer_body(json!({"q1": "v"}))))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut storage = seeded_storage();
    storage
        .insert_question_set(
            &QuestionSetRecord {
                version: "2".to_string(),
                date_updated: "2024-06-01T00:00:00+00:00".to_string(),
                questions_json: json!({
                    "instructions": "Answer briefly.",
                    "questions": ["What is the topic?"],
                    "version": "v2-beta"
                })
                .to_string(),
            },
            false,
        )
        .unwrap();
    let outputs = TempDir::new().unwrap();
    let client = create_client(&mock_server, MODEL);

    let report = BatchDriver::new(&mut storage, client.clone(), 1)
        .with_outputs_dir(outputs.path())
        .run("2", None)
        .await
        .unwrap();
    assert_eq!(report.enriched, 3);
    assert!(storage.has_enrichment("long", "v2-beta", MODEL).unwrap());
    assert!(!storage.has_enrichment("long", "v2", MODEL).unwrap());
    assert!(outputs
        .path()
        .join("gemini_long_v2-beta_gemini-test.json")
        .is_file());

    // The skip check uses the same label
    let rerun = BatchDriver::new(&mut storage, client, 1)
        .run("2", None)
        .await
        .unwrap();
    assert_eq!(rerun.skipped_existing, 3);
}
