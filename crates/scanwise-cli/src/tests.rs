//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use scanwise_core::ai::{MockBackend, UpstreamFailure};
use scanwise_core::models::{AnalysisKind, Category};
use scanwise_core::{Config, Database};

use crate::commands::{self, truncate, Input, ReceiptOptions};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn receipt_input() -> Input {
    Input::from_text("MOCK MART\nMILK 2 x 3.00\nCHIPS 40.00\nTOTAL 46.00", Some("receipt.txt"))
}

fn receipt_options(save: bool) -> ReceiptOptions {
    ReceiptOptions {
        threshold: None,
        language: "English".to_string(),
        json: false,
        save,
    }
}

// ========== Receipt Command Tests ==========

#[tokio::test]
async fn test_cmd_receipt_saves_report() {
    let db = setup_test_db();
    let mock = MockBackend::new();

    let id = commands::cmd_receipt(
        &db,
        "local",
        mock.clone(),
        &Config::default(),
        &receipt_input(),
        &receipt_options(true),
    )
    .await
    .unwrap()
    .expect("report should be saved");

    assert_eq!(mock.call_count(), 2);

    let stored = db.get_receipt_report(id, "local").unwrap().unwrap();
    assert_eq!(stored.analysis.source_name.as_deref(), Some("receipt.txt"));
    assert_eq!(stored.analysis.options.as_deref(), Some("threshold=30"));
    assert_eq!(stored.report.anomalies.len(), 1);
    assert_eq!(stored.report.anomalies[0].category, Category::Snacks);
}

#[tokio::test]
async fn test_cmd_receipt_no_save() {
    let db = setup_test_db();

    let mut options = receipt_options(false);
    options.json = true;
    options.threshold = Some(95.0);

    let id = commands::cmd_receipt(
        &db,
        "local",
        MockBackend::new(),
        &Config::default(),
        &receipt_input(),
        &options,
    )
    .await
    .unwrap();

    assert!(id.is_none());
    assert!(db.list_history("local", 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_cmd_receipt_empty_input_fails_without_model_call() {
    let db = setup_test_db();
    let mock = MockBackend::new();

    let result = commands::cmd_receipt(
        &db,
        "local",
        mock.clone(),
        &Config::default(),
        &Input::from_text("   \n", None),
        &receipt_options(true),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(mock.call_count(), 0);
    assert!(db.list_history("local", 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_cmd_receipt_upstream_failure_is_reported() {
    let db = setup_test_db();
    let mock = MockBackend::new();
    mock.push(Err(UpstreamFailure::RateLimited));

    let err = commands::cmd_receipt(
        &db,
        "local",
        mock,
        &Config::default(),
        &receipt_input(),
        &receipt_options(true),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("parse stage failed"));
    assert!(db.list_history("local", 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_cmd_receipt_extraction_failure_is_tagged() {
    let db = setup_test_db();
    let mock = MockBackend::new();

    let err = commands::cmd_receipt(
        &db,
        "local",
        mock.clone(),
        &Config::default(),
        &Input::from_text("ERROR: OCR service timed out", Some("scan.txt")),
        &receipt_options(true),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("extract stage failed"));
    assert_eq!(mock.call_count(), 0);
    assert!(db.list_history("local", 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_cmd_receipt_threshold_flag_applies() {
    let db = setup_test_db();
    let mut options = receipt_options(true);
    options.threshold = Some(95.0);

    let id = commands::cmd_receipt(
        &db,
        "local",
        MockBackend::new(),
        &Config::default(),
        &receipt_input(),
        &options,
    )
    .await
    .unwrap()
    .unwrap();

    let stored = db.get_receipt_report(id, "local").unwrap().unwrap();
    assert_eq!(stored.analysis.options.as_deref(), Some("threshold=95"));
    assert!(stored.report.anomalies.is_empty());
}

// ========== Summarize / Review Command Tests ==========

#[tokio::test]
async fn test_cmd_summarize_saves_options() {
    let db = setup_test_db();
    let mock = MockBackend::new();
    mock.push_text("Everything went up.", 25);

    let id = commands::cmd_summarize(
        &db,
        "local",
        mock,
        &Config::default(),
        &Input::from_text("Sales rose. Costs rose. Profit rose.", Some("q3.txt")),
        "short",
        "German",
        true,
    )
    .await
    .unwrap()
    .unwrap();

    let analysis = db.get_analysis(id, "local").unwrap().unwrap();
    assert_eq!(analysis.kind, AnalysisKind::Summary);
    assert_eq!(analysis.options.as_deref(), Some("Short/German"));
    assert_eq!(analysis.output_text.as_deref(), Some("Everything went up."));
    assert_eq!(analysis.tokens_used, 25);
}

#[tokio::test]
async fn test_cmd_summarize_invalid_length() {
    let db = setup_test_db();
    let mock = MockBackend::new();

    let result = commands::cmd_summarize(
        &db,
        "local",
        mock.clone(),
        &Config::default(),
        &Input::from_text("Some text", None),
        "enormous",
        "English",
        true,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_cmd_review_with_language_detection() {
    let db = setup_test_db();
    let mock = MockBackend::new();
    mock.push_text("Rust.", 5);
    mock.push_text("No bugs found.", 70);

    let id = commands::cmd_review(
        &db,
        "local",
        mock.clone(),
        &Config::default(),
        &Input::from_text("fn main() { println!(\"hi\"); }", Some("main.rs")),
        "bugs",
        true,
        true,
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(mock.call_count(), 2);
    let analysis = db.get_analysis(id, "local").unwrap().unwrap();
    assert_eq!(analysis.kind, AnalysisKind::Code);
    assert_eq!(analysis.options.as_deref(), Some("bug_detection/Rust"));
    assert_eq!(analysis.output_text.as_deref(), Some("No bugs found."));
}

#[tokio::test]
async fn test_cmd_review_unknown_type() {
    let db = setup_test_db();
    let result = commands::cmd_review(
        &db,
        "local",
        MockBackend::new(),
        &Config::default(),
        &Input::from_text("x = 1", None),
        "lint",
        false,
        true,
    )
    .await;
    assert!(result.is_err());
}

// ========== History Command Tests ==========

async fn seed_history(db: &Database) -> i64 {
    commands::cmd_receipt(
        db,
        "local",
        MockBackend::new(),
        &Config::default(),
        &receipt_input(),
        &receipt_options(true),
    )
    .await
    .unwrap()
    .unwrap()
}

#[tokio::test]
async fn test_cmd_history_commands() {
    let db = setup_test_db();
    let id = seed_history(&db).await;

    assert!(commands::cmd_history_list(&db, "local", 20).is_ok());
    assert!(commands::cmd_history_search(&db, "local", "chips", 20).is_ok());
    assert!(commands::cmd_history_search(&db, "local", "  ", 20).is_err());
    assert!(commands::cmd_history_show(&db, "local", id).is_ok());
    assert!(commands::cmd_history_show(&db, "someone-else", id).is_err());

    assert!(commands::cmd_history_delete(&db, "local", id).is_ok());
    assert!(db.get_analysis(id, "local").unwrap().is_none());
    assert!(commands::cmd_history_delete(&db, "local", id).is_err());
}

#[test]
fn test_cmd_history_list_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_history_list(&db, "local", 20).is_ok());
}

#[tokio::test]
async fn test_cmd_stats() {
    let db = setup_test_db();
    seed_history(&db).await;
    assert!(commands::cmd_stats(&db, "local", true).is_ok());
}

#[tokio::test]
async fn test_cmd_export_to_file() {
    let db = setup_test_db();
    seed_history(&db).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.csv");
    commands::cmd_export(&db, "local", Some(&path), Some("receipt"), None).unwrap();

    let csv = std::fs::read_to_string(&path).unwrap();
    assert!(csv.starts_with("id,created_at,kind"));
    assert_eq!(csv.matches(",receipt,receipt.txt,").count(), 1);
}

#[test]
fn test_cmd_export_invalid_kind() {
    let db = setup_test_db();
    assert!(commands::cmd_export(&db, "local", None, Some("invoice"), None).is_err());
}

// ========== Setup / Utility Tests ==========

#[test]
fn test_cmd_init_creates_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scanwise.db");

    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());

    let db = commands::open_db(&path, true).unwrap();
    assert!(!db.is_encrypted());
}

#[test]
fn test_read_input_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("receipt.txt");
    std::fs::write(&path, "TOTAL 5.00").unwrap();

    let input = commands::read_input(&path).unwrap();
    assert_eq!(input.bytes, b"TOTAL 5.00");
    assert_eq!(input.source_name.as_deref(), Some("receipt.txt"));

    assert!(commands::read_input(&dir.path().join("missing.txt")).is_err());
}

#[test]
fn test_cmd_prompts_show() {
    assert!(commands::cmd_prompts_show("parse_receipt").is_ok());
    assert!(commands::cmd_prompts_show("not_a_prompt").is_err());
}

#[test]
fn test_parse_api_keys() {
    assert_eq!(
        commands::parse_api_keys(" key-one, ,key-two,"),
        vec!["key-one".to_string(), "key-two".to_string()]
    );
    assert!(commands::parse_api_keys("").is_empty());
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a longer sentence", 10), "a longe...");
    assert_eq!(truncate("ééééééé", 5), "éé...");
}
