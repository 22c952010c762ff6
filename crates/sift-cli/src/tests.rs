//! CLI command tests
//!
//! These run the command functions against batch files in a temp dir and
//! read the written JSON back.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};
use sift_core::{
    CancelFlag, Category, ClassifiedTransaction, Error, PatternAnalyzer, PatternReport,
};
use tempfile::TempDir;

use crate::commands::{self, truncate};

fn tx(id: usize, date: NaiveDate, amount: f64, merchant: &str, description: &str) -> Value {
    json!({
        "id": id.to_string(),
        "date": date.format("%Y-%m-%d").to_string(),
        "amount": amount,
        "payment_method": "credit_card",
        "description": description,
        "merchant_name": merchant.to_uppercase(),
        "standardized_merchant": merchant,
    })
}

/// Three months of a subscription, weekly groceries and a paycheck
fn sample_batch() -> Value {
    let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    let mut rows = Vec::new();
    let mut id = 0;
    let mut next = || {
        id += 1;
        id
    };

    for month in 0..3 {
        let date = start + Duration::days(30 * month);
        rows.push(tx(next(), date, -15.49, "netflix", "netflix.com"));
        rows.push(tx(next(), date, 3000.0, "acme corp", "payroll deposit"));
    }
    for week in 0..8 {
        let date = start + Duration::days(7 * week + 1);
        rows.push(tx(next(), date, -55.0, "safeway", "groceries"));
    }
    Value::Array(rows)
}

fn write_input(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
    path
}

fn read<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

// ========== Helper Tests ==========

#[test]
fn test_truncate_short_string() {
    assert_eq!(truncate("netflix", 10), "netflix");
    assert_eq!(truncate("exactly10!", 10), "exactly10!");
}

#[test]
fn test_truncate_long_string() {
    assert_eq!(truncate("whole foods market", 10), "whole f...");
}

#[test]
fn test_truncate_multibyte() {
    // Cuts on char boundaries
    assert_eq!(truncate("café crème brûlée", 8), "café ...");
}

// ========== Classify Command Tests ==========

#[tokio::test]
async fn test_cmd_classify_writes_output() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "batch.json", &sample_batch());
    let output = dir.path().join("classified.json");

    commands::cmd_classify(None, &input, None, Some(&output), 30)
        .await
        .unwrap();

    let classified: Vec<ClassifiedTransaction> = read(&output);
    assert_eq!(classified.len(), 14);
    assert_eq!(classified[0].id(), "1");
    assert_eq!(classified[0].predicted_category, Category::Subscriptions);
    assert_eq!(classified[1].predicted_category, Category::Salary);
}

#[tokio::test]
async fn test_cmd_classify_empty_batch() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "empty.json", &json!([]));

    let result = commands::cmd_classify(None, &input, None, None, 30).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cmd_classify_invalid_json() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.json");
    fs::write(&input, "[{\"id\": ").unwrap();

    let err = commands::cmd_classify(None, &input, None, None, 30)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid JSON"));
}

#[tokio::test]
async fn test_cmd_classify_missing_model() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "batch.json", &sample_batch());
    let model = dir.path().join("nope.json");

    let result = commands::cmd_classify(None, &input, Some(&model), None, 30).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cmd_classify_with_rules_override() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "batch.json", &sample_batch());
    let rules = dir.path().join("rules.toml");
    fs::write(
        &rules,
        r#"
        version = "cli-test"
        [merchants]
        "safeway" = { category = "dining" }
        "#,
    )
    .unwrap();
    let output = dir.path().join("classified.json");

    commands::cmd_classify(Some(&rules), &input, None, Some(&output), 30)
        .await
        .unwrap();

    let classified: Vec<ClassifiedTransaction> = read(&output);
    let safeway = classified
        .iter()
        .find(|t| t.merchant.standardized_merchant == "safeway")
        .unwrap();
    assert_eq!(safeway.predicted_category, Category::Dining);
}

// ========== Analyze / Run Command Tests ==========

#[tokio::test]
async fn test_cmd_analyze_after_classify() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "batch.json", &sample_batch());
    let classified = dir.path().join("classified.json");
    let report_path = dir.path().join("report.json");

    commands::cmd_classify(None, &input, None, Some(&classified), 30)
        .await
        .unwrap();
    commands::cmd_analyze(&classified, Some(&report_path), 30)
        .await
        .unwrap();

    let report: Value = read(&report_path);
    assert!((report["summary"]["total_income"].as_f64().unwrap() - 9000.0).abs() < 1e-9);

    let recurring = report["recurring"].as_array().unwrap();
    assert!(recurring
        .iter()
        .any(|p| p["merchant"] == "netflix" && p["frequency"] == "monthly"));
    assert!(recurring
        .iter()
        .any(|p| p["merchant"] == "safeway" && p["frequency"] == "weekly"));
}

#[tokio::test]
async fn test_cmd_analyze_empty_batch() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "empty.json", &json!([]));

    assert!(commands::cmd_analyze(&input, None, 30).await.is_err());
}

#[tokio::test]
async fn test_cmd_run_writes_transactions_and_report() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "batch.json", &sample_batch());
    let output = dir.path().join("run.json");

    commands::cmd_run(None, &input, None, Some(&output), 30)
        .await
        .unwrap();

    let value: Value = read(&output);
    let transactions: Vec<ClassifiedTransaction> =
        serde_json::from_value(value["transactions"].clone()).unwrap();
    let report: PatternReport = serde_json::from_value(value["report"].clone()).unwrap();

    assert_eq!(transactions.len(), 14);
    assert!(report.summary.total_expenses > 0.0);
    assert!(!report.recurring.is_empty());
}

#[test]
fn test_run_stages_share_cancel_flag() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "batch.json", &sample_batch());
    let (batch, classifier) = commands::load_batch(None, &input, None).unwrap();
    let analyzer = PatternAnalyzer::new();

    let live = commands::classify_and_analyze(&classifier, &analyzer, &batch, &CancelFlag::new())
        .unwrap();
    assert_eq!(live.transactions.len(), 14);
    assert!(!live.report.recurring.is_empty());

    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = commands::classify_and_analyze(&classifier, &analyzer, &batch, &cancel);
    assert!(matches!(result, Err(Error::Cancelled)));
}

// ========== Train Command Tests ==========

#[tokio::test]
async fn test_cmd_train_then_classify_with_model() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "batch.json", &sample_batch());
    let classified = dir.path().join("classified.json");
    let model = dir.path().join("model.json");
    let output = dir.path().join("with_model.json");

    commands::cmd_classify(None, &input, None, Some(&classified), 30)
        .await
        .unwrap();
    commands::cmd_train(&classified, &model, 0.0).unwrap();

    let loaded = commands::load_model(&model).unwrap();
    assert_eq!(loaded.trained_rows, 14);
    assert!(loaded.categories().any(|c| c == Category::Groceries));

    commands::cmd_classify(None, &input, Some(&model), Some(&output), 30)
        .await
        .unwrap();
    let with_model: Vec<ClassifiedTransaction> = read(&output);
    assert_eq!(with_model.len(), 14);
    assert_eq!(with_model[1].predicted_category, Category::Salary);
}

#[tokio::test]
async fn test_cmd_train_skips_fallback_rows() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "batch.json", &sample_batch());
    let classified_path = dir.path().join("classified.json");

    commands::cmd_classify(None, &input, None, Some(&classified_path), 30)
        .await
        .unwrap();

    let mut classified: Vec<ClassifiedTransaction> = read(&classified_path);
    classified[0].merchant.transaction.metadata.classification_error =
        Some("amount is not finite".to_string());

    let model = commands::train(&classified, 0.0).unwrap();
    assert_eq!(model.trained_rows, 13);
}

#[test]
fn test_cmd_train_nothing_above_threshold() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "classified.json", &json!([]));
    let model = dir.path().join("model.json");

    let err = commands::cmd_train(&input, &model, 0.5).unwrap_err();
    assert!(err.to_string().contains("No training rows"));
    assert!(!model.exists());
}

// ========== Rules Command Tests ==========

#[test]
fn test_cmd_rules_builtin() {
    assert!(commands::cmd_rules(None).is_ok());
}

#[test]
fn test_cmd_rules_bad_override() {
    let dir = TempDir::new().unwrap();
    let rules = dir.path().join("rules.toml");
    fs::write(&rules, "this is = = not toml").unwrap();

    assert!(commands::cmd_rules(Some(&rules)).is_err());
}

// ========== Timeout Tests ==========

#[tokio::test]
async fn test_run_batch_returns_result() {
    let value = commands::run_batch(5, |_cancel| Ok(42)).await.unwrap();
    assert_eq!(value, 42);
}

#[tokio::test]
async fn test_run_batch_propagates_core_error() {
    let result: anyhow::Result<()> =
        commands::run_batch(5, |_cancel| Err(Error::EmptyBatch)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_run_batch_timeout_cancels_worker() {
    let observed = CancelFlag::new();
    let seen = observed.clone();

    let result: anyhow::Result<()> = commands::run_batch(0, move |cancel| {
        while !cancel.is_cancelled() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        seen.cancel();
        Err(Error::Cancelled)
    })
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("timed out"));

    // Worker sees the flag and exits
    for _ in 0..1000 {
        if observed.is_cancelled() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(observed.is_cancelled());
}
