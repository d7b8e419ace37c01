//! Integration tests for the regression runner
//!
//! These tests write captured connector output to temporary files and run
//! the full pipeline: sources, pairing, reconciliation, report sinks.

use std::fs;
use std::path::{Path, PathBuf};

use connector_regression::config::RegressionConfig;
use connector_regression::report::{Metric, MemorySink, ReportSink, PAGE_BREAK};
use connector_regression::runner::{run_regression, sinks_for};

fn record(stream: &str, data: &str) -> String {
    format!(
        r#"{{"type":"RECORD","record":{{"stream":"{}","data":{},"emitted_at":1706140800000}}}}"#,
        stream, data
    )
}

fn state() -> String {
    r#"{"type":"STATE","state":{"type":"STREAM","stream":{"stream_descriptor":{"name":"coupons"}}}}"#
        .to_string()
}

fn log(message: &str) -> String {
    format!(
        r#"{{"type":"LOG","log":{{"level":"INFO","message":"{}"}}}}"#,
        message
    )
}

fn write_capture(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, lines.join("\n") + "\n").expect("Failed to write capture");
    path
}

fn file_config(dir: &Path, left: &[String], right: &[String]) -> RegressionConfig {
    let mut config = RegressionConfig::default();
    config.left.file = Some(write_capture(dir, "left.jsonl", left));
    config.right.file = Some(write_capture(dir, "right.jsonl", right));
    config.output.report_path = dir.join("report.txt");
    config.output.json_path = Some(dir.join("report.json"));
    config
}

#[tokio::test]
async fn test_captured_runs_produce_reports() {
    let dir = tempfile::tempdir().unwrap();
    let left = vec![
        log("Starting syncing SourceWoocommerce"),
        record("coupons", r#"{"id":1,"code":"SAVE10","amount":"10.00"}"#),
        record("coupons", r#"{"id":2,"code":"SAVE20","amount":"20.00"}"#),
        record("coupons", r#"{"id":3,"code":"FREESHIP","amount":"0.00"}"#),
        state(),
        record("orders", r#"{"id":100,"total":"55.00","status":"completed"}"#),
    ];
    let right = vec![
        log("Starting syncing SourceWoocommerce"),
        record("coupons", r#"{"id":2,"code":"SAVE20","amount":"20.00"}"#),
        record("coupons", r#"{"id":1,"code":"SAVE10","amount":"12.00"}"#),
        record("coupons", r#"{"id":3,"code":"FREESHIP","amount":"0.00","usage_count":4}"#),
        state(),
        record("orders", r#"{"id":100,"total":"55.00"}"#),
    ];
    let config = file_config(dir.path(), &left, &right);

    let mut sinks = sinks_for(&config.output);
    let report = run_regression(&config, &mut sinks).await.unwrap();

    let coupons = report.stream("coupons").unwrap();
    assert_eq!(coupons.record_count, 3);
    assert!(coupons.left_rows_missing.is_empty());
    assert!(coupons.right_rows_missing.is_empty());
    assert_eq!(coupons.metric("amount", Metric::DiffCount), Some(1));
    assert_eq!(coupons.metric("amount", Metric::EqualCount), Some(2));
    assert_eq!(coupons.metric("code", Metric::EqualCount), Some(3));
    assert_eq!(coupons.metric("usage_count", Metric::LeftMissingCount), Some(1));
    assert_eq!(coupons.metric("usage_count", Metric::EqualCount), Some(0));

    let orders = report.stream("orders").unwrap();
    assert_eq!(orders.metric("status", Metric::RightMissingCount), Some(1));

    assert_eq!(report.summary.control_pairs, 2);
    assert_eq!(report.summary.reconciled_records, 2);

    // summary page + coupons{amount, code, id, usage_count} + orders{id, status, total}
    let text = fs::read_to_string(dir.path().join("report.txt")).unwrap();
    assert_eq!(text.split(PAGE_BREAK).count(), 1 + 4 + 3);
    assert!(text.contains("Stream: coupons, Column: usage_count"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("report.json")).unwrap())
            .unwrap();
    assert_eq!(json["streams"][0]["stream"], "coupons");
    assert_eq!(json["streams"][0]["diff_count"]["amount"], 1);
}

#[tokio::test]
async fn test_shorter_right_run_reports_left_only_rows() {
    let dir = tempfile::tempdir().unwrap();
    let left = vec![
        record("products", r#"{"id":"p1","price":1}"#),
        record("products", r#"{"id":"p2","price":2}"#),
    ];
    let right = vec![record("products", r#"{"id":"p1","price":1.0}"#)];
    let config = file_config(dir.path(), &left, &right);

    let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(MemorySink::new())];
    let report = run_regression(&config, &mut sinks).await.unwrap();

    let products = report.stream("products").unwrap();
    assert_eq!(products.metric("price", Metric::EqualCount), Some(1));
    assert_eq!(
        products
            .left_rows_missing
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>(),
        vec!["\"p2\""]
    );
    assert!(products.right_rows_missing.is_empty());
}

#[tokio::test]
async fn test_message_type_mismatch_aborts_without_report() {
    let dir = tempfile::tempdir().unwrap();
    let left = vec![
        record("coupons", r#"{"id":1}"#),
        state(),
    ];
    let right = vec![
        record("coupons", r#"{"id":1}"#),
        record("coupons", r#"{"id":2}"#),
    ];
    let config = file_config(dir.path(), &left, &right);

    let mut sinks = sinks_for(&config.output);
    let err = run_regression(&config, &mut sinks).await.unwrap_err();

    assert!(format!("{:#}", err).contains("STATE != RECORD"));
    assert!(!dir.path().join("report.txt").exists());
    assert!(!dir.path().join("report.json").exists());
}

#[tokio::test]
async fn test_strict_mode_rejects_noise() {
    let dir = tempfile::tempdir().unwrap();
    let left = vec!["plain text banner".to_string(), record("s", r#"{"id":1}"#)];
    let right = vec![record("s", r#"{"id":1}"#)];

    let mut config = file_config(dir.path(), &left, &right);
    let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(MemorySink::new())];
    assert!(run_regression(&config, &mut sinks).await.is_ok());

    config.strict = true;
    let err = run_regression(&config, &mut sinks).await.unwrap_err();
    assert!(format!("{:#}", err).contains("left: line 1"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_subprocess_runs_are_compared() {
    let dir = tempfile::tempdir().unwrap();
    let left_path = write_capture(
        dir.path(),
        "left.jsonl",
        &[record("s", r#"{"id":1,"v":"a"}"#), record("s", r#"{"id":2,"v":"b"}"#)],
    );
    let right_path = write_capture(
        dir.path(),
        "right.jsonl",
        &[record("s", r#"{"id":1,"v":"a"}"#), record("s", r#"{"id":2,"v":"c"}"#)],
    );

    let mut config = RegressionConfig::default();
    config.left.command = Some(format!("cat '{}'", left_path.display()));
    config.right.command = Some(format!("echo starting >&2; cat '{}'", right_path.display()));

    let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(MemorySink::new())];
    let report = run_regression(&config, &mut sinks).await.unwrap();

    let stream = report.stream("s").unwrap();
    assert_eq!(stream.record_count, 2);
    assert_eq!(stream.metric("v", Metric::DiffCount), Some(1));
    assert_eq!(stream.metric("v", Metric::EqualCount), Some(1));
}
