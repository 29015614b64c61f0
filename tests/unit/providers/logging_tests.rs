use serde_json::json;
use webhook_testkit::config::LoggerConfig;
use webhook_testkit::providers::StructuredLogger;

#[test]
fn test_logger_writes_warnings_and_errors_to_daily_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggerConfig {
        dir: dir.path().join("log").display().to_string(),
        file_name: "webhook-testkit".to_string(),
        max_backups: 1,
        local_time: false,
    };

    StructuredLogger::init("debug", Some(config)).unwrap();
    StructuredLogger::log_info("plan ready", Some("20250101_120000"), None, Some(json!({"records": 21})));
    StructuredLogger::log_warning("retrying", Some("20250101_120000"), Some("20250101_120000_001"));
    StructuredLogger::log_error("gave up", None, None);

    let entries: Vec<_> = std::fs::read_dir(dir.path().join("log"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1);
    let file_name = entries[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("webhook-testkit."));
    assert!(file_name.ends_with("error.log"));

    let contents = std::fs::read_to_string(&entries[0]).unwrap();
    assert!(contents.contains("retrying"));
    assert!(contents.contains("gave up"));
    assert!(!contents.contains("plan ready"));
}
