use std::path::{Path, PathBuf};

use webhook_testkit::config::{
    AppConfig, Distribution, HarnessConfig, HarnessOverrides, WebClientConfig,
};
use webhook_testkit::utils::error::AppError;

const HARNESS_YAML: &str = r#"
test_name: Monitorbase smoke
integration_type: monitorbase
webhook_url: https://hooks.example.com/monitorbase
superuser_api_key: secret
test_records: 6
distribution: even
processing_delay: 0
payload_schema: payload_schema.json
test_users:
  - name: Alice
    email: alice@example.com
    user_id: 1
    team_id: 10
  - name: Bob
    email: bob@example.com
    user_id: 2
    team_id: 20
"#;

fn harness_from(yaml: &str) -> Result<HarnessConfig, AppError> {
    HarnessConfig::from_yaml_str(yaml, Path::new("/etc/harness"))
}

#[test]
fn test_web_client_config_defaults() {
    let config = WebClientConfig::default();

    assert_eq!(config.timeout, 30);
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.retry_delay, 5);
    assert_eq!(config.concurrent_requests, 5);
}

#[test]
fn test_app_config_defaults_without_file() {
    let config = AppConfig::load_from("definitely-missing-config.yaml").unwrap();

    assert_eq!(config.storage.data_dir, Path::new("."));
    assert_eq!(config.storage.schemas_dir, Path::new("schemas"));
    assert_eq!(config.webclient.timeout, 30);
    assert_eq!(config.webclient.concurrent_requests, 5);
    assert_eq!(config.logger.file_name, "webhook-testkit");
    assert_eq!(config.logger.max_backups, 7);
}

#[test]
fn test_app_config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.yaml");
    std::fs::write(
        &path,
        "storage:\n  schemas_dir: custom/schemas\nwebclient:\n  timeout: 10\n",
    )
    .unwrap();

    let config = AppConfig::load_from(path.to_str().unwrap()).unwrap();

    assert_eq!(config.storage.schemas_dir, Path::new("custom/schemas"));
    assert_eq!(config.storage.data_dir, Path::new("."));
    assert_eq!(config.webclient.timeout, 10);
    assert_eq!(config.webclient.max_retries, 3);
}

#[test]
fn test_harness_config_defaults_and_relative_schema() {
    let config = harness_from(HARNESS_YAML).unwrap();

    assert_eq!(config.distribution, Distribution::Even);
    assert_eq!(config.api_base_url, "https://app.getbonzo.com");
    assert_eq!(config.api_page_limit, 100);
    assert_eq!(config.min_success_rate, 95.0);
    assert_eq!(config.min_creation_rate, 90.0);
    assert_eq!(config.test_data_settings.first_name_pattern, "TestRecord");
    assert_eq!(config.webhook_settings.concurrent_requests, 5);
    assert_eq!(config.payload_schema, Path::new("/etc/harness/payload_schema.json"));
}

#[test]
fn test_harness_patterns_embed_integration_and_run() {
    let config = harness_from(HARNESS_YAML).unwrap();

    assert_eq!(config.contact_tag("20250101_120000"), "Monitorbase_20250101_120000");
    assert_eq!(
        config.test_pattern("20250101_120000"),
        "TestRecord_Monitorbase_20250101_120000"
    );
    assert_eq!(config.integration_pattern(), "TestRecord_Monitorbase");
}

#[test]
fn test_harness_delivery_url_falls_back_without_superuser_url() {
    let config = harness_from(HARNESS_YAML).unwrap();
    assert_eq!(config.delivery_url(true), "https://hooks.example.com/monitorbase");

    let yaml = format!(
        "{}superuser_webhook_url: https://hooks.example.com/su\n",
        HARNESS_YAML
    );
    let config = harness_from(&yaml).unwrap();
    assert_eq!(config.delivery_url(true), "https://hooks.example.com/su");
    assert_eq!(config.delivery_url(false), "https://hooks.example.com/monitorbase");
}

#[test]
fn test_harness_rejects_duplicate_user_emails() {
    let yaml = HARNESS_YAML.replace("bob@example.com", "ALICE@example.com");
    let err = harness_from(&yaml).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("duplicate test user email"));
}

#[test]
fn test_harness_rejects_non_http_webhook_url() {
    let yaml = HARNESS_YAML.replace("https://hooks.example.com/monitorbase", "ftp://hooks.example.com");
    assert!(harness_from(&yaml).unwrap_err().is_configuration());
}

#[test]
fn test_harness_custom_counts_must_match_total() {
    let yaml = HARNESS_YAML
        .replace("distribution: even", "distribution: custom")
        .replace("team_id: 10", "team_id: 10\n    count: 4")
        .replace("team_id: 20", "team_id: 20\n    count: 1");

    let err = harness_from(&yaml).unwrap_err();
    assert!(err.to_string().contains("custom counts add up to 5"));
}

#[test]
fn test_harness_malformed_yaml_is_configuration_error() {
    let err = harness_from("test_name: [unclosed").unwrap_err();
    assert!(matches!(err, AppError::Yaml(_)));
    assert!(err.is_configuration());
}

#[test]
fn test_harness_overrides_are_validated() {
    let mut config = harness_from(HARNESS_YAML).unwrap();

    config
        .apply_overrides(&HarnessOverrides {
            test_records: Some(9),
            processing_delay: Some(2),
            ..HarnessOverrides::default()
        })
        .unwrap();
    assert_eq!(config.test_records, 9);
    assert_eq!(config.processing_delay, 2);

    let result = config.apply_overrides(&HarnessOverrides {
        test_records: Some(0),
        ..HarnessOverrides::default()
    });
    assert!(result.is_err());
}

#[test]
fn test_harness_reports_dir_falls_back_to_storage_setting() {
    let mut config = harness_from(HARNESS_YAML).unwrap();
    assert_eq!(config.reports_dir(), Path::new("reports/integration_health_reports"));

    config
        .apply_overrides(&HarnessOverrides {
            reports_dir: Some(PathBuf::from("/var/reports")),
            ..HarnessOverrides::default()
        })
        .unwrap();
    assert_eq!(config.reports_dir(), Path::new("/var/reports"));

    let yaml = format!("{}reports_dir: own_reports\n", HARNESS_YAML);
    let mut config = harness_from(&yaml).unwrap();
    config
        .apply_overrides(&HarnessOverrides {
            reports_dir: Some(PathBuf::from("/var/reports")),
            ..HarnessOverrides::default()
        })
        .unwrap();
    assert_eq!(config.reports_dir(), Path::new("own_reports"));
}

#[test]
fn test_harness_missing_file() {
    let err = HarnessConfig::from_file("/nonexistent/harness.yaml").unwrap_err();
    assert!(err.to_string().contains("Harness configuration file not found"));
}
