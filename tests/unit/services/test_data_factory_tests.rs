use std::collections::HashSet;
use std::path::Path;

use serde_json::json;
use webhook_testkit::config::{Distribution, HarnessConfig, TestUser};
use webhook_testkit::models::Schema;
use webhook_testkit::services::{distribute, TestDataFactory};

const RUN_ID: &str = "20250101_120000";

fn create_test_user(n: i64) -> TestUser {
    TestUser {
        name: format!("User {}", n),
        email: format!("user{}@example.com", n),
        user_id: 1000 + n,
        team_id: 500 + n,
        weight: None,
        count: None,
    }
}

fn create_test_config(records: usize) -> HarnessConfig {
    let yaml = format!(
        r#"
test_name: Monitorbase bulk
integration_type: monitorbase
webhook_url: https://hooks.example.com/monitorbase
superuser_api_key: key
test_records: {records}
processing_delay: 0
payload_schema: schema.json
test_users:
  - {{name: User 1, email: user1@example.com, user_id: 1001, team_id: 501}}
  - {{name: User 2, email: user2@example.com, user_id: 1002, team_id: 502}}
  - {{name: User 3, email: user3@example.com, user_id: 1003, team_id: 503}}
"#
    );
    HarnessConfig::from_yaml_str(&yaml, Path::new(".")).unwrap()
}

fn create_test_schema() -> Schema {
    let root = json!({
        "first_name": {"type": "string", "dynamic": "firstName"},
        "last_name": {"type": "string", "dynamic": "lastName"},
        "email": {"type": "string", "dynamic": "email"},
        "lo_email": {"type": "string", "dynamic": "userEmail"},
        "external_id": {"type": "string", "dynamic": "recordId"},
        "source": {"type": "string", "static": "Monitorbase"}
    });
    Schema::from_value(&root, "", "monitorbase", "default", "monitorbase_payload_schema.json").unwrap()
}

#[test]
fn test_even_distribution() {
    let users: Vec<TestUser> = (1..=3).map(create_test_user).collect();

    assert_eq!(distribute(&users, 21, Distribution::Even).unwrap(), vec![7, 7, 7]);
    assert_eq!(distribute(&users, 10, Distribution::Even).unwrap(), vec![4, 3, 3]);
    assert_eq!(distribute(&users, 2, Distribution::Even).unwrap(), vec![1, 1, 0]);
}

#[test]
fn test_weighted_distribution_uses_largest_remainder() {
    let mut users: Vec<TestUser> = (1..=2).map(create_test_user).collect();
    users[1].weight = Some(2);

    assert_eq!(distribute(&users, 10, Distribution::Weighted).unwrap(), vec![3, 7]);

    let users: Vec<TestUser> = (1..=3).map(create_test_user).collect();
    assert_eq!(distribute(&users, 10, Distribution::Weighted).unwrap(), vec![4, 3, 3]);
}

#[test]
fn test_weighted_distribution_rejects_zero_weights() {
    let mut users: Vec<TestUser> = (1..=2).map(create_test_user).collect();
    users.iter_mut().for_each(|u| u.weight = Some(0));

    assert!(distribute(&users, 10, Distribution::Weighted).is_err());
}

#[test]
fn test_custom_distribution() {
    let mut users: Vec<TestUser> = (1..=2).map(create_test_user).collect();
    users[0].count = Some(8);
    users[1].count = Some(2);

    assert_eq!(distribute(&users, 10, Distribution::Custom).unwrap(), vec![8, 2]);
    assert!(distribute(&users, 11, Distribution::Custom).is_err());

    users[1].count = None;
    assert!(distribute(&users, 8, Distribution::Custom).is_err());
}

#[test]
fn test_empty_user_list_is_rejected() {
    assert!(distribute(&[], 5, Distribution::Even).is_err());
}

#[test]
fn test_generate_records_grouped_by_user() {
    let factory = TestDataFactory::new(create_test_config(21), create_test_schema());
    let records = factory.generate_test_records(RUN_ID).unwrap();

    assert_eq!(records.len(), 21);
    for (user_index, chunk) in records.chunks(7).enumerate() {
        let email = format!("user{}@example.com", user_index + 1);
        assert!(chunk.iter().all(|r| r.user_email == email));
        assert!(chunk.iter().all(|r| r.payload["lo_email"] == email.as_str()));
    }

    let sequence: Vec<usize> = records.iter().map(|r| r.sequence_number).collect();
    assert_eq!(sequence, (1..=21).collect::<Vec<_>>());

    let first = &records[0];
    assert_eq!(first.record_id, "20250101_120000_001");
    assert_eq!(first.payload["external_id"], "20250101_120000_001");
    assert_eq!(first.contact.first_name, "TestRecord_Monitorbase_20250101_120000_001");
    assert_eq!(first.payload["source"], "Monitorbase");
    assert_eq!(records[7].user_id, 1002);
    assert_eq!(records[7].team_id, 502);
}

#[test]
fn test_generated_records_are_unique_and_valid() {
    let factory = TestDataFactory::new(create_test_config(21), create_test_schema());
    let records = factory.generate_test_records(RUN_ID).unwrap();

    let emails: HashSet<&str> = records.iter().map(|r| r.contact.email.as_str()).collect();
    assert_eq!(emails.len(), 21);

    let validation = factory.validate_records(&records);
    assert!(validation.is_valid(), "{:?}", validation.validation_errors);
    assert_eq!(validation.user_distribution["user2@example.com"], 7);
    assert!(validation.records_match);
}

#[test]
fn test_validation_flags_broken_records() {
    let factory = TestDataFactory::new(create_test_config(3), create_test_schema());
    let mut records = factory.generate_test_records(RUN_ID).unwrap();

    records[0].payload["first_name"] = json!("");
    records[1].payload.as_object_mut().unwrap().remove("email");
    records[1].payload.as_object_mut().unwrap().remove("lo_email");
    records[2].contact.email = records[0].contact.email.to_uppercase();

    let validation = factory.validate_records(&records);

    assert!(!validation.is_valid());
    assert!(!validation.emails_unique);
    assert!(validation.record_ids_unique);
    assert_eq!(validation.validation_errors.len(), 2);
    assert!(validation.validation_errors[0].contains("Missing first_name"));
    assert!(validation.validation_errors[1].contains("Missing email field"));
}

#[test]
fn test_validation_flags_count_mismatch() {
    let factory = TestDataFactory::new(create_test_config(6), create_test_schema());
    let records = factory.generate_test_records(RUN_ID).unwrap();

    let validation = factory.validate_records(&records[..5]);
    assert!(!validation.records_match);
    assert_eq!(validation.total_records, 5);
    assert_eq!(validation.expected_records, 6);
}

#[test]
fn test_export_writes_run_info_and_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.json");
    let factory = TestDataFactory::new(create_test_config(3), create_test_schema());
    let records = factory.generate_test_records(RUN_ID).unwrap();

    factory.export_records(&records, RUN_ID, &path).unwrap();

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(exported["test_run_info"]["run_id"], RUN_ID);
    assert_eq!(exported["test_run_info"]["total_records"], 3);
    assert_eq!(exported["test_records"].as_array().unwrap().len(), 3);
    assert_eq!(exported["test_records"][0]["contact"]["firstName"], records[0].contact.first_name.as_str());
}
