use chrono::{Local, TimeZone};
use serde_json::json;
use webhook_testkit::utils::error::AppError;
use webhook_testkit::utils::{
    is_present, json_path_exists, new_organization_id, read_required, record_id, slug,
    test_run_id_at, title_case, value_as_text, value_at_path, write_json_atomic,
};

#[test]
fn test_json_path_navigation() {
    let json = json!({
        "assigned_user": {"id": 1001, "email": "a@example.com"},
        "contacts": [{"email": "x@example.com"}, {"email": "y@example.com"}]
    });

    assert!(json_path_exists(&json, "assigned_user.email"));
    assert!(json_path_exists(&json, "contacts.[*].email"));
    assert!(!json_path_exists(&json, "assigned_user.team"));
    assert_eq!(value_at_path(&json, "contacts.1.email"), Some(&json!("y@example.com")));
    assert_eq!(value_at_path(&json, "assigned_user.id"), Some(&json!(1001)));
    assert_eq!(value_at_path(&json, "contacts.5.email"), None);
}

#[test]
fn test_value_text_and_presence() {
    assert_eq!(value_as_text(&json!("abc")), "abc");
    assert_eq!(value_as_text(&json!(501)), "501");
    assert_eq!(value_as_text(&json!(true)), "true");

    assert!(is_present(Some(&json!("x"))));
    assert!(is_present(Some(&json!(0))));
    assert!(!is_present(Some(&json!("  "))));
    assert!(!is_present(Some(&json!(null))));
    assert!(!is_present(None));
}

#[test]
fn test_run_and_record_ids() {
    let at = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
    let run_id = test_run_id_at(at);

    assert_eq!(run_id, "20250102_030405");
    assert_eq!(record_id(&run_id, 7), "20250102_030405_007");
    assert_eq!(record_id(&run_id, 1234), "20250102_030405_1234");
}

#[test]
fn test_organization_ids_are_unique() {
    let first = new_organization_id();
    let second = new_organization_id();

    assert!(first.starts_with("org-"));
    assert_eq!(first.len(), 4 + 32);
    assert_ne!(first, second);
}

#[test]
fn test_slug_and_title_case() {
    assert_eq!(slug("Prospect_Acme Realty"), "prospect_acme_realty");
    assert_eq!(slug("org-1"), "org-1");
    assert_eq!(title_case("monitorbase"), "Monitorbase");
    assert_eq!(title_case("lead_source"), "Lead_Source");
}

#[test]
fn test_atomic_write_replaces_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("data.json");

    write_json_atomic(&path, &json!({"v": 1})).unwrap();
    write_json_atomic(&path, &json!({"v": 2})).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(value, json!({"v": 2}));
    assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
}

#[test]
fn test_read_required_names_missing_file() {
    let err = read_required(std::path::Path::new("/nonexistent/schema.json"), "Payload schema").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("Payload schema not found"));
}

#[test]
fn test_error_classification() {
    assert!(AppError::api(503, "unavailable").is_transient());
    assert!(!AppError::api(401, "unauthorized").is_transient());
    assert!(!AppError::store("broken").is_transient());

    assert!(AppError::configuration("bad").is_configuration());
    assert!(!AppError::validation("bad").is_configuration());
    assert_eq!(
        AppError::api(401, "Unauthenticated.").to_string(),
        "API request failed with status 401: Unauthenticated."
    );
}

#[test]
fn test_variant_required_lists_choices() {
    let err = AppError::VariantRequired {
        partner: "Zillow".to_string(),
        variants: vec!["long_form".to_string(), "simple".to_string()],
    };
    assert_eq!(
        err.to_string(),
        "Partner 'Zillow' has several variants, choose one of: long_form, simple"
    );
}
