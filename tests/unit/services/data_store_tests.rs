use serde_json::json;
use webhook_testkit::models::{Organization, Prospect, Webhook};
use webhook_testkit::services::DataStore;
use webhook_testkit::utils::error::AppError;

fn create_test_organization(id: &str) -> Organization {
    Organization {
        id: id.to_string(),
        name: format!("Org {}", id),
        owner_id: "42".to_string(),
        webhooks: vec![Webhook {
            name: "Zillow for Acme".to_string(),
            url: "https://hooks.example.com/zillow".to_string(),
        }],
    }
}

fn create_test_prospect(n: u64) -> Prospect {
    Prospect {
        first_name: format!("Prospect_org-1_{:03}", n),
        last_name: format!("Test{:03}", n),
        email: format!("prospect_org-1.{:03}@example.com", n),
        phone: format!("555-000-{:04}", n),
    }
}

fn open_store() -> (tempfile::TempDir, DataStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = DataStore::open(dir.path()).unwrap();
    (dir, store)
}

#[test]
fn test_open_creates_empty_files() {
    let (_dir, store) = open_store();

    assert!(store.org_webhooks_file().exists());
    assert!(store.generated_prospects_file().exists());
    assert!(store.organizations().unwrap().is_empty());
    assert_eq!(store.next_prospect_index("org-1").unwrap(), 1);
}

#[test]
fn test_legacy_wrapper_is_accepted() {
    let (_dir, store) = open_store();
    std::fs::write(
        store.org_webhooks_file(),
        json!({"organizations": [
            {"id": "org-1", "name": "Acme", "webhooks": []},
            "garbage"
        ]})
        .to_string(),
    )
    .unwrap();

    let organizations = store.organizations().unwrap();
    assert_eq!(organizations.len(), 1);
    assert_eq!(organizations[0].name, "Acme");
    assert_eq!(organizations[0].owner_id, "");
}

#[test]
fn test_unparseable_file_is_store_error() {
    let (_dir, store) = open_store();
    std::fs::write(store.org_webhooks_file(), "{not json").unwrap();

    assert!(matches!(store.organizations().unwrap_err(), AppError::Store { .. }));
}

#[test]
fn test_organization_crud() {
    let (_dir, store) = open_store();
    store.add_organization(create_test_organization("org-1")).unwrap();

    let err = store.add_organization(create_test_organization("org-1")).unwrap_err();
    assert!(matches!(err, AppError::Store { .. }));

    let updated = store.update_organization("org-1", Some("Renamed"), None).unwrap();
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.owner_id, "42");
    assert_eq!(store.organization("org-1").unwrap().name, "Renamed");

    assert!(store.update_organization("org-1", Some(" "), None).is_err());
    assert!(store.update_organization("org-9", Some("x"), None).is_err());

    store.delete_organization("org-1").unwrap();
    assert!(store.organizations().unwrap().is_empty());
    assert!(store.delete_organization("org-1").is_err());
}

#[test]
fn test_empty_organization_fields_rejected() {
    let (_dir, store) = open_store();
    let mut organization = create_test_organization("org-1");
    organization.name = "   ".to_string();

    assert!(matches!(
        store.add_organization(organization).unwrap_err(),
        AppError::Validation { .. }
    ));
}

#[test]
fn test_webhook_management() {
    let (_dir, store) = open_store();
    store.add_organization(create_test_organization("org-1")).unwrap();

    store
        .add_webhook(
            "org-1",
            Webhook {
                name: "Hubspot".to_string(),
                url: "http://localhost:9000/hook".to_string(),
            },
        )
        .unwrap();
    assert_eq!(store.organization("org-1").unwrap().webhooks.len(), 2);

    let duplicate = Webhook {
        name: "Hubspot".to_string(),
        url: "https://other.example.com".to_string(),
    };
    assert!(store.add_webhook("org-1", duplicate).is_err());

    let bad_scheme = Webhook {
        name: "Ftp".to_string(),
        url: "ftp://files.example.com".to_string(),
    };
    assert!(store.add_webhook("org-1", bad_scheme).is_err());

    store.delete_webhook("org-1", "Hubspot").unwrap();
    assert!(store.delete_webhook("org-1", "Hubspot").is_err());
    assert_eq!(store.organization("org-1").unwrap().webhooks.len(), 1);
}

#[test]
fn test_confirm_prospect_is_idempotent() {
    let (_dir, store) = open_store();
    let prospect = create_test_prospect(3);

    assert!(store.confirm_prospect("org-1", &prospect, 3).unwrap());
    assert!(!store.confirm_prospect("org-1", &prospect, 3).unwrap());

    let mut shouting = prospect.clone();
    shouting.email = shouting.email.to_uppercase();
    assert!(!store.confirm_prospect("org-1", &shouting, 3).unwrap());

    assert_eq!(store.existing_prospects("org-1").unwrap(), vec![prospect]);
    assert_eq!(store.next_prospect_index("org-1").unwrap(), 4);
}

#[test]
fn test_next_index_never_moves_backwards() {
    let (_dir, store) = open_store();

    store.confirm_prospect("org-1", &create_test_prospect(5), 5).unwrap();
    store.confirm_prospect("org-1", &create_test_prospect(2), 2).unwrap();

    assert_eq!(store.next_prospect_index("org-1").unwrap(), 6);
    assert_eq!(store.existing_prospects("org-1").unwrap().len(), 2);
    assert!(store.existing_prospects("org-2").unwrap().is_empty());
}

#[test]
fn test_delete_organization_drops_its_prospects() {
    let (_dir, store) = open_store();
    store.add_organization(create_test_organization("org-1")).unwrap();
    store.add_organization(create_test_organization("org-2")).unwrap();
    store.confirm_prospect("org-1", &create_test_prospect(1), 1).unwrap();
    store.confirm_prospect("org-2", &create_test_prospect(1), 1).unwrap();

    store.delete_organization("org-1").unwrap();

    assert!(store.existing_prospects("org-1").unwrap().is_empty());
    assert_eq!(store.existing_prospects("org-2").unwrap().len(), 1);
}

#[test]
fn test_stored_prospects_use_wire_layout() {
    let (_dir, store) = open_store();
    store.confirm_prospect("org-1", &create_test_prospect(1), 1).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.generated_prospects_file()).unwrap()).unwrap();
    assert_eq!(raw["org-1"]["next_prospect_index"], 2);
    assert_eq!(raw["org-1"]["prospects"][0]["firstName"], "Prospect_org-1_001");
}
