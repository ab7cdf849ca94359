//! Record CRUD, queries and error mapping over HTTP.

use std::time::Duration;

use ntest::timeout;
use serde_json::json;

use record_store_api::ServerConfig;
use scenario_core::{Fields, MemoryStore, PollPolicy, RecordFilter, RecordId, RecordStore, StoreError};

use crate::helpers::TestServer;

fn fields(pairs: &[(&str, serde_json::Value)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[timeout(10000)]
#[test]
fn test_crud_round_trip() {
    let server = TestServer::start(MemoryStore::new(), ServerConfig::default());
    let client = server.client();
    client.health().unwrap();

    let id = client
        .create("Lead", &fields(&[("Name", json!("Ada")), ("Phone", json!("555-0100"))]))
        .unwrap();
    assert_eq!(server.store.count("Lead"), 1);
    assert_eq!(
        client.fetch_field("Lead", &id, "Phone").unwrap(),
        Some(json!("555-0100"))
    );
    assert_eq!(client.fetch_field("Lead", &id, "Fax").unwrap(), None);

    client
        .update("Lead", &id, &fields(&[("Phone", json!(null)), ("Fax", json!("555-0200"))]))
        .unwrap();
    let stored = server.store.get("Lead", &id).unwrap();
    assert!(!stored.fields.contains_key("Phone"));
    assert_eq!(stored.fields["Fax"], json!("555-0200"));

    let found = client
        .query("Lead", &RecordFilter::name_like("ad%"))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);

    let results = client.delete("Lead", &[id.clone()]);
    assert!(results[0].1.is_ok());
    assert_eq!(server.store.count("Lead"), 0);
}

#[timeout(10000)]
#[test]
fn test_missing_records_map_to_not_found() {
    let server = TestServer::start(MemoryStore::new(), ServerConfig::default());
    let client = server.client();
    let ghost = RecordId::new("ACC000000000999");

    let results = client.delete("Account", &[ghost.clone()]);
    assert_eq!(
        results[0].1,
        Err(StoreError::NotFound {
            object_type: "Account".into(),
            id: ghost.to_string(),
        })
    );
    assert!(client
        .fetch_field("Account", &ghost, "Name")
        .unwrap_err()
        .is_not_found());
    assert!(client
        .update("Account", &ghost, &fields(&[("Name", json!("x"))]))
        .unwrap_err()
        .is_not_found());
}

#[timeout(10000)]
#[test]
fn test_rejected_update_carries_store_message() {
    let server = TestServer::start(MemoryStore::sandbox(), ServerConfig::default());
    let client = server.client();
    let id = client
        .create("Asset", &fields(&[("Name", json!("Asset One")), ("AccountId", json!("ACC1"))]))
        .unwrap();

    let err = client
        .update("Asset", &id, &fields(&[("AccountId", json!("ACC2"))]))
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::Rejected {
            object_type: "Asset".into(),
            message: "field 'AccountId' is not updateable".into(),
        }
    );
}

#[timeout(10000)]
#[test]
fn test_automation_fields_are_polled_over_http() {
    let server = TestServer::start(
        MemoryStore::sandbox().with_visibility_lag(2),
        ServerConfig::default(),
    );
    let client = server.client();
    let id = client
        .create("Vehicle", &fields(&[("Name", json!("Alpha Car"))]))
        .unwrap();

    let asset_id = client
        .poll_field("Vehicle", &id, "AssetId", &PollPolicy::new(5, Duration::ZERO))
        .unwrap();
    let asset = RecordId::new(asset_id.as_str().unwrap());
    assert!(server.store.get("Asset", &asset).is_some());
}

#[timeout(10000)]
#[test]
fn test_bearer_token_is_enforced() {
    let config = ServerConfig {
        token: Some("s3cret".into()),
        ..ServerConfig::default()
    };
    let server = TestServer::start(MemoryStore::new(), config);

    let anonymous = server.client();
    anonymous.health().unwrap();
    let err = anonymous.create("Lead", &Fields::new()).unwrap_err();
    assert!(matches!(err, StoreError::Transport(ref msg) if msg.contains("401")));

    let wrong = server.client_with_token(Some("guess"));
    assert!(wrong.query("Lead", &RecordFilter::name_like("%")).is_err());

    let authorized = server.client_with_token(Some("s3cret"));
    authorized.create("Lead", &Fields::new()).unwrap();
    assert_eq!(server.store.count("Lead"), 1);
}
