//! Journal, scenario and pattern cleanup through the handler cascades.

use ntest::timeout;
use serde_json::json;

use scenario_core::{
    CleanupEngine, Fields, HandlerRegistry, MemoryStore, RecordStore, ScenarioMaterializer,
};

use crate::helpers::{chain_scenario, sandbox, test_config, write_scenario, FlakyLookupStore};

const SANDBOX_TYPES: &[&str] = &[
    "Account",
    "Individual",
    "Contact",
    "ContactPointTypeConsent",
    "Vehicle",
    "Asset",
    "AssetAccountParticipant",
];

fn assert_empty(store: &MemoryStore) {
    for object_type in SANDBOX_TYPES {
        assert_eq!(store.count(object_type), 0, "{object_type} left behind");
    }
}

#[timeout(5000)]
#[test]
fn test_journal_cleanup_reverses_creation_order() {
    let (_dir, scenario) = chain_scenario();
    let store = sandbox();
    let handlers = HandlerRegistry::with_builtin_handlers();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());
    materializer.run(&scenario).unwrap();
    let (_, journal) = materializer.into_parts();

    let engine = CleanupEngine::new(&store, &handlers, test_config());
    let report = engine.cleanup_journal(&journal);
    assert!(report.is_clean(), "{:?}", report.errors);

    let order: Vec<&str> = report.deleted.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "AssetAccountParticipant",
            "Vehicle",
            "Asset",
            "ContactPointTypeConsent",
            "Contact",
            "Account",
            "Individual",
        ]
    );
    assert_empty(&store);

    // Rerunning against deleted records is a no-op, not an error.
    let again = engine.cleanup_journal(&journal);
    assert!(again.is_clean());
    assert_eq!(again.deleted_total(), 0);
    assert_eq!(again.already_gone, 3);
}

#[timeout(5000)]
#[test]
fn test_scenario_cleanup_without_journal() {
    let (_dir, scenario) = chain_scenario();
    let store = sandbox();
    let handlers = HandlerRegistry::with_builtin_handlers();
    ScenarioMaterializer::new(&store, &handlers, test_config())
        .run(&scenario)
        .unwrap();

    let engine = CleanupEngine::new(&store, &handlers, test_config());
    let report = engine.cleanup_scenario(&scenario);
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.deleted[0], ("AssetAccountParticipant".to_string(), 1));
    assert_empty(&store);

    let again = engine.cleanup_scenario(&scenario);
    assert!(again.is_clean());
    assert_eq!(again.deleted_total(), 0);
}

#[timeout(5000)]
#[test]
fn test_scenario_cleanup_matches_alias_when_name_is_missing() {
    let (_dir, scenario) = write_scenario(&[("01_BranchUnit.csv", "_BaseName,Status\nBU-North,Draft\n")]);
    let store = MemoryStore::new();
    let mut fields = Fields::new();
    fields.insert("Name".into(), json!("Region BU-North 01"));
    store.create("BranchUnit", &fields).unwrap();
    fields.insert("Name".into(), json!("BU-South"));
    store.create("BranchUnit", &fields).unwrap();

    let handlers = HandlerRegistry::new();
    let report = CleanupEngine::new(&store, &handlers, test_config()).cleanup_scenario(&scenario);
    assert_eq!(report.deleted, vec![("BranchUnit".to_string(), 1)]);
    assert_eq!(store.records("BranchUnit")[0].str_field("Name"), Some("BU-South"));
}

#[timeout(5000)]
#[test]
fn test_scenario_cleanup_continues_past_failed_lookup() {
    let (_dir, scenario) = write_scenario(&[(
        "01_Lead.csv",
        "_BaseName,Name\nL1,First Lead\nL2,Second Lead\nL3,Third Lead\n",
    )]);
    let store = FlakyLookupStore {
        inner: MemoryStore::new(),
        fail_name: "First Lead",
    };
    for name in ["First Lead", "Second Lead", "Third Lead"] {
        let mut fields = Fields::new();
        fields.insert("Name".into(), json!(name));
        store.create("Lead", &fields).unwrap();
    }

    let handlers = HandlerRegistry::new();
    let report = CleanupEngine::new(&store, &handlers, test_config()).cleanup_scenario(&scenario);
    assert_eq!(report.deleted, vec![("Lead".to_string(), 2)]);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("First Lead"), "{:?}", report.errors);

    let left = store.inner.records("Lead");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].str_field("Name"), Some("First Lead"));
}

#[timeout(5000)]
#[test]
fn test_scenario_cleanup_matches_rows_that_no_longer_transform() {
    let (_dir, scenario) = write_scenario(&[(
        "01_Opportunity.csv",
        "_BaseName,Name,CloseDate__date\nO1,Lost Deal,not-a-number\n",
    )]);
    let store = MemoryStore::new();
    let mut fields = Fields::new();
    fields.insert("Name".into(), json!("Lost Deal"));
    store.create("Opportunity", &fields).unwrap();

    let handlers = HandlerRegistry::new();
    let report = CleanupEngine::new(&store, &handlers, test_config()).cleanup_scenario(&scenario);
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.deleted, vec![("Opportunity".to_string(), 1)]);
    assert_eq!(store.count("Opportunity"), 0);
}

#[timeout(5000)]
#[test]
fn test_pattern_cleanup_applies_account_cascade() {
    let (_dir, scenario) = write_scenario(&[(
        "01_Account.csv",
        "_BaseName,Name\nL1,LostSale-1\nL2,LostSale-2\nK1,Keeper\n",
    )]);
    let store = sandbox();
    let handlers = HandlerRegistry::with_builtin_handlers();
    ScenarioMaterializer::new(&store, &handlers, test_config())
        .run(&scenario)
        .unwrap();
    assert_eq!(store.count("ContactPointTypeConsent"), 6);

    let engine = CleanupEngine::new(&store, &handlers, test_config());
    let report = engine.cleanup_pattern("Account", "LostSale%");
    assert!(report.is_clean());
    assert_eq!(store.count("Account"), 1);
    assert_eq!(store.count("Individual"), 1);
    assert_eq!(store.count("Contact"), 1);
    assert_eq!(store.count("ContactPointTypeConsent"), 2);

    let none = engine.cleanup_pattern("Account", "Nothing%");
    assert_eq!(none.deleted_total(), 0);
    assert!(none.is_clean());
}

#[test]
fn test_shared_individual_survives_while_referenced() {
    let store = MemoryStore::new();
    let individual = store.create("Individual", &Fields::new()).unwrap();
    let mut account = Fields::new();
    account.insert("PersonIndividualId".into(), json!(individual.as_str()));
    let first = store.create("Account", &account).unwrap();
    let second = store.create("Account", &account).unwrap();

    let handlers = HandlerRegistry::with_builtin_handlers();
    let handler = handlers.get("Account");

    handler.delete(&store, "Account", &[first]);
    assert_eq!(store.count("Individual"), 1);

    handler.delete(&store, "Account", &[second]);
    assert_eq!(store.count("Individual"), 0);
}
