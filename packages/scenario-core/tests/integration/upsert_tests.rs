//! Upsert matching, update-suffix files and immutable-field shaping.

use ntest::timeout;
use serde_json::json;

use scenario_core::error::{FactoryError, StoreError};
use scenario_core::{
    FactoryConfig, FileMode, Fields, HandlerRegistry, MemoryStore, RecordStore,
    ScenarioMaterializer, Warning,
};

use crate::helpers::{by_name, chain_scenario, sandbox, test_config, write_scenario};

fn upsert_config() -> FactoryConfig {
    FactoryConfig {
        force_upsert: true,
        ..test_config()
    }
}

#[timeout(5000)]
#[test]
fn test_upsert_twice_keeps_one_record_per_alias() {
    let (_dir, scenario) = chain_scenario();
    let store = sandbox();
    let handlers = HandlerRegistry::with_builtin_handlers();

    let first = ScenarioMaterializer::new(&store, &handlers, upsert_config())
        .run(&scenario)
        .unwrap();
    assert_eq!((first.created(), first.updated()), (3, 0));

    let mut rerun = ScenarioMaterializer::new(&store, &handlers, upsert_config());
    let second = rerun.run(&scenario).unwrap();
    assert_eq!((second.created(), second.updated()), (0, 3));
    assert!(second.files.iter().all(|f| f.mode == FileMode::Upsert));

    for object_type in ["Account", "Vehicle", "Asset", "AssetAccountParticipant"] {
        assert_eq!(store.count(object_type), 1, "{object_type}");
    }
    // The rerun captured the same asset again.
    let vehicle = by_name(&store, "Vehicle", "Alpha Car");
    assert_eq!(
        rerun.registry().get("VehA").unwrap().captured["AssetId"],
        vehicle.fields["AssetId"]
    );
    assert!(rerun.journal().is_empty());
}

#[timeout(5000)]
#[test]
fn test_update_suffix_file_strips_immutable_fields() {
    let (_dir, scenario) = write_scenario(&[
        ("01_Account.csv", "_BaseName,Name\nAcctA,Alpha Account\n"),
        (
            "02_Asset.csv",
            "_BaseName,Name,_Ref:AccountId,SerialNumber\nAssetA,Asset One,AcctA,SN-1\n",
        ),
        (
            "03_Asset_update.csv",
            "_BaseName,Name,_Ref:AccountId,SerialNumber\nAssetA,Asset One,AcctA,SN-2\n",
        ),
    ]);
    let store = sandbox();
    let handlers = HandlerRegistry::with_builtin_handlers();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());

    let report = materializer.run(&scenario).unwrap();
    let update = report.file("03_Asset_update.csv").unwrap();
    assert_eq!(update.mode, FileMode::Upsert);
    assert_eq!((update.created, update.updated), (0, 1));
    assert_eq!(
        update.warnings,
        vec![Warning::ImmutableFieldStripped {
            line: 2,
            field: "AccountId".into()
        }]
    );
    assert_eq!(report.file("02_Asset.csv").unwrap().mode, FileMode::Create);

    let asset = by_name(&store, "Asset", "Asset One");
    assert_eq!(asset.fields["SerialNumber"], json!("SN-2"));
}

#[timeout(5000)]
#[test]
fn test_update_without_handler_is_rejected_by_the_store() {
    let (_dir, scenario) = write_scenario(&[
        ("01_Asset.csv", "_BaseName,Name,AccountId\nAssetA,Asset One,ACC1\n"),
        ("02_Asset_update.csv", "_BaseName,Name,AccountId\nAssetA,Asset One,ACC2\n"),
    ]);
    let store = sandbox();
    let handlers = HandlerRegistry::new();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());

    let failure = materializer.run(&scenario).unwrap_err();
    assert_eq!(failure.file, "02_Asset_update.csv");
    assert!(matches!(
        failure.error,
        FactoryError::RemoteWrite {
            source: StoreError::Rejected { .. },
            ..
        }
    ));
}

#[test]
fn test_branch_unit_update_file_updates_in_place() {
    let (_dir, scenario) = write_scenario(&[
        ("01_BranchUnit.csv", "_BaseName,Name,Status\nBU1,North Branch,Draft\n"),
        (
            "02_BranchUnitBusinessMember.csv",
            "_BaseName,Name,_Ref:BranchUnitId\nBM1,North Manager,BU1\n",
        ),
        (
            "03_BranchUnit_update.csv",
            "_BaseName,Status,_Ref:ManagerId\nBU1,Active,BM1\n",
        ),
    ]);
    let store = MemoryStore::new();
    let handlers = HandlerRegistry::with_builtin_handlers();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());

    let report = materializer.run(&scenario).unwrap();
    assert_eq!(report.file("03_BranchUnit_update.csv").unwrap().updated, 1);
    assert_eq!(store.count("BranchUnit"), 1);

    let branch = by_name(&store, "BranchUnit", "North Branch");
    let member = by_name(&store, "BranchUnitBusinessMember", "North Manager");
    assert_eq!(branch.fields["Status"], json!("Active"));
    assert_eq!(branch.str_field("ManagerId"), Some(member.id.as_str()));
}

#[test]
fn test_fuzzy_match_on_alias_in_name() {
    let store = MemoryStore::new();
    let mut existing = Fields::new();
    existing.insert("Name".into(), json!("QA - acctz - 2024"));
    existing.insert("Phone".into(), json!("555-0199"));
    let id = store.create("Account", &existing).unwrap();

    let (_dir, scenario) = write_scenario(&[(
        "01_Account_update.csv",
        "_BaseName,Phone,Fax\nAcctZ,#N/A,555-0200\n",
    )]);
    let handlers = HandlerRegistry::new();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());
    let report = materializer.run(&scenario).unwrap();

    assert_eq!(report.updated(), 1);
    assert_eq!(store.count("Account"), 1);
    assert_eq!(materializer.registry().get("AcctZ").unwrap().remote_id, id);

    let record = store.get("Account", &id).unwrap();
    assert!(!record.fields.contains_key("Phone"), "#N/A clears on update");
    assert_eq!(record.fields["Fax"], json!("555-0200"));
}

#[test]
fn test_clear_literal_is_omitted_on_create() {
    let (_dir, scenario) = write_scenario(&[("01_Lead.csv", "Name,Phone\nNew Lead,#N/A\n")]);
    let store = MemoryStore::new();
    let handlers = HandlerRegistry::new();
    ScenarioMaterializer::new(&store, &handlers, upsert_config())
        .run(&scenario)
        .unwrap();

    let lead = by_name(&store, "Lead", "New Lead");
    assert!(!lead.fields.contains_key("Phone"));
}

#[test]
fn test_config_upsert_key_override() {
    let store = MemoryStore::new();
    let mut existing = Fields::new();
    existing.insert("Name".into(), json!("Old name"));
    existing.insert("ExternalCode".into(), json!("X-1"));
    let id = store.create("Product2", &existing).unwrap();

    let (_dir, scenario) = write_scenario(&[(
        "01_Product2_update.csv",
        "ExternalCode,Name\nX-1,New name\n",
    )]);
    let mut config = test_config();
    config
        .upsert_keys
        .insert("Product2".to_string(), "ExternalCode".to_string());
    let handlers = HandlerRegistry::new();
    ScenarioMaterializer::new(&store, &handlers, config)
        .run(&scenario)
        .unwrap();

    assert_eq!(store.count("Product2"), 1);
    assert_eq!(store.get("Product2", &id).unwrap().fields["Name"], json!("New name"));
}

#[test]
fn test_alias_prefix_of_another_alias_gets_its_own_record() {
    let store = MemoryStore::new();
    let handlers = HandlerRegistry::new();
    let (_dir, scenario) = write_scenario(&[(
        "01_Account.csv",
        "_BaseName,Name\nAcct10,Acct10 Corp\nAcct1,Acct1 Corp\n",
    )]);

    let mut materializer = ScenarioMaterializer::new(&store, &handlers, upsert_config());
    let report = materializer.run(&scenario).unwrap();
    assert_eq!((report.created(), report.updated()), (2, 0));
    assert_eq!(store.count("Account"), 2);

    let long = by_name(&store, "Account", "Acct10 Corp");
    let short = by_name(&store, "Account", "Acct1 Corp");
    assert_eq!(materializer.registry().get("Acct10").unwrap().remote_id, long.id);
    assert_eq!(materializer.registry().get("Acct1").unwrap().remote_id, short.id);

    // A fresh run finds both again by exact name.
    let rerun = ScenarioMaterializer::new(&store, &handlers, upsert_config())
        .run(&scenario)
        .unwrap();
    assert_eq!((rerun.created(), rerun.updated()), (0, 2));
    assert_eq!(store.count("Account"), 2);
}

#[test]
fn test_alias_prefix_across_files_does_not_steal_earlier_record() {
    let store = MemoryStore::new();
    let handlers = HandlerRegistry::new();
    let (_dir, scenario) = write_scenario(&[
        ("01_Account.csv", "_BaseName,Name\nAcct10,Acct10 Corp\n"),
        ("02_Account_update.csv", "_BaseName,Name,Phone\nAcct1,Acct1 Corp,555-0101\n"),
    ]);

    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());
    let report = materializer.run(&scenario).unwrap();
    assert_eq!(report.file("02_Account_update.csv").unwrap().created, 1);
    assert_eq!(store.count("Account"), 2);

    let long = by_name(&store, "Account", "Acct10 Corp");
    assert!(!long.fields.contains_key("Phone"));
    let short = by_name(&store, "Account", "Acct1 Corp");
    assert_ne!(long.id, short.id);
    assert_eq!(materializer.registry().get("Acct1").unwrap().remote_id, short.id);
}
