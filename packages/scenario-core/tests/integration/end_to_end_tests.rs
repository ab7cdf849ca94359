//! Full scenario runs against the sandbox store.

use ntest::timeout;
use serde_json::json;

use scenario_core::error::{FactoryError, ResolveError, SourceError, StoreError};
use scenario_core::store::OWNERSHIP_FIELD;
use scenario_core::{
    FileState, HandlerRegistry, MemoryStore, PollPolicy, Scenario,
    ScenarioMaterializer, SourceFile, Warning,
};

use crate::helpers::{
    by_name, chain_scenario, sandbox, test_config, write_scenario, RejectingStore, ACCOUNTS,
    PARTICIPANTS, VEHICLES,
};

#[timeout(5000)]
#[test]
fn test_account_vehicle_participant_chain() -> anyhow::Result<()> {
    let (_dir, scenario) = chain_scenario();
    let store = sandbox();
    let handlers = HandlerRegistry::with_builtin_handlers();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());

    let report = materializer.run(&scenario)?;
    assert_eq!(report.files.len(), 3);
    assert!(report.files.iter().all(|f| f.state == FileState::Done));
    assert_eq!(report.created(), 3);
    assert_eq!(report.warnings().count(), 0);

    let account = by_name(&store, "Account", "Alpha Account");
    let vehicle = by_name(&store, "Vehicle", "Alpha Car");
    let participant = by_name(&store, "AssetAccountParticipant", "Alpha Owner");

    assert_eq!(vehicle.str_field("AccountId"), Some(account.id.as_str()));
    let asset_id = vehicle.str_field("AssetId").unwrap();
    assert_eq!(participant.str_field("AssetId"), Some(asset_id));
    assert_eq!(participant.str_field("AccountId"), Some(account.id.as_str()));

    // The insert trigger resets the flag; the handler puts it back.
    assert_eq!(participant.fields[OWNERSHIP_FIELD], json!(true));

    let registry = materializer.registry();
    assert_eq!(registry.get("VehA").unwrap().captured["AssetId"], json!(asset_id));
    assert_eq!(
        registry.get("AcctA").unwrap().captured["PersonContactId"],
        account.fields["PersonContactId"]
    );
    assert_eq!(materializer.journal().len(), 3);
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_out_of_order_files_fail_with_unresolved_alias() {
    let (dir, _) = chain_scenario();
    let files: Vec<SourceFile> = ["02_Vehicle.csv", "01_Account.csv"]
        .iter()
        .map(|name| SourceFile::from_path(&dir.path().join(name)).unwrap())
        .collect();
    let scenario = Scenario::from_files(dir.path(), files);

    let store = sandbox();
    let handlers = HandlerRegistry::with_builtin_handlers();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());

    let failure = materializer.run(&scenario).unwrap_err();
    assert_eq!(failure.file, "02_Vehicle.csv");
    assert_eq!(
        failure.error,
        FactoryError::Resolve {
            file: "02_Vehicle.csv".into(),
            line: 2,
            source: ResolveError::UnresolvedAlias {
                alias: "AcctA".into(),
                column: "_Ref:AccountId".into(),
            },
        }
    );
    assert_eq!(failure.report.files.len(), 1);
    assert_eq!(failure.report.files[0].state, FileState::Failed);
    assert_eq!(failure.report.files[0].failed, 1);

    // Nothing written, later files never attempted.
    assert_eq!(store.count("Vehicle"), 0);
    assert_eq!(store.count("Account"), 0);
}

#[timeout(5000)]
#[test]
fn test_deep_reference_without_capture_fails() {
    let vehicles_without_return = "_BaseName,Name,_Ref:AccountId\nVehA,Alpha Car,AcctA\n";
    let (_dir, scenario) = write_scenario(&[
        ("01_Account.csv", ACCOUNTS),
        ("02_Vehicle.csv", vehicles_without_return),
        ("03_AssetAccountParticipant.csv", PARTICIPANTS),
    ]);
    let store = sandbox();
    let handlers = HandlerRegistry::with_builtin_handlers();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());

    let failure = materializer.run(&scenario).unwrap_err();
    assert_eq!(failure.file, "03_AssetAccountParticipant.csv");
    assert!(matches!(
        failure.error,
        FactoryError::Resolve {
            source: ResolveError::UnresolvedField { .. },
            ..
        }
    ));
    assert_eq!(failure.report.created(), 2);
    assert_eq!(store.count("AssetAccountParticipant"), 0);
}

#[timeout(5000)]
#[test]
fn test_capture_failure_is_a_warning() {
    let (_dir, scenario) = write_scenario(&[
        ("01_Account.csv", ACCOUNTS),
        ("02_Vehicle.csv", VEHICLES),
    ]);
    let store = MemoryStore::sandbox().with_visibility_lag(50);
    let handlers = HandlerRegistry::with_builtin_handlers();
    let mut config = test_config();
    config.capture_poll = PollPolicy::new(2, Default::default());
    config.automation_poll = PollPolicy::new(2, Default::default());
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, config);

    let report = materializer.run(&scenario).unwrap();
    assert_eq!(report.created(), 2);
    let vehicle_warnings = &report.file("02_Vehicle.csv").unwrap().warnings;
    assert!(matches!(
        &vehicle_warnings[..],
        [Warning::CaptureFailed { alias, field, .. }] if alias == "VehA" && field == "AssetId"
    ));
    // PersonContactId never showed up either.
    assert_eq!(report.file("01_Account.csv").unwrap().warnings.len(), 1);
    assert!(materializer.registry().get("VehA").unwrap().captured.is_empty());
}

#[timeout(5000)]
#[test]
fn test_relative_dates_use_the_run_date() {
    let (_dir, scenario) = write_scenario(&[(
        "01_Opportunity.csv",
        "Name,CloseDate__date,StageName\nDeal,5,Prospecting\nPast deal,-10,Closed Won\n",
    )]);
    let store = sandbox();
    let handlers = HandlerRegistry::with_builtin_handlers();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());
    materializer.run(&scenario).unwrap();

    assert_eq!(by_name(&store, "Opportunity", "Deal").fields["CloseDate"], json!("2025-01-15"));
    assert_eq!(
        by_name(&store, "Opportunity", "Past deal").fields["CloseDate"],
        json!("2024-12-31")
    );
}

#[timeout(5000)]
#[test]
fn test_consent_controls_update_individual_and_consents() {
    let (_dir, scenario) = write_scenario(&[(
        "01_Account.csv",
        "_BaseName,Name,_HasOptedOutSolicit,_EmailConsent,_EffectiveTo__date\n\
         AcctC,Consenting Customer,TRUE,OptIn,30\n",
    )]);
    let store = sandbox();
    let handlers = HandlerRegistry::with_builtin_handlers();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());
    let report = materializer.run(&scenario).unwrap();
    assert_eq!(report.warnings().count(), 0);

    let account = by_name(&store, "Account", "Consenting Customer");
    let individual_id = account.str_field("PersonIndividualId").unwrap();
    let individual = store.get("Individual", &individual_id.into()).unwrap();
    assert_eq!(individual.fields["HasOptedOutSolicit"], json!(true));

    let consents = store.records("ContactPointTypeConsent");
    assert_eq!(consents.len(), 2);
    for consent in consents {
        match consent.str_field("EngagementChannelType") {
            Some("Email") => {
                assert_eq!(consent.fields["PrivacyConsentStatus"], json!("OptIn"));
                assert_eq!(consent.fields["EffectiveTo"], json!("2025-02-09"));
            }
            Some("SMS") => {
                assert_eq!(consent.fields["PrivacyConsentStatus"], json!("OptOut"));
                assert!(!consent.fields.contains_key("EffectiveTo"));
            }
            other => panic!("unexpected channel {other:?}"),
        }
    }
}

#[test]
fn test_malformed_file_aborts_before_any_write() {
    let (_dir, scenario) = write_scenario(&[
        ("01_Account.csv", "_BaseName,Name\nAcctA,Alpha\nAcctB\n"),
        ("02_Vehicle.csv", VEHICLES),
    ]);
    let store = MemoryStore::new();
    let handlers = HandlerRegistry::new();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());

    let failure = materializer.run(&scenario).unwrap_err();
    assert!(matches!(
        failure.error,
        FactoryError::Source(SourceError::MalformedSource { line: 3, .. })
    ));
    assert_eq!(failure.report.files[0].state, FileState::Failed);
    assert_eq!(store.count("Account"), 0);
}

#[timeout(5000)]
#[test]
fn test_rejected_write_stops_the_scenario() {
    let (_dir, scenario) = chain_scenario();
    let store = RejectingStore {
        inner: sandbox(),
        reject: "Vehicle",
    };
    let handlers = HandlerRegistry::with_builtin_handlers();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());

    let failure = materializer.run(&scenario).unwrap_err();
    assert!(matches!(
        &failure.error,
        FactoryError::RemoteWrite { object_type, source: StoreError::Rejected { .. }, .. }
            if object_type == "Vehicle"
    ));
    assert_eq!(failure.report.files.len(), 2);
    assert_eq!(store.inner.count("Account"), 1);
    assert_eq!(store.inner.count("AssetAccountParticipant"), 0);
    assert_eq!(materializer.journal().len(), 1);
}

#[test]
fn test_rows_without_alias_or_fields_are_skipped() {
    let (_dir, scenario) = write_scenario(&[(
        "01_BranchUnit.csv",
        "_BaseName,Name,_Comment\nBU1,North,first\n,,only a comment\n",
    )]);
    let store = MemoryStore::new();
    let handlers = HandlerRegistry::new();
    let mut materializer = ScenarioMaterializer::new(&store, &handlers, test_config());

    let report = materializer.run(&scenario).unwrap();
    let file = report.file("01_BranchUnit.csv").unwrap();
    assert_eq!((file.created, file.skipped), (1, 1));
    assert!(!store.records("BranchUnit")[0].fields.contains_key("_Comment"));
}
