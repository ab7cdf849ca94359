//! Scenario runs and cleanup with the engine talking HTTP.

use std::fs;
use std::time::Duration;

use chrono::NaiveDate;
use ntest::timeout;
use serde_json::json;

use record_store_api::ServerConfig;
use scenario_core::{
    CleanupEngine, FactoryConfig, FileState, HandlerRegistry, MemoryStore, PollPolicy,
    RecordFilter, RecordStore, Scenario, ScenarioMaterializer,
};

use crate::helpers::TestServer;

fn config() -> FactoryConfig {
    FactoryConfig {
        today: NaiveDate::from_ymd_opt(2025, 1, 10),
        capture_poll: PollPolicy::new(5, Duration::ZERO),
        automation_poll: PollPolicy::new(5, Duration::ZERO),
        ..FactoryConfig::default()
    }
}

fn chain_scenario() -> (tempfile::TempDir, Scenario) {
    let dir = tempfile::tempdir().unwrap();
    let files = [
        (
            "01_Account.csv",
            "_BaseName,Name,_EmailConsent,_EffectiveTo__date\nAcctA,Alpha Account,OptIn,30\n",
        ),
        (
            "02_Vehicle.csv",
            "_BaseName,Name,_Ref:AccountId,_Return:AssetId\nVehA,Alpha Car,AcctA,\n",
        ),
        (
            "03_AssetAccountParticipant.csv",
            "_BaseName,Name,_Ref:AssetId,_Ref:AccountId,AUTO360__IsOwnership__c\n\
             PartA,Alpha Owner,VehA.AssetId,AcctA,TRUE\n",
        ),
    ];
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    let scenario = Scenario::open(dir.path()).unwrap();
    (dir, scenario)
}

#[timeout(20000)]
#[test]
fn test_chain_scenario_over_http_then_cleanup() -> anyhow::Result<()> {
    let server = TestServer::start(
        MemoryStore::sandbox().with_visibility_lag(2),
        ServerConfig::default(),
    );
    let client = server.client();
    let handlers = HandlerRegistry::with_builtin_handlers();
    let (_dir, scenario) = chain_scenario();

    let mut materializer = ScenarioMaterializer::new(&client, &handlers, config());
    let report = materializer.run(&scenario)?;
    assert!(report.files.iter().all(|f| f.state == FileState::Done));
    assert_eq!(report.created(), 3);
    assert_eq!(report.warnings().count(), 0);

    let participants = client.query(
        "AssetAccountParticipant",
        &RecordFilter::equals("Name", "Alpha Owner"),
    )?;
    assert_eq!(participants[0].fields["AUTO360__IsOwnership__c"], json!(true));

    let email = client.query(
        "ContactPointTypeConsent",
        &RecordFilter::equals("EngagementChannelType", "Email"),
    )?;
    assert_eq!(email[0].fields["PrivacyConsentStatus"], json!("OptIn"));
    assert_eq!(email[0].fields["EffectiveTo"], json!("2025-02-09"));

    let (_, journal) = materializer.into_parts();
    let cleanup = CleanupEngine::new(&client, &handlers, config()).cleanup_journal(&journal);
    assert!(cleanup.is_clean(), "{:?}", cleanup.errors);
    for object_type in ["Account", "Individual", "Contact", "Vehicle", "Asset"] {
        assert_eq!(server.store.count(object_type), 0, "{object_type}");
    }
    assert_eq!(server.store.count("ContactPointTypeConsent"), 0);
    Ok(())
}
