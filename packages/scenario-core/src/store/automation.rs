//! Server-side automation simulated by the in-memory store.

use serde_json::{json, Value};

use super::{AutomationContext, Fields, RecordId};

/// Behavior a CRM runs after a record is created (triggers, flows).
pub trait Automation: Send + Sync {
    /// Object type the automation is attached to.
    fn object_type(&self) -> &str;

    /// Runs after a record of [`Automation::object_type`] is created.
    fn after_create(&self, ctx: &mut AutomationContext<'_>, id: &RecordId);
}

/// Person accounts get an Individual, a Contact and one consent record per
/// engagement channel.
pub struct PersonAccountAutomation;

impl Automation for PersonAccountAutomation {
    fn object_type(&self) -> &str {
        "Account"
    }

    fn after_create(&self, ctx: &mut AutomationContext<'_>, id: &RecordId) {
        let name = ctx
            .field("Account", id, "Name")
            .unwrap_or_else(|| Value::String(id.to_string()));

        let mut individual = Fields::new();
        individual.insert("Name".into(), name.clone());
        let individual_id = ctx.insert("Individual", individual);

        let mut contact = Fields::new();
        contact.insert("Name".into(), name);
        contact.insert("AccountId".into(), json!(id.as_str()));
        let contact_id = ctx.insert("Contact", contact);

        for channel in ["Email", "SMS"] {
            let mut consent = Fields::new();
            consent.insert("Name".into(), json!(format!("{channel} consent")));
            consent.insert("PartyId".into(), json!(individual_id.as_str()));
            consent.insert("EngagementChannelType".into(), json!(channel));
            consent.insert("DataUsePurpose".into(), json!("Marketing"));
            consent.insert("PrivacyConsentStatus".into(), json!("OptOut"));
            ctx.insert("ContactPointTypeConsent", consent);
        }

        ctx.populate("Account", id, "PersonIndividualId", json!(individual_id.as_str()));
        ctx.populate("Account", id, "PersonContactId", json!(contact_id.as_str()));
    }
}

/// Vehicles get a backing Asset linked through `AssetId`.
pub struct VehicleAssetAutomation;

impl Automation for VehicleAssetAutomation {
    fn object_type(&self) -> &str {
        "Vehicle"
    }

    fn after_create(&self, ctx: &mut AutomationContext<'_>, id: &RecordId) {
        let mut asset = Fields::new();
        if let Some(name) = ctx.field("Vehicle", id, "Name") {
            asset.insert("Name".into(), name);
        }
        if let Some(account) = ctx.field("Vehicle", id, "AccountId") {
            asset.insert("AccountId".into(), account);
        }
        let asset_id = ctx.insert("Asset", asset);
        ctx.populate("Vehicle", id, "AssetId", json!(asset_id.as_str()));
    }
}

/// Managed-package trigger that forces the ownership flag off on insert.
pub struct OwnershipResetAutomation;

/// Ownership flag reset by [`OwnershipResetAutomation`].
pub const OWNERSHIP_FIELD: &str = "AUTO360__IsOwnership__c";

impl Automation for OwnershipResetAutomation {
    fn object_type(&self) -> &str {
        "AssetAccountParticipant"
    }

    fn after_create(&self, ctx: &mut AutomationContext<'_>, id: &RecordId) {
        if ctx.field("AssetAccountParticipant", id, OWNERSHIP_FIELD).is_some() {
            ctx.overwrite("AssetAccountParticipant", id, OWNERSHIP_FIELD, json!(false));
        }
    }
}
