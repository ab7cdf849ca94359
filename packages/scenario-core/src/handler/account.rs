//! Person accounts: contact id capture, consent management and the
//! consent/account/individual delete cascade.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    CascadePlan, ChildArtifact, HookContext, ParentKey, RecordHandler, SharedDependency, WriteMode,
    WrittenRow,
};
use crate::error::StoreError;
use crate::report::Warning;
use crate::store::{Fields, Record, RecordFilter, RecordId};
use crate::transform::{relative_date, DATA_USE_PURPOSE_PREFIX};

const CONTACT_FIELD: &str = "PersonContactId";
const INDIVIDUAL_FIELD: &str = "PersonIndividualId";
const CONSENT_OBJECT: &str = "ContactPointTypeConsent";

const OPTED_OUT_CONTROL: &str = "_HasOptedOutSolicit";
const EMAIL_CONTROL: &str = "_EmailConsent";
const SMS_CONTROL: &str = "_SMSConsent";
const EFFECTIVE_TO_CONTROL: &str = "_EffectiveTo__date";

const OPT_IN: &str = "OptIn";
const OPT_OUT: &str = "OptOut";

/// Handler for person accounts.
#[derive(Debug, Default)]
pub struct AccountHandler;

impl AccountHandler {
    fn has_consent_controls(controls: &BTreeMap<String, String>) -> bool {
        controls.keys().any(|k| {
            k == OPTED_OUT_CONTROL
                || k == EMAIL_CONTROL
                || k == SMS_CONTROL
                || k.starts_with(DATA_USE_PURPOSE_PREFIX)
        })
    }

    /// Target status of one consent record, or `None` for channels the row
    /// says nothing about.
    fn consent_status<'a>(
        controls: &'a BTreeMap<String, String>,
        channel: &str,
        purpose: Option<&str>,
    ) -> Option<&'a str> {
        if let Some(purpose) = purpose {
            let key = format!("{DATA_USE_PURPOSE_PREFIX}{channel}:{purpose}");
            if let Some(status) = controls.get(&key) {
                return Some(status.as_str());
            }
        }
        let fallback = match channel {
            "Email" => EMAIL_CONTROL,
            "SMS" => SMS_CONTROL,
            _ => return None,
        };
        Some(controls.get(fallback).map_or(OPT_OUT, String::as_str))
    }

    fn capture_contact(ctx: &mut HookContext<'_>, row: &WrittenRow) {
        let Some(alias) = &row.alias else {
            return;
        };
        let policy = ctx.config.automation_poll;
        match ctx.store.poll_field("Account", &row.id, CONTACT_FIELD, &policy) {
            Ok(value) => {
                if let Err(e) = ctx.registry.capture(alias, CONTACT_FIELD, value) {
                    ctx.warn(Warning::HookFailed {
                        handler: "Account".to_string(),
                        message: e.to_string(),
                    });
                }
            }
            Err(e) => ctx.warn(Warning::CaptureFailed {
                line: row.line,
                alias: alias.clone(),
                field: CONTACT_FIELD.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn apply_consents(ctx: &mut HookContext<'_>, row: &WrittenRow) -> Result<(), StoreError> {
        let policy = ctx.config.automation_poll;
        let individual = ctx
            .store
            .poll_field("Account", &row.id, INDIVIDUAL_FIELD, &policy)?;
        let Some(individual_id) = individual.as_str().map(RecordId::from) else {
            return Err(StoreError::Rejected {
                object_type: "Account".to_string(),
                message: format!("{INDIVIDUAL_FIELD} is not an id: {individual}"),
            });
        };

        let opted_out = row
            .controls
            .get(OPTED_OUT_CONTROL)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("TRUE"));
        if opted_out {
            let mut fields = Fields::new();
            fields.insert("HasOptedOutSolicit".into(), json!(true));
            ctx.store.update("Individual", &individual_id, &fields)?;
            debug!(id = %individual_id, "individual opted out of solicitation");
        }

        let effective_to = match row.controls.get(EFFECTIVE_TO_CONTROL) {
            Some(raw) => match relative_date(EFFECTIVE_TO_CONTROL, raw, ctx.today) {
                Ok(date) => Some(date),
                Err(e) => {
                    ctx.warn(Warning::HookFailed {
                        handler: "Account".to_string(),
                        message: format!("line {}: {e}", row.line),
                    });
                    None
                }
            },
            None => None,
        };

        let filter = RecordFilter::equals("PartyId", individual_id.as_str());
        let consents = ctx.store.poll_query(CONSENT_OBJECT, &filter, 1, &policy)?;
        let mut updated = 0;
        for consent in &consents {
            let Some(fields) = Self::consent_update(consent, &row.controls, effective_to.as_deref())
            else {
                continue;
            };
            ctx.store.update(CONSENT_OBJECT, &consent.id, &fields)?;
            updated += 1;
        }
        info!(account = %row.id, found = consents.len(), updated, "consents applied");
        Ok(())
    }

    fn consent_update(
        consent: &Record,
        controls: &BTreeMap<String, String>,
        effective_to: Option<&str>,
    ) -> Option<Fields> {
        let channel = consent.str_field("EngagementChannelType")?;
        let purpose = consent.str_field("DataUsePurpose");
        let status = Self::consent_status(controls, channel, purpose)?;

        let mut fields = Fields::new();
        fields.insert("PrivacyConsentStatus".into(), json!(status));
        match (status, effective_to) {
            (OPT_IN, Some(date)) => {
                fields.insert("EffectiveTo".into(), json!(date));
            }
            (OPT_OUT, _) => {
                fields.insert("EffectiveTo".into(), Value::Null);
            }
            _ => {}
        }
        Some(fields)
    }
}

impl RecordHandler for AccountHandler {
    fn name(&self) -> &str {
        "Account"
    }

    fn cascade_plan(&self) -> CascadePlan {
        CascadePlan {
            children: vec![
                ChildArtifact::new(
                    CONSENT_OBJECT,
                    "PartyId",
                    ParentKey::Field(INDIVIDUAL_FIELD.to_string()),
                ),
                ChildArtifact::new("Contact", "AccountId", ParentKey::Target),
            ],
            shared: vec![SharedDependency::new("Individual", INDIVIDUAL_FIELD)],
        }
    }

    fn after_write(
        &self,
        ctx: &mut HookContext<'_>,
        _object_type: &str,
        rows: &[WrittenRow],
    ) -> Result<(), StoreError> {
        for row in rows.iter().filter(|r| r.mode == WriteMode::Create) {
            Self::capture_contact(ctx, row);
        }

        for row in rows
            .iter()
            .filter(|r| Self::has_consent_controls(&r.controls))
        {
            if let Err(e) = Self::apply_consents(ctx, row) {
                ctx.warn(Warning::HookFailed {
                    handler: "Account".to_string(),
                    message: format!("line {}: consents not applied: {e}", row.line),
                });
            }
        }
        Ok(())
    }
}
