//! Asset account participants.

use serde_json::{json, Value};
use tracing::info;

use super::{HookContext, RecordHandler, WriteMode, WrittenRow};
use crate::error::StoreError;
use crate::report::Warning;
use crate::store::{Fields, OWNERSHIP_FIELD};

/// Strips the participant's link fields from updates and re-applies the
/// ownership flag that a managed-package trigger resets on insert.
#[derive(Debug, Clone)]
pub struct ParticipantHandler {
    immutable: Vec<String>,
}

impl ParticipantHandler {
    pub fn new() -> Self {
        Self {
            immutable: ["AssetId", "VehicleId", "AccountId"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

impl Default for ParticipantHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordHandler for ParticipantHandler {
    fn name(&self) -> &str {
        "AssetAccountParticipant"
    }

    fn immutable_fields(&self) -> &[String] {
        &self.immutable
    }

    fn after_write(
        &self,
        ctx: &mut HookContext<'_>,
        object_type: &str,
        rows: &[WrittenRow],
    ) -> Result<(), StoreError> {
        let owners: Vec<&WrittenRow> = rows
            .iter()
            .filter(|r| r.mode == WriteMode::Create)
            .filter(|r| r.payload.get(OWNERSHIP_FIELD) == Some(&Value::Bool(true)))
            .collect();
        if owners.is_empty() {
            return Ok(());
        }

        info!(count = owners.len(), "re-applying ownership flag");
        let mut fields = Fields::new();
        fields.insert(OWNERSHIP_FIELD.to_string(), json!(true));
        for row in owners {
            if let Err(e) = ctx.store.update(object_type, &row.id, &fields) {
                ctx.warn(Warning::HookFailed {
                    handler: self.name().to_string(),
                    message: format!("line {}: ownership flag not restored: {e}", row.line),
                });
            }
        }
        Ok(())
    }
}
