//! Remote record store interface, record types and filters.
//!
//! The engine only talks to the store through [`RecordStore`]. Each call is
//! treated as atomic; retries and transaction semantics belong to the
//! implementation, except for the bounded polls exposed here for values
//! populated by server-side automation.

mod automation;
mod memory;

use std::fmt;
use std::thread;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::PollPolicy;
use crate::error::StoreError;

pub use automation::{
    Automation, OwnershipResetAutomation, PersonAccountAutomation, VehicleAssetAutomation,
    OWNERSHIP_FIELD,
};
pub use memory::{AutomationContext, MemoryStore};

/// Field name to value mapping of a record or write payload.
pub type Fields = serde_json::Map<String, Value>;

/// Remote record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A record as returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Remote identifier
    pub id: RecordId,
    /// Field values
    pub fields: Fields,
}

impl Record {
    /// Returns a field as a string slice if it is a JSON string.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Query filter understood by every store implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordFilter {
    /// `field = value`
    FieldEquals { field: String, value: Value },
    /// `field IN (values)`
    FieldIn { field: String, values: Vec<Value> },
    /// `Name LIKE pattern` (`%` any run, `_` any single character)
    NameLike { pattern: String },
    /// `Id IN (ids)`
    IdIn { ids: Vec<RecordId> },
}

impl RecordFilter {
    /// Exact match on one field.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        RecordFilter::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Membership match on one field against record ids.
    pub fn field_in_ids(field: impl Into<String>, ids: &[RecordId]) -> Self {
        RecordFilter::FieldIn {
            field: field.into(),
            values: ids
                .iter()
                .map(|id| Value::String(id.as_str().to_string()))
                .collect(),
        }
    }

    /// `Name LIKE pattern`.
    pub fn name_like(pattern: impl Into<String>) -> Self {
        RecordFilter::NameLike {
            pattern: pattern.into(),
        }
    }

    /// `Id IN (ids)`.
    pub fn id_in(ids: &[RecordId]) -> Self {
        RecordFilter::IdIn { ids: ids.to_vec() }
    }

    /// Evaluates the filter against a record.
    pub fn matches(&self, id: &RecordId, fields: &Fields) -> bool {
        match self {
            RecordFilter::IdIn { ids } => ids.contains(id),
            RecordFilter::FieldEquals { field, value } => fields.get(field) == Some(value),
            RecordFilter::FieldIn { field, values } => fields
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            RecordFilter::NameLike { pattern } => fields
                .get("Name")
                .and_then(Value::as_str)
                .map(|name| like_match(pattern, name))
                .unwrap_or(false),
        }
    }
}

/// Case-insensitive SQL `LIKE` matching.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    // Classic wildcard DP over (pattern index, text index).
    let mut dp = vec![vec![false; text.len() + 1]; pattern.len() + 1];
    dp[0][0] = true;
    for p in 1..=pattern.len() {
        if pattern[p - 1] == '%' {
            dp[p][0] = dp[p - 1][0];
        }
    }
    for p in 1..=pattern.len() {
        for t in 1..=text.len() {
            dp[p][t] = match pattern[p - 1] {
                '%' => dp[p - 1][t] || dp[p][t - 1],
                '_' => dp[p - 1][t - 1],
                c => dp[p - 1][t - 1] && c == text[t - 1],
            };
        }
    }
    dp[pattern.len()][text.len()]
}

/// Per-id outcome of a delete call.
pub type DeleteResults = Vec<(RecordId, Result<(), StoreError>)>;

/// Remote record store collaborator.
pub trait RecordStore: Send + Sync {
    /// Creates a record and returns its identifier.
    fn create(&self, object_type: &str, fields: &Fields) -> Result<RecordId, StoreError>;

    /// Updates fields of an existing record. `null` values clear the field.
    fn update(&self, object_type: &str, id: &RecordId, fields: &Fields)
        -> Result<(), StoreError>;

    /// Fetches a single field. `Ok(None)` means the field is not populated (yet).
    fn fetch_field(
        &self,
        object_type: &str,
        id: &RecordId,
        field: &str,
    ) -> Result<Option<Value>, StoreError>;

    /// Deletes records, reporting an outcome per id.
    fn delete(&self, object_type: &str, ids: &[RecordId]) -> DeleteResults;

    /// Returns every record of `object_type` matching `filter`, ordered by id.
    fn query(&self, object_type: &str, filter: &RecordFilter) -> Result<Vec<Record>, StoreError>;

    /// Polls a field until it is populated or the policy is exhausted.
    fn poll_field(
        &self,
        object_type: &str,
        id: &RecordId,
        field: &str,
        policy: &PollPolicy,
    ) -> Result<Value, StoreError> {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.fetch_field(object_type, id, field)? {
                Some(value) if !value.is_null() => return Ok(value),
                _ => {
                    debug!(object_type, %id, field, attempt, "field not visible yet");
                }
            }
            if attempt < attempts {
                thread::sleep(policy.interval);
            }
        }
        Err(StoreError::Timeout {
            what: format!("{object_type}.{field} on {id}"),
            attempts,
        })
    }

    /// Polls a query until it yields at least `expected` records.
    fn poll_query(
        &self,
        object_type: &str,
        filter: &RecordFilter,
        expected: usize,
        policy: &PollPolicy,
    ) -> Result<Vec<Record>, StoreError> {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            let records = self.query(object_type, filter)?;
            if records.len() >= expected {
                return Ok(records);
            }
            debug!(object_type, attempt, found = records.len(), expected, "query not satisfied yet");
            if attempt < attempts {
                thread::sleep(policy.interval);
            }
        }
        Err(StoreError::Timeout {
            what: format!("{expected} {object_type} record(s)"),
            attempts,
        })
    }
}
