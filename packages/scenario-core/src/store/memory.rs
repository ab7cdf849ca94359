//! In-memory record store with optional server-side automation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;

use super::{Automation, DeleteResults, Fields, Record, RecordFilter, RecordId, RecordStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct StoreState {
    /// object type -> id -> fields
    tables: HashMap<String, BTreeMap<RecordId, Fields>>,
    /// Next id sequence number
    next_seq: u64,
    /// Automation-populated fields still hidden from fetches: (id, field) -> reads left
    hidden: HashMap<(RecordId, String), u32>,
}

impl StoreState {
    fn allocate_id(&mut self, object_type: &str) -> RecordId {
        self.next_seq += 1;
        let prefix: String = object_type
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(3)
            .collect::<String>()
            .to_ascii_uppercase();
        RecordId::new(format!("{:X<3}{:012}", prefix, self.next_seq))
    }

    fn insert(&mut self, object_type: &str, fields: Fields) -> RecordId {
        let id = self.allocate_id(object_type);
        let mut stored = Fields::new();
        for (k, v) in fields {
            if !v.is_null() {
                stored.insert(k, v);
            }
        }
        self.tables
            .entry(object_type.to_string())
            .or_default()
            .insert(id.clone(), stored);
        id
    }

    fn record_mut(&mut self, object_type: &str, id: &RecordId) -> Option<&mut Fields> {
        self.tables.get_mut(object_type)?.get_mut(id)
    }
}

/// Write access to the store handed to automations while a create is in flight.
pub struct AutomationContext<'a> {
    state: &'a mut StoreState,
    visibility_lag: u32,
}

impl AutomationContext<'_> {
    /// Reads a field of an existing record.
    pub fn field(&self, object_type: &str, id: &RecordId, field: &str) -> Option<Value> {
        self.state
            .tables
            .get(object_type)?
            .get(id)?
            .get(field)
            .cloned()
    }

    /// Inserts a related record and returns its id.
    pub fn insert(&mut self, object_type: &str, fields: Fields) -> RecordId {
        self.state.insert(object_type, fields)
    }

    /// Populates a field the way asynchronous automation would: the value
    /// stays invisible to `fetch_field` for the configured number of reads.
    pub fn populate(&mut self, object_type: &str, id: &RecordId, field: &str, value: Value) {
        if let Some(record) = self.state.record_mut(object_type, id) {
            record.insert(field.to_string(), value);
            if self.visibility_lag > 0 {
                self.state
                    .hidden
                    .insert((id.clone(), field.to_string()), self.visibility_lag);
            }
        }
    }

    /// Overwrites a field synchronously.
    pub fn overwrite(&mut self, object_type: &str, id: &RecordId, field: &str, value: Value) {
        if let Some(record) = self.state.record_mut(object_type, id) {
            record.insert(field.to_string(), value);
        }
    }
}

/// Thread-safe in-memory [`RecordStore`].
///
/// Used as the sandbox behind the HTTP server and as the store in engine
/// tests. Fields listed as immutable for an object type make updates that
/// touch them fail with [`StoreError::Rejected`], mirroring how a real CRM
/// rejects writes to insert-only fields.
pub struct MemoryStore {
    state: RwLock<StoreState>,
    automations: Vec<Box<dyn Automation>>,
    immutable: HashMap<String, HashSet<String>>,
    visibility_lag: u32,
}

impl MemoryStore {
    /// Creates an empty store without automation.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            automations: Vec::new(),
            immutable: HashMap::new(),
            visibility_lag: 0,
        }
    }

    /// Creates a store behaving like the CRM sandbox: person-account,
    /// vehicle-asset and ownership-reset automation plus the insert-only
    /// fields the built-in handlers know about.
    pub fn sandbox() -> Self {
        Self::new()
            .with_automation(Box::new(super::PersonAccountAutomation))
            .with_automation(Box::new(super::VehicleAssetAutomation))
            .with_automation(Box::new(super::OwnershipResetAutomation))
            .with_immutable_fields("Asset", &["AccountId", "ContactId"])
            .with_immutable_fields("VehicleDefinition", &["ProductId"])
            .with_immutable_fields("AssetAccountParticipant", &["AssetId", "VehicleId", "AccountId"])
    }

    /// Registers an automation run after every create of its object type.
    pub fn with_automation(mut self, automation: Box<dyn Automation>) -> Self {
        self.automations.push(automation);
        self
    }

    /// Marks fields of an object type as insert-only.
    pub fn with_immutable_fields(mut self, object_type: &str, fields: &[&str]) -> Self {
        self.immutable
            .entry(object_type.to_string())
            .or_default()
            .extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Hides automation-populated fields from the first `reads` fetches.
    pub fn with_visibility_lag(mut self, reads: u32) -> Self {
        self.visibility_lag = reads;
        self
    }

    /// Returns a record regardless of visibility lag.
    pub fn get(&self, object_type: &str, id: &RecordId) -> Option<Record> {
        let state = self.state.read().ok()?;
        let fields = state.tables.get(object_type)?.get(id)?.clone();
        Some(Record {
            id: id.clone(),
            fields,
        })
    }

    /// Returns all records of an object type ordered by id.
    pub fn records(&self, object_type: &str) -> Vec<Record> {
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };
        state
            .tables
            .get(object_type)
            .map(|table| {
                table
                    .iter()
                    .map(|(id, fields)| Record {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the number of records of an object type.
    pub fn count(&self, object_type: &str) -> usize {
        match self.state.read() {
            Ok(state) => state.tables.get(object_type).map_or(0, BTreeMap::len),
            Err(_) => 0,
        }
    }

    fn not_found(object_type: &str, id: &RecordId) -> StoreError {
        StoreError::NotFound {
            object_type: object_type.to_string(),
            id: id.to_string(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn create(&self, object_type: &str, fields: &Fields) -> Result<RecordId, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        let id = state.insert(object_type, fields.clone());
        debug!(object_type, %id, "record created");

        let mut ctx = AutomationContext {
            state: &mut *state,
            visibility_lag: self.visibility_lag,
        };
        for automation in self
            .automations
            .iter()
            .filter(|a| a.object_type() == object_type)
        {
            automation.after_create(&mut ctx, &id);
        }
        Ok(id)
    }

    fn update(
        &self,
        object_type: &str,
        id: &RecordId,
        fields: &Fields,
    ) -> Result<(), StoreError> {
        if let Some(immutable) = self.immutable.get(object_type) {
            if let Some(field) = fields.keys().find(|f| immutable.contains(*f)) {
                return Err(StoreError::Rejected {
                    object_type: object_type.to_string(),
                    message: format!("field '{field}' is not updateable"),
                });
            }
        }

        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        let record = state
            .record_mut(object_type, id)
            .ok_or_else(|| Self::not_found(object_type, id))?;
        for (field, value) in fields {
            if value.is_null() {
                record.remove(field);
            } else {
                record.insert(field.clone(), value.clone());
            }
        }
        for field in fields.keys() {
            state.hidden.remove(&(id.clone(), field.clone()));
        }
        Ok(())
    }

    fn fetch_field(
        &self,
        object_type: &str,
        id: &RecordId,
        field: &str,
    ) -> Result<Option<Value>, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        let value = state
            .tables
            .get(object_type)
            .and_then(|table| table.get(id))
            .ok_or_else(|| Self::not_found(object_type, id))?
            .get(field)
            .cloned();
        let key = (id.clone(), field.to_string());
        if let Some(reads_left) = state.hidden.get(&key).copied() {
            if reads_left <= 1 {
                state.hidden.remove(&key);
            } else {
                state.hidden.insert(key, reads_left - 1);
            }
            return Ok(None);
        }
        Ok(value)
    }

    fn delete(&self, object_type: &str, ids: &[RecordId]) -> DeleteResults {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(_) => {
                return ids
                    .iter()
                    .map(|id| (id.clone(), Err(StoreError::LockPoisoned)))
                    .collect()
            }
        };
        ids.iter()
            .map(|id| {
                let removed = state
                    .tables
                    .get_mut(object_type)
                    .and_then(|table| table.remove(id));
                let outcome = match removed {
                    Some(_) => {
                        state.hidden.retain(|(hidden_id, _), _| hidden_id != id);
                        Ok(())
                    }
                    None => Err(Self::not_found(object_type, id)),
                };
                (id.clone(), outcome)
            })
            .collect()
    }

    fn query(&self, object_type: &str, filter: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state
            .tables
            .get(object_type)
            .map(|table| {
                table
                    .iter()
                    .filter(|(id, fields)| filter.matches(id, fields))
                    .map(|(id, fields)| Record {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
