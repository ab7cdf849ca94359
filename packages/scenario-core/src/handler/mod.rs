//! Handler strategy registry: per-object-type payload shaping, write hooks
//! and delete behavior.
//!
//! Object types without a registered handler use [`DefaultHandler`].

mod account;
mod cascade;
mod participant;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::alias::AliasRegistry;
use crate::config::FactoryConfig;
use crate::error::StoreError;
use crate::report::{CleanupReport, Warning};
use crate::store::{Fields, RecordId, RecordStore};

pub use account::AccountHandler;
pub use cascade::{execute_cascade, CascadePlan, ChildArtifact, ParentKey, SharedDependency};
pub use participant::ParticipantHandler;

/// Kind of write about to be sent for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// Payload after handler shaping, with the fields that were removed.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedPayload {
    pub payload: Fields,
    pub stripped: Vec<String>,
}

/// A row whose primary write succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenRow {
    /// Source line number
    pub line: u64,
    /// Declared alias, if any
    pub alias: Option<String>,
    /// Record that was written
    pub id: RecordId,
    /// Create or update
    pub mode: WriteMode,
    /// Payload as sent
    pub payload: Fields,
    /// Control cells of the row
    pub controls: BTreeMap<String, String>,
}

/// State handed to [`RecordHandler::after_write`].
pub struct HookContext<'a> {
    pub store: &'a dyn RecordStore,
    pub registry: &'a mut AliasRegistry,
    pub config: &'a FactoryConfig,
    /// Date relative offsets resolve against for this run
    pub today: NaiveDate,
    /// Warnings to attach to the file report
    pub warnings: Vec<Warning>,
}

impl HookContext<'_> {
    /// Logs a warning and records it in the report.
    pub fn warn(&mut self, warning: Warning) {
        warn!(%warning, "handler warning");
        self.warnings.push(warning);
    }
}

/// Per-object-type strategy.
///
/// Every method has a default, so a handler only overrides what differs.
pub trait RecordHandler: Send + Sync {
    /// Name used in logs and warnings.
    fn name(&self) -> &str {
        "default"
    }

    /// Fields the store accepts on create but rejects on update.
    fn immutable_fields(&self) -> &[String] {
        &[]
    }

    /// Field used to match existing records in upsert mode.
    fn upsert_key(&self) -> Option<&str> {
        None
    }

    /// Shapes a payload before it is sent. The default strips immutable
    /// fields from updates.
    fn shape_for_write(&self, mut payload: Fields, mode: WriteMode) -> ShapedPayload {
        let mut stripped = Vec::new();
        if mode == WriteMode::Update {
            for field in self.immutable_fields() {
                if payload.remove(field).is_some() {
                    stripped.push(field.clone());
                }
            }
        }
        ShapedPayload { payload, stripped }
    }

    /// Related records removed together with the target records.
    fn cascade_plan(&self) -> CascadePlan {
        CascadePlan::default()
    }

    /// Deletes records. The default executes [`RecordHandler::cascade_plan`].
    fn delete(&self, store: &dyn RecordStore, object_type: &str, ids: &[RecordId]) -> CleanupReport {
        execute_cascade(store, object_type, ids, &self.cascade_plan())
    }

    /// Runs after all rows of a file were written and their `_Return:`
    /// fields captured.
    ///
    /// Errors are downgraded to warnings by the caller; the primary writes
    /// already succeeded.
    fn after_write(
        &self,
        _ctx: &mut HookContext<'_>,
        _object_type: &str,
        _rows: &[WrittenRow],
    ) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Handler with no special behavior.
#[derive(Debug, Default)]
pub struct DefaultHandler;

impl RecordHandler for DefaultHandler {}

/// Handler whose only special behavior is a set of insert-only fields.
#[derive(Debug, Clone)]
pub struct ImmutableFieldsHandler {
    name: String,
    fields: Vec<String>,
}

impl ImmutableFieldsHandler {
    /// Creates a handler stripping `fields` from updates.
    pub fn new(name: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl RecordHandler for ImmutableFieldsHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn immutable_fields(&self) -> &[String] {
        &self.fields
    }
}

/// Vehicles share their backing Asset; it goes once no vehicle points to it.
#[derive(Debug, Default)]
pub struct VehicleHandler;

impl RecordHandler for VehicleHandler {
    fn name(&self) -> &str {
        "Vehicle"
    }

    fn cascade_plan(&self) -> CascadePlan {
        CascadePlan {
            children: Vec::new(),
            shared: vec![SharedDependency::new("Asset", "AssetId")],
        }
    }
}

/// Registry of handlers keyed by object type.
///
/// Built once at process start and passed by reference to the materializer
/// and the cleanup engine.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RecordHandler>>,
    fallback: Arc<dyn RecordHandler>,
}

impl HandlerRegistry {
    /// Creates a registry where every type uses the default handler.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(DefaultHandler),
        }
    }

    /// Creates a registry with the CRM handlers this tool ships with.
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        registry.register("Account", Arc::new(AccountHandler));
        registry.register("Vehicle", Arc::new(VehicleHandler));
        registry.register(
            "Asset",
            Arc::new(ImmutableFieldsHandler::new("Asset", &["AccountId", "ContactId"])),
        );
        registry.register(
            "VehicleDefinition",
            Arc::new(ImmutableFieldsHandler::new("VehicleDefinition", &["ProductId"])),
        );
        registry.register("AssetAccountParticipant", Arc::new(ParticipantHandler::new()));
        registry
    }

    /// Registers (or replaces) the handler of an object type.
    ///
    /// # Returns
    /// The previously registered handler, if any.
    pub fn register(
        &mut self,
        object_type: &str,
        handler: Arc<dyn RecordHandler>,
    ) -> Option<Arc<dyn RecordHandler>> {
        debug!(object_type, handler = handler.name(), "handler registered");
        self.handlers.insert(object_type.to_string(), handler)
    }

    /// Returns the handler of an object type, or the default handler.
    pub fn get(&self, object_type: &str) -> &dyn RecordHandler {
        self.handlers
            .get(object_type)
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    /// Returns true if a custom handler is registered for the type.
    pub fn contains(&self, object_type: &str) -> bool {
        self.handlers.contains_key(object_type)
    }

    /// Object types with a custom handler.
    pub fn object_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
