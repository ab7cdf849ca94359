//! Ordered multi-step deletes: child artifacts, then targets, then shared
//! dependencies nothing references anymore.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::report::CleanupReport;
use crate::store::{RecordFilter, RecordId, RecordStore};

/// Which value of a target record a child's foreign key points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentKey {
    /// The target's own id
    Target,
    /// The value of a field on the target (e.g. its Individual id)
    Field(String),
}

/// Records deleted before the targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildArtifact {
    pub object_type: String,
    pub foreign_key: String,
    pub parent: ParentKey,
}

impl ChildArtifact {
    pub fn new(object_type: &str, foreign_key: &str, parent: ParentKey) -> Self {
        Self {
            object_type: object_type.to_string(),
            foreign_key: foreign_key.to_string(),
            parent,
        }
    }
}

/// A record the targets point to through `via_field`, deleted after the
/// targets when no surviving record of the target type still points to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedDependency {
    pub object_type: String,
    pub via_field: String,
}

impl SharedDependency {
    pub fn new(object_type: &str, via_field: &str) -> Self {
        Self {
            object_type: object_type.to_string(),
            via_field: via_field.to_string(),
        }
    }
}

/// Cascade declared by a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadePlan {
    pub children: Vec<ChildArtifact>,
    pub shared: Vec<SharedDependency>,
}

impl CascadePlan {
    /// Returns true if the plan only deletes the targets.
    pub fn is_direct(&self) -> bool {
        self.children.is_empty() && self.shared.is_empty()
    }

    fn lookup_fields(&self) -> BTreeSet<&str> {
        let mut fields = BTreeSet::new();
        for child in &self.children {
            if let ParentKey::Field(field) = &child.parent {
                fields.insert(field.as_str());
            }
        }
        for shared in &self.shared {
            fields.insert(shared.via_field.as_str());
        }
        fields
    }
}

/// Executes a cascade plan against `ids` of `object_type`.
///
/// Best-effort: lookup and delete failures are recorded in the report and
/// the remaining steps still run. Records that are already gone count as
/// deleted by someone else, not as failures.
pub fn execute_cascade(
    store: &dyn RecordStore,
    object_type: &str,
    ids: &[RecordId],
    plan: &CascadePlan,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    let targets: Vec<RecordId> = ids
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if targets.is_empty() {
        return report;
    }
    info!(object_type, count = targets.len(), "deleting records");

    // Field values must be read before the targets disappear.
    let mut linked: Vec<(String, Vec<RecordId>)> = Vec::new();
    if !plan.is_direct() {
        let records = match store.query(object_type, &RecordFilter::id_in(&targets)) {
            Ok(records) => records,
            Err(e) => {
                warn!(object_type, error = %e, "cascade lookup failed");
                report.errors.push(format!("{object_type} cascade lookup: {e}"));
                Vec::new()
            }
        };
        for field in plan.lookup_fields() {
            let values: BTreeSet<RecordId> = records
                .iter()
                .filter_map(|r| r.str_field(field))
                .map(RecordId::from)
                .collect();
            linked.push((field.to_string(), values.into_iter().collect()));
        }
    }
    let linked_ids = |field: &str| -> Vec<RecordId> {
        linked
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default()
    };

    for child in &plan.children {
        let parents = match &child.parent {
            ParentKey::Target => targets.clone(),
            ParentKey::Field(field) => linked_ids(field),
        };
        if parents.is_empty() {
            continue;
        }
        let filter = RecordFilter::field_in_ids(&child.foreign_key, &parents);
        match store.query(&child.object_type, &filter) {
            Ok(records) => {
                let child_ids: Vec<RecordId> = records.into_iter().map(|r| r.id).collect();
                debug!(object_type = %child.object_type, count = child_ids.len(), "cascade children");
                delete_batch(store, &child.object_type, &child_ids, &mut report);
            }
            Err(e) => {
                warn!(object_type = %child.object_type, error = %e, "cascade child lookup failed");
                report
                    .errors
                    .push(format!("{} lookup: {e}", child.object_type));
            }
        }
    }

    delete_batch(store, object_type, &targets, &mut report);

    for shared in &plan.shared {
        let candidates = linked_ids(&shared.via_field);
        let mut orphaned = Vec::new();
        for candidate in candidates {
            let filter = RecordFilter::equals(
                shared.via_field.clone(),
                Value::String(candidate.as_str().to_string()),
            );
            match store.query(object_type, &filter) {
                Ok(survivors) if survivors.is_empty() => orphaned.push(candidate),
                Ok(survivors) => {
                    debug!(
                        object_type = %shared.object_type,
                        id = %candidate,
                        referenced_by = survivors.len(),
                        "shared record still referenced, keeping it"
                    );
                }
                Err(e) => {
                    report
                        .errors
                        .push(format!("{} reference check: {e}", shared.object_type));
                }
            }
        }
        delete_batch(store, &shared.object_type, &orphaned, &mut report);
    }

    report
}

/// Deletes ids of one type and folds the per-id outcomes into `report`.
pub(crate) fn delete_batch(
    store: &dyn RecordStore,
    object_type: &str,
    ids: &[RecordId],
    report: &mut CleanupReport,
) {
    if ids.is_empty() {
        return;
    }
    let mut deleted = 0;
    for (id, outcome) in store.delete(object_type, ids) {
        match outcome {
            Ok(()) => deleted += 1,
            Err(e) if e.is_not_found() => {
                debug!(object_type, %id, "already deleted");
                report.already_gone += 1;
            }
            Err(e) => {
                warn!(object_type, %id, error = %e, "delete failed");
                report.errors.push(format!("{object_type} {id}: {e}"));
            }
        }
    }
    report.record_deleted(object_type, deleted);
}
