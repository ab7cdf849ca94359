//! Cleanup engine: deletes what a scenario created, or what matches a name
//! pattern, through each object type's handler.
//!
//! Cleanup is best-effort and idempotent. Failed deletes are logged and
//! reported, the remaining records are still attempted, and records that are
//! already gone count as success.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::config::FactoryConfig;
use crate::handler::HandlerRegistry;
use crate::materializer::WriteJournal;
use crate::report::CleanupReport;
use crate::source::{Scenario, SourceFile};
use crate::store::{RecordFilter, RecordId, RecordStore};
use crate::transform::HeaderPlan;

/// Deletes scenario data through the handler registry.
pub struct CleanupEngine<'a> {
    store: &'a dyn RecordStore,
    handlers: &'a HandlerRegistry,
    config: FactoryConfig,
}

impl<'a> CleanupEngine<'a> {
    pub fn new(store: &'a dyn RecordStore, handlers: &'a HandlerRegistry, config: FactoryConfig) -> Self {
        Self {
            store,
            handlers,
            config,
        }
    }

    /// Deletes the records a run created, newest first.
    ///
    /// Consecutive entries of the same type are handed to the handler as one
    /// batch so its cascade runs once per batch.
    pub fn cleanup_journal(&self, journal: &WriteJournal) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut batch: Vec<RecordId> = Vec::new();
        let mut batch_type: Option<&str> = None;

        for entry in journal.entries().iter().rev() {
            if batch_type.is_some_and(|t| t != entry.object_type) {
                if let Some(object_type) = batch_type {
                    report.merge(self.delete_with_handler(object_type, &batch));
                }
                batch.clear();
            }
            batch_type = Some(entry.object_type.as_str());
            batch.push(entry.id.clone());
        }
        if let Some(object_type) = batch_type {
            report.merge(self.delete_with_handler(object_type, &batch));
        }
        report
    }

    /// Deletes the records a scenario describes, without a journal.
    ///
    /// Files are visited in reverse order. Each row is matched by exact
    /// `Name` when it has one, otherwise by a name containing its alias.
    pub fn cleanup_scenario(&self, scenario: &Scenario) -> CleanupReport {
        info!(scenario = %scenario.name(), files = scenario.files().len(), "starting scenario cleanup");
        let mut report = CleanupReport::default();
        for file in scenario.files().iter().rev() {
            let (ids, lookup_errors) = match self.ids_for_file(file) {
                Ok(found) => found,
                Err(message) => {
                    warn!(file = %file.name, error = %message, "file skipped during cleanup");
                    report.errors.push(format!("{}: {message}", file.name));
                    continue;
                }
            };
            for message in lookup_errors {
                report.errors.push(format!("{}: {message}", file.name));
            }
            if ids.is_empty() {
                info!(file = %file.name, "no matching records");
            } else {
                report.merge(self.delete_with_handler(&file.object_type, &ids));
            }
        }
        report
    }

    /// Deletes every record of `object_type` whose name matches a `LIKE`
    /// pattern, applying the type's cascade.
    pub fn cleanup_pattern(&self, object_type: &str, pattern: &str) -> CleanupReport {
        info!(object_type, pattern, "deleting by pattern");
        match self.store.query(object_type, &RecordFilter::name_like(pattern)) {
            Ok(records) if records.is_empty() => {
                info!(object_type, pattern, "no matching records");
                CleanupReport::default()
            }
            Ok(records) => {
                let ids: Vec<RecordId> = records.into_iter().map(|r| r.id).collect();
                self.delete_with_handler(object_type, &ids)
            }
            Err(e) => {
                warn!(object_type, pattern, error = %e, "pattern lookup failed");
                CleanupReport {
                    errors: vec![format!("{object_type} lookup: {e}")],
                    ..CleanupReport::default()
                }
            }
        }
    }

    fn delete_with_handler(&self, object_type: &str, ids: &[RecordId]) -> CleanupReport {
        let handler = self.handlers.get(object_type);
        debug!(object_type, handler = handler.name(), count = ids.len(), "delegating delete");
        handler.delete(self.store, object_type, ids)
    }

    /// Ids of the records a source file describes, plus the lookups that
    /// failed. Only an unreadable file is an error.
    fn ids_for_file(&self, file: &SourceFile) -> Result<(Vec<RecordId>, Vec<String>), String> {
        let table = file.read().map_err(|e| e.to_string())?;
        let plan = HeaderPlan::new(&table.headers, &self.config.alias_column);
        let today = self.config.today();
        let column = |name: &str| table.headers.iter().position(|h| h == name);
        let (name_col, alias_col) = (column("Name"), column(&self.config.alias_column));

        let mut names = BTreeSet::new();
        let mut aliases = BTreeSet::new();
        for row in &table.rows {
            let (name, alias) = match plan.transform_row(row, today) {
                Ok(draft) => (draft.plain_str("Name").map(str::to_string), draft.alias),
                // Rows that no longer transform are matched by their raw cells.
                Err(e) => {
                    debug!(file = %file.name, line = row.line, error = %e, "matching raw cells");
                    let raw = |idx: Option<usize>| {
                        idx.and_then(|i| row.cells.get(i))
                            .map(|c| c.trim())
                            .filter(|c| !c.is_empty())
                            .map(str::to_string)
                    };
                    (raw(name_col), raw(alias_col))
                }
            };
            if let Some(name) = name {
                names.insert(name);
            } else if let Some(alias) = alias {
                aliases.insert(alias);
            }
        }
        if names.is_empty() && aliases.is_empty() {
            warn!(file = %file.name, "no Name or alias to match records by");
            return Ok((Vec::new(), Vec::new()));
        }

        let mut ids = BTreeSet::new();
        let mut errors = Vec::new();
        for name in &names {
            let filter = RecordFilter::equals("Name", name.as_str());
            match self.store.query(&file.object_type, &filter) {
                Ok(records) => ids.extend(records.into_iter().map(|r| r.id)),
                Err(e) => {
                    warn!(file = %file.name, name = %name, error = %e, "lookup failed");
                    errors.push(format!("lookup of '{name}': {e}"));
                }
            }
        }
        for alias in &aliases {
            let needle = alias.to_lowercase();
            let filter = RecordFilter::name_like(format!("%{alias}%"));
            match self.store.query(&file.object_type, &filter) {
                Ok(records) => ids.extend(
                    records
                        .into_iter()
                        .filter(|r| {
                            r.str_field("Name")
                                .is_some_and(|n| n.to_lowercase().contains(&needle))
                        })
                        .map(|r| r.id),
                ),
                Err(e) => {
                    warn!(file = %file.name, alias = %alias, error = %e, "lookup failed");
                    errors.push(format!("lookup of '{alias}': {e}"));
                }
            }
        }
        debug!(file = %file.name, count = ids.len(), "records matched for cleanup");
        Ok((ids.into_iter().collect(), errors))
    }
}
