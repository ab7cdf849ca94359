//! Scenario materializer: drives each source file through parse, resolve,
//! write and capture, in file order, against one alias registry.

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::alias::AliasRegistry;
use crate::config::FactoryConfig;
use crate::error::{FactoryError, ScenarioFailure, StoreError};
use crate::handler::{HandlerRegistry, HookContext, RecordHandler, WriteMode, WrittenRow};
use crate::report::{FileReport, FileState, ScenarioReport, Warning};
use crate::resolver::resolve_draft;
use crate::source::{FileMode, Scenario, SourceFile};
use crate::store::{Fields, Record, RecordFilter, RecordId, RecordStore};
use crate::transform::{HeaderPlan, RowDraft};

/// A record created during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub object_type: String,
    pub id: RecordId,
    pub alias: Option<String>,
}

/// Records created by a run, in creation order. Updates are not journaled:
/// the records existed before the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteJournal {
    entries: Vec<JournalEntry>,
}

impl WriteJournal {
    pub fn push(&mut self, object_type: &str, id: RecordId, alias: Option<String>) {
        self.entries.push(JournalEntry {
            object_type: object_type.to_string(),
            id,
            alias,
        });
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs scenarios against a record store.
///
/// Owns the alias registry and write journal of its run; one instance per
/// run, never shared.
pub struct ScenarioMaterializer<'a> {
    store: &'a dyn RecordStore,
    handlers: &'a HandlerRegistry,
    config: FactoryConfig,
    registry: AliasRegistry,
    journal: WriteJournal,
}

impl<'a> ScenarioMaterializer<'a> {
    /// Creates a materializer with an empty registry.
    pub fn new(
        store: &'a dyn RecordStore,
        handlers: &'a HandlerRegistry,
        config: FactoryConfig,
    ) -> Self {
        Self {
            store,
            handlers,
            config,
            registry: AliasRegistry::new(),
            journal: WriteJournal::default(),
        }
    }

    /// Aliases bound so far.
    pub fn registry(&self) -> &AliasRegistry {
        &self.registry
    }

    /// Records created so far.
    pub fn journal(&self) -> &WriteJournal {
        &self.journal
    }

    /// Consumes the materializer, returning what the run produced.
    pub fn into_parts(self) -> (AliasRegistry, WriteJournal) {
        (self.registry, self.journal)
    }

    /// Processes every file of the scenario in order.
    ///
    /// Stops at the first failing file; later files are not attempted.
    /// "Today" is fixed once for the whole run.
    ///
    /// # Returns
    /// The per-file report, or a [`ScenarioFailure`] carrying the partial
    /// report and the cause.
    pub fn run(&mut self, scenario: &Scenario) -> Result<ScenarioReport, ScenarioFailure> {
        let today = self.config.today();
        info!(
            scenario = %scenario.name(),
            files = scenario.files().len(),
            %today,
            force_upsert = self.config.force_upsert,
            "starting scenario"
        );
        if scenario.is_empty() {
            warn!(scenario = %scenario.name(), "no CSV files in scenario");
        }

        let mut report = ScenarioReport::default();
        for file in scenario.files() {
            let mode = file.mode(self.config.force_upsert);
            let mut file_report = FileReport::new(&file.name, &file.object_type, mode);

            match self.process_file(file, mode, today, &mut file_report) {
                Ok(()) => {
                    file_report.state = FileState::Done;
                    info!(
                        file = %file.name,
                        created = file_report.created,
                        updated = file_report.updated,
                        warnings = file_report.warnings.len(),
                        "file done"
                    );
                    report.files.push(file_report);
                }
                Err(error) => {
                    error!(file = %file.name, stage = %file_report.state, error = %error, "file failed, stopping scenario");
                    file_report.state = FileState::Failed;
                    report.files.push(file_report);
                    return Err(ScenarioFailure {
                        file: file.name.clone(),
                        error,
                        report,
                    });
                }
            }
        }
        Ok(report)
    }

    fn process_file(
        &mut self,
        file: &SourceFile,
        mode: FileMode,
        today: NaiveDate,
        report: &mut FileReport,
    ) -> Result<(), FactoryError> {
        let object_type = file.object_type.as_str();
        info!(file = %file.name, object_type, %mode, "processing file");

        report.state = FileState::Parsing;
        let table = file.read()?;
        let plan = HeaderPlan::new(&table.headers, &self.config.alias_column);
        let captures = plan.return_captures();

        let mut drafts = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let draft = match plan.transform_row(row, today) {
                Ok(draft) => draft,
                Err(source) => {
                    report.failed += 1;
                    return Err(FactoryError::Transform {
                        file: file.name.clone(),
                        line: row.line,
                        source,
                    });
                }
            };
            if draft.is_empty() {
                debug!(file = %file.name, line = row.line, "row has no alias and no fields, skipping");
                report.skipped += 1;
                continue;
            }
            drafts.push(draft);
        }
        if drafts.is_empty() {
            warn!(file = %file.name, "no records to process");
        }

        // Every row is resolved before the first write so an unresolvable
        // reference leaves the file untouched.
        report.state = FileState::Resolving;
        let mut resolved = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match resolve_draft(&draft, &self.registry) {
                Ok(payload) => resolved.push((draft, payload)),
                Err(source) => {
                    report.failed += 1;
                    return Err(FactoryError::Resolve {
                        file: file.name.clone(),
                        line: draft.line,
                        source,
                    });
                }
            }
        }

        report.state = FileState::Writing;
        let handlers = self.handlers;
        let handler = handlers.get(object_type);
        let upsert_key = self.upsert_key(object_type, handler);
        let mut written = Vec::with_capacity(resolved.len());
        for (draft, payload) in resolved {
            let existing = match mode {
                FileMode::Upsert => self
                    .find_existing(object_type, &upsert_key, &draft, &payload)
                    .map_err(|source| FactoryError::UpsertLookup {
                        file: file.name.clone(),
                        line: draft.line,
                        object_type: object_type.to_string(),
                        source,
                    })?,
                FileMode::Create => None,
            };
            let write_mode = match existing {
                Some(_) => WriteMode::Update,
                None => WriteMode::Create,
            };
            let payload = match write_mode {
                WriteMode::Create => payload.into_iter().filter(|(_, v)| !v.is_null()).collect(),
                WriteMode::Update => payload,
            };

            let shaped = handler.shape_for_write(payload, write_mode);
            for field in shaped.stripped {
                let warning = Warning::ImmutableFieldStripped {
                    line: draft.line,
                    field,
                };
                warn!(file = %file.name, %warning, "payload shaped");
                report.warnings.push(warning);
            }

            let outcome = match &existing {
                Some(id) => self.store.update(object_type, id, &shaped.payload).map(|()| id.clone()),
                None => self.store.create(object_type, &shaped.payload),
            };
            let id = match outcome {
                Ok(id) => id,
                Err(source) => {
                    report.failed += 1;
                    return Err(FactoryError::RemoteWrite {
                        file: file.name.clone(),
                        line: draft.line,
                        object_type: object_type.to_string(),
                        source,
                    });
                }
            };

            match write_mode {
                WriteMode::Create => {
                    report.created += 1;
                    self.journal.push(object_type, id.clone(), draft.alias.clone());
                }
                WriteMode::Update => report.updated += 1,
            }
            debug!(object_type, %id, line = draft.line, alias = ?draft.alias, ?write_mode, "row written");

            if let Some(alias) = &draft.alias {
                self.registry.bind(alias, object_type, &id)?;
            }
            written.push(WrittenRow {
                line: draft.line,
                alias: draft.alias,
                id,
                mode: write_mode,
                payload: shaped.payload,
                controls: draft.controls,
            });
        }

        report.state = FileState::Capturing;
        self.capture_returns(object_type, &captures, &written, report)?;

        let mut ctx = HookContext {
            store: self.store,
            registry: &mut self.registry,
            config: &self.config,
            today,
            warnings: Vec::new(),
        };
        if let Err(e) = handler.after_write(&mut ctx, object_type, &written) {
            ctx.warn(Warning::HookFailed {
                handler: handler.name().to_string(),
                message: e.to_string(),
            });
        }
        report.warnings.append(&mut ctx.warnings);
        Ok(())
    }

    /// Polls every `_Return:` field of the written rows into the registry.
    /// Failures become warnings; the writes already succeeded.
    fn capture_returns(
        &mut self,
        object_type: &str,
        captures: &[String],
        written: &[WrittenRow],
        report: &mut FileReport,
    ) -> Result<(), FactoryError> {
        if captures.is_empty() || written.is_empty() {
            return Ok(());
        }
        info!(object_type, fields = ?captures, rows = written.len(), "capturing return fields");

        for row in written {
            for field in captures {
                let Some(alias) = &row.alias else {
                    let warning = Warning::CaptureWithoutAlias {
                        line: row.line,
                        field: field.clone(),
                    };
                    warn!(object_type, %warning, "capture skipped");
                    report.warnings.push(warning);
                    continue;
                };
                match self
                    .store
                    .poll_field(object_type, &row.id, field, &self.config.capture_poll)
                {
                    Ok(value) => self.registry.capture(alias, field, value)?,
                    Err(e) => {
                        let warning = Warning::CaptureFailed {
                            line: row.line,
                            alias: alias.clone(),
                            field: field.clone(),
                            message: e.to_string(),
                        };
                        warn!(object_type, %warning, "capture failed");
                        report.warnings.push(warning);
                    }
                }
            }
        }
        Ok(())
    }

    /// Upsert key: handler override, then config override, then the default.
    fn upsert_key(&self, object_type: &str, handler: &dyn RecordHandler) -> String {
        handler
            .upsert_key()
            .map(str::to_string)
            .or_else(|| self.config.upsert_keys.get(object_type).cloned())
            .unwrap_or_else(|| self.config.default_upsert_key.clone())
    }

    /// Finds the record an upsert row should update.
    ///
    /// In order: the record the alias is already bound to in this run, an
    /// exact match on the upsert key, a record whose name contains the alias.
    fn find_existing(
        &self,
        object_type: &str,
        key: &str,
        draft: &RowDraft,
        payload: &Fields,
    ) -> Result<Option<RecordId>, StoreError> {
        if let Some(entry) = draft.alias.as_deref().and_then(|a| self.registry.get(a)) {
            if entry.object_type == object_type {
                return Ok(Some(entry.remote_id.clone()));
            }
        }

        if let Some(value) = payload.get(key).filter(|v| !v.is_null()) {
            let matches: Vec<Record> = self
                .store
                .query(object_type, &RecordFilter::equals(key, value.clone()))?
                .into_iter()
                .filter(|r| self.is_claimable(draft, &r.id))
                .collect();
            if matches.len() > 1 {
                warn!(object_type, key, count = matches.len(), "several records match, updating the first");
            }
            if let Some(record) = matches.into_iter().next() {
                return Ok(Some(record.id));
            }
        }

        let Some(alias) = draft.alias.as_deref() else {
            return Ok(None);
        };
        let needle = alias.to_lowercase();
        let matches = self
            .store
            .query(object_type, &RecordFilter::name_like(format!("%{alias}%")))?;
        Ok(matches
            .into_iter()
            .find(|r| {
                self.is_claimable(draft, &r.id)
                    && r.str_field("Name")
                        .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .map(|r| r.id))
    }

    /// A record already bound to another alias in this run is never matched
    /// by a row that declares its own alias.
    fn is_claimable(&self, draft: &RowDraft, id: &RecordId) -> bool {
        match (draft.alias.as_deref(), self.registry.alias_of(id)) {
            (Some(own), Some(bound)) => own == bound,
            _ => true,
        }
    }
}
