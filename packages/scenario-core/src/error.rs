//! Error types for scenario loading, resolution, writes and cleanup.

use thiserror::Error;

use crate::report::ScenarioReport;

/// Errors raised while locating or reading tabular sources.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Scenario directory or source file does not exist
    #[error("Source '{path}' not found")]
    NotFound { path: String },

    /// I/O failure while reading or writing a source
    #[error("I/O error on '{path}': {message}")]
    Io { path: String, message: String },

    /// Structural CSV error (header/value count mismatch, bad encoding)
    #[error("Malformed source '{file}' at line {line}: {message}")]
    MalformedSource {
        file: String,
        line: u64,
        message: String,
    },
}

/// Errors raised while turning a raw cell into a field value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Relative-date cell is not an integer day offset
    #[error("Invalid date offset '{value}' in column '{column}'")]
    InvalidDateOffset { column: String, value: String },

    /// Reference cell is not `Alias` or `Alias.Field`
    #[error("Invalid alias expression '{value}' in column '{column}'")]
    InvalidAliasExpr { column: String, value: String },
}

/// Errors raised while resolving an alias expression against the registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// Alias has not been written yet in this run
    #[error("Unresolved alias '{alias}' referenced by column '{column}'")]
    UnresolvedAlias { alias: String, column: String },

    /// Alias exists but the field was never captured for it
    #[error("Unresolved field '{field}' on alias '{alias}' referenced by column '{column}'")]
    UnresolvedField {
        alias: String,
        field: String,
        column: String,
    },
}

/// Alias registry errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Alias already bound to a different record
    #[error("Alias '{alias}' is already bound to {existing}, cannot rebind to {attempted}")]
    AliasRebound {
        alias: String,
        existing: String,
        attempted: String,
    },

    /// Capture targeted an alias that was never bound
    #[error("Alias '{alias}' is not registered")]
    UnknownAlias { alias: String },
}

/// Remote record store errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Record does not exist (or was already deleted)
    #[error("Record '{id}' not found in '{object_type}'")]
    NotFound { object_type: String, id: String },

    /// Store rejected the payload
    #[error("'{object_type}' rejected the request: {message}")]
    Rejected {
        object_type: String,
        message: String,
    },

    /// Bounded poll gave up before the value became visible
    #[error("Timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },

    /// Transport-level failure (connection, protocol, decoding)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Lock poisoned (RwLock poisoned)
    #[error("Lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Returns true when the error means the record is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Hard-stop errors surfaced by the scenario materializer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactoryError {
    /// Source could not be read or is structurally malformed
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Cell could not be transformed
    #[error("{file} line {line}: {source}")]
    Transform {
        file: String,
        line: u64,
        #[source]
        source: TransformError,
    },

    /// Reference could not be resolved
    #[error("{file} line {line}: {source}")]
    Resolve {
        file: String,
        line: u64,
        #[source]
        source: ResolveError,
    },

    /// Remote store rejected a create or update
    #[error("{file} line {line}: write to '{object_type}' failed: {source}")]
    RemoteWrite {
        file: String,
        line: u64,
        object_type: String,
        #[source]
        source: StoreError,
    },

    /// Existing-record lookup for upsert failed
    #[error("{file} line {line}: upsert lookup on '{object_type}' failed: {source}")]
    UpsertLookup {
        file: String,
        line: u64,
        object_type: String,
        #[source]
        source: StoreError,
    },

    /// Alias registry rejected a binding
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A scenario run that stopped at a failing file.
///
/// Carries the report of every file processed so far, the failing file
/// included, so callers can still print per-file counts.
#[derive(Error, Debug, Clone)]
#[error("Scenario aborted at '{file}': {error}")]
pub struct ScenarioFailure {
    /// Source file that failed
    pub file: String,
    /// Cause of the abort
    #[source]
    pub error: FactoryError,
    /// Partial report up to and including the failing file
    pub report: ScenarioReport,
}
