//! Scenario result report: per-file counts, states and warnings.

use std::fmt;

use crate::source::FileMode;

/// Lifecycle of one source file inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    Parsing,
    Resolving,
    Writing,
    Capturing,
    Done,
    Failed,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileState::Pending => "pending",
            FileState::Parsing => "parsing",
            FileState::Resolving => "resolving",
            FileState::Writing => "writing",
            FileState::Capturing => "capturing",
            FileState::Done => "done",
            FileState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Non-fatal outcome attached to a file.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A `_Return:` field could not be fetched after the write
    CaptureFailed {
        line: u64,
        alias: String,
        field: String,
        message: String,
    },
    /// A `_Return:` column on a row without alias has nowhere to go
    CaptureWithoutAlias { line: u64, field: String },
    /// Insert-only field removed from an update payload
    ImmutableFieldStripped { line: u64, field: String },
    /// A handler hook failed after the primary write succeeded
    HookFailed { handler: String, message: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::CaptureFailed {
                line,
                alias,
                field,
                message,
            } => write!(f, "line {line}: capture of {alias}.{field} failed: {message}"),
            Warning::CaptureWithoutAlias { line, field } => {
                write!(f, "line {line}: '{field}' requested but the row has no alias")
            }
            Warning::ImmutableFieldStripped { line, field } => {
                write!(f, "line {line}: insert-only field '{field}' dropped from update")
            }
            Warning::HookFailed { handler, message } => {
                write!(f, "{handler} hook failed: {message}")
            }
        }
    }
}

/// Outcome of one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub file: String,
    pub object_type: String,
    pub mode: FileMode,
    pub state: FileState,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub warnings: Vec<Warning>,
}

impl FileReport {
    /// Creates a pending report for a file.
    pub fn new(file: &str, object_type: &str, mode: FileMode) -> Self {
        Self {
            file: file.to_string(),
            object_type: object_type.to_string(),
            mode,
            state: FileState::Pending,
            created: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            warnings: Vec::new(),
        }
    }
}

/// Outcome of a scenario run, one entry per file attempted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioReport {
    pub files: Vec<FileReport>,
}

impl ScenarioReport {
    /// Total records created.
    pub fn created(&self) -> usize {
        self.files.iter().map(|f| f.created).sum()
    }

    /// Total records updated.
    pub fn updated(&self) -> usize {
        self.files.iter().map(|f| f.updated).sum()
    }

    /// Total failed rows.
    pub fn failed(&self) -> usize {
        self.files.iter().map(|f| f.failed).sum()
    }

    /// All warnings in file order.
    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.files.iter().flat_map(|f| f.warnings.iter())
    }

    /// Looks up a file's report by name.
    pub fn file(&self, name: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.file == name)
    }
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    /// Records actually removed, by object type, in deletion order
    pub deleted: Vec<(String, usize)>,
    /// Records that were already gone
    pub already_gone: usize,
    /// Failures that did not stop the cleanup
    pub errors: Vec<String>,
}

impl CleanupReport {
    /// Total records removed.
    pub fn deleted_total(&self) -> usize {
        self.deleted.iter().map(|(_, n)| n).sum()
    }

    /// Records a batch of deletions of one type.
    pub fn record_deleted(&mut self, object_type: &str, count: usize) {
        if count == 0 {
            return;
        }
        self.deleted.push((object_type.to_string(), count));
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: CleanupReport) {
        self.deleted.extend(other.deleted);
        self.already_gone += other.already_gone;
        self.errors.extend(other.errors);
    }

    /// Returns true when no delete failed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
