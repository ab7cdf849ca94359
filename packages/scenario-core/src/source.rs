//! Tabular source provider: scenario directories of CSV files.
//!
//! A scenario is a directory; its sources are the `*.csv` files in
//! lexicographic filename order. Object type and mode come from the
//! filename: `02_Vehicle.csv` creates `Vehicle` records,
//! `03_BranchUnit_update.csv` upserts `BranchUnit` records.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SourceError;

const UPDATE_MARKER: &str = "_update";
const PREFIX_SEPARATOR: &str = " - ";

/// Write mode of a whole source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Every row creates a record
    Create,
    /// Rows update a matching record, or create one if none matches
    Upsert,
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileMode::Create => write!(f, "INSERT ONLY"),
            FileMode::Upsert => write!(f, "UPSERT"),
        }
    }
}

/// Extracts the object type from a source filename.
///
/// `01_Account.csv` -> `Account`, `Prefix - 02_Product2.csv` -> `Product2`,
/// `06_BranchUnit_update.csv` -> `BranchUnit`.
pub fn object_type_from_filename(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let stem = stem.rsplit(PREFIX_SEPARATOR).next().unwrap_or(stem);
    let stem = stem.trim_start_matches(|c: char| c.is_ascii_digit() || c == '_');
    if stem.to_ascii_lowercase().ends_with(UPDATE_MARKER) {
        stem[..stem.len() - UPDATE_MARKER.len()].to_string()
    } else {
        stem.to_string()
    }
}

/// Returns true if the filename carries the update marker.
pub fn has_update_marker(filename: &str) -> bool {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_ascii_lowercase()
        .contains(UPDATE_MARKER)
}

/// One CSV source of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Full path
    pub path: PathBuf,
    /// File name (sort key)
    pub name: String,
    /// Object type derived from the name
    pub object_type: String,
    /// Whether the name carries the update marker
    pub update_marker: bool,
}

impl SourceFile {
    /// Builds a source from a path, or `None` if it is not a CSV file.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        if !name.to_ascii_lowercase().ends_with(".csv") {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            object_type: object_type_from_filename(&name),
            update_marker: has_update_marker(&name),
            name,
        })
    }

    /// Effective mode: the update marker or a forced run-wide upsert wins.
    pub fn mode(&self, force_upsert: bool) -> FileMode {
        if force_upsert || self.update_marker {
            FileMode::Upsert
        } else {
            FileMode::Create
        }
    }

    /// Reads and structurally validates the file.
    pub fn read(&self) -> Result<SourceTable, SourceError> {
        let mut raw = String::new();
        fs::File::open(&self.path)
            .and_then(|mut f| f.read_to_string(&mut raw))
            .map_err(|e| SourceError::Io {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        SourceTable::parse(&self.name, &raw)
    }
}

/// A data row with its 1-based line number in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// Line number (header is line 1)
    pub line: u64,
    /// Cells in header order
    pub cells: Vec<String>,
}

/// Parsed CSV content: header plus rows of equal width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTable {
    /// Raw header strings in column order
    pub headers: Vec<String>,
    /// Non-blank rows
    pub rows: Vec<SourceRow>,
}

impl SourceTable {
    /// Parses CSV text. Rows whose width differs from the header are a
    /// [`SourceError::MalformedSource`]; rows with only blank cells are dropped.
    pub fn parse(file: &str, raw: &str) -> Result<Self, SourceError> {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        let malformed = |line: u64, message: String| SourceError::MalformedSource {
            file: file.to_string(),
            line,
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(raw.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| malformed(1, e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(malformed(1, "missing header row".to_string()));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                malformed(line, e.to_string())
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.len() != headers.len() {
                return Err(malformed(
                    line,
                    format!(
                        "expected {} values, found {}",
                        headers.len(),
                        record.len()
                    ),
                ));
            }
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            rows.push(SourceRow {
                line,
                cells: record.iter().map(str::to_string).collect(),
            });
        }

        Ok(Self { headers, rows })
    }
}

/// An ordered set of source files.
#[derive(Debug, Clone)]
pub struct Scenario {
    root: PathBuf,
    files: Vec<SourceFile>,
}

impl Scenario {
    /// Opens a scenario directory and orders its CSV sources by filename.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(SourceError::NotFound {
                path: root.display().to_string(),
            });
        }
        let entries = fs::read_dir(root).map_err(|e| SourceError::Io {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SourceError::Io {
                path: root.display().to_string(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(source) = SourceFile::from_path(&path) {
                files.push(source);
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(root = %root.display(), files = files.len(), "scenario opened");

        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    /// Builds a scenario from explicit sources, keeping their order.
    ///
    /// Lets callers replay files in an order other than the directory's.
    pub fn from_files(root: impl Into<PathBuf>, files: Vec<SourceFile>) -> Self {
        Self {
            root: root.into(),
            files,
        }
    }

    /// Scenario directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scenario name (directory name).
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Sources in processing order.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Returns true if the scenario has no CSV sources.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
