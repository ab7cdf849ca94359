//! Splits one wide "mega" CSV into a scenario directory.
//!
//! The header row of the input holds section markers such as `01_Account`
//! followed by that section's columns. Each section becomes its own file,
//! renumbered in order of appearance.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::SourceError;

/// One section of a mega CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Marker as written in the header (e.g. `01_Account`)
    pub marker: String,
    /// Output file name after renumbering (e.g. `01_Account.csv`)
    pub file_name: String,
    /// Column range of the section in the input, marker excluded
    pub columns: std::ops::Range<usize>,
}

/// Result of a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    /// Written files in section order
    pub files: Vec<PathBuf>,
    /// Data rows read from the input
    pub rows: usize,
}

/// Parses a section marker `<digits>_<object>` into the object name.
fn parse_marker(cell: &str) -> Option<&str> {
    let (digits, object) = cell.trim().split_once('_')?;
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && !object.is_empty()
        && object.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(object)
}

/// Finds the sections of a mega-CSV header.
pub fn find_sections(headers: &[String]) -> Vec<Section> {
    let mut starts: Vec<(usize, &str, &str)> = Vec::new();
    for (idx, cell) in headers.iter().enumerate() {
        if let Some(object) = parse_marker(cell) {
            starts.push((idx, cell.trim(), object));
        }
    }

    starts
        .iter()
        .enumerate()
        .map(|(n, (idx, marker, object))| {
            let end = starts.get(n + 1).map_or(headers.len(), |(next, _, _)| *next);
            Section {
                marker: marker.to_string(),
                file_name: format!("{:02}_{}.csv", n + 1, object),
                columns: idx + 1..end,
            }
        })
        .collect()
}

/// Splits `input` into one CSV per section under `out_dir`.
///
/// Rows whose cells are all empty within a section are not written to that
/// section's file.
pub fn split_mega_csv(input: &Path, out_dir: &Path) -> Result<SplitOutcome, SourceError> {
    let io_error = |path: &Path, e: &dyn std::fmt::Display| SourceError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    if !input.is_file() {
        return Err(SourceError::NotFound {
            path: input.display().to_string(),
        });
    }
    let raw = fs::read_to_string(input).map_err(|e| io_error(input, &e))?;
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let (headers, rows) = read_padded(name, &raw)?;

    let sections = find_sections(&headers);
    if sections.is_empty() {
        return Err(SourceError::MalformedSource {
            file: name.to_string(),
            line: 1,
            message: "no section markers found (expected e.g. 01_Account)".to_string(),
        });
    }
    for section in &sections {
        debug!(marker = %section.marker, file = %section.file_name, "section found");
    }

    fs::create_dir_all(out_dir).map_err(|e| io_error(out_dir, &e))?;
    let mut files = Vec::with_capacity(sections.len());
    for section in &sections {
        let path = out_dir.join(&section.file_name);
        let mut writer = csv::Writer::from_path(&path).map_err(|e| io_error(&path, &e))?;
        writer
            .write_record(&headers[section.columns.clone()])
            .map_err(|e| io_error(&path, &e))?;

        let mut written = 0;
        for row in &rows {
            let cells = &row[section.columns.clone()];
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            writer.write_record(cells).map_err(|e| io_error(&path, &e))?;
            written += 1;
        }
        writer.flush().map_err(|e| io_error(&path, &e))?;
        info!(file = %section.file_name, rows = written, "section written");
        files.push(path);
    }

    Ok(SplitOutcome {
        files,
        rows: rows.len(),
    })
}

/// Reads the mega CSV leniently: spreadsheet exports drop trailing empty
/// cells, so short rows are padded with empty cells and long rows cut to
/// the header width. Fully blank rows are skipped.
fn read_padded(file: &str, raw: &str) -> Result<(Vec<String>, Vec<Vec<String>>), SourceError> {
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

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            malformed(line, e.to_string())
        })?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let mut cells: Vec<String> = record.iter().take(headers.len()).map(str::to_string).collect();
        cells.resize(headers.len(), String::new());
        rows.push(cells);
    }
    Ok((headers, rows))
}
