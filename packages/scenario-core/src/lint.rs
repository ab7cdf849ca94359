//! Static reference-order check of a scenario.
//!
//! The materializer fails late: an alias referenced before it is written
//! stops the run at that file. This check finds the same problems up front
//! by reading every file without touching the store.

use std::collections::HashMap;
use std::fmt;

use crate::alias::AliasExpr;
use crate::error::SourceError;
use crate::source::Scenario;
use crate::transform::{FieldInstruction, CLEAR_LITERAL};

/// A reference that cannot resolve when files run in their current order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIssue {
    pub file: String,
    pub line: u64,
    pub column: String,
    pub alias: String,
    /// File declaring the alias, when it is declared later in the order
    pub declared_in: Option<String>,
}

impl fmt::Display for OrderIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} line {}: '{}' references alias '{}'", self.file, self.line, self.column, self.alias)?;
        match &self.declared_in {
            Some(file) if file == &self.file => write!(f, " declared in the same file"),
            Some(file) => write!(f, " declared later in {file}"),
            None => write!(f, " that no file declares"),
        }
    }
}

/// Checks that every `_Ref:` alias is declared by an earlier file.
///
/// # Returns
/// Every offending reference, in file and line order. Empty means the
/// ordering is sound.
pub fn check_reference_order(
    scenario: &Scenario,
    alias_column: &str,
) -> Result<Vec<OrderIssue>, SourceError> {
    let mut tables = Vec::with_capacity(scenario.files().len());
    let mut declared_by: HashMap<String, usize> = HashMap::new();

    for (idx, file) in scenario.files().iter().enumerate() {
        let table = file.read()?;
        if let Some(col) = table.headers.iter().position(|h| h == alias_column) {
            for row in &table.rows {
                let alias = row.cells[col].trim();
                if !alias.is_empty() {
                    declared_by.entry(alias.to_string()).or_insert(idx);
                }
            }
        }
        tables.push(table);
    }

    let mut issues = Vec::new();
    for (idx, (file, table)) in scenario.files().iter().zip(&tables).enumerate() {
        for (col, header) in table.headers.iter().enumerate() {
            if !matches!(
                FieldInstruction::classify(header, alias_column),
                FieldInstruction::Reference { .. }
            ) {
                continue;
            }
            for row in &table.rows {
                let raw = row.cells[col].trim();
                if raw.is_empty() || raw == CLEAR_LITERAL {
                    continue;
                }
                // Malformed expressions are reported by the run itself.
                let Ok(expr) = AliasExpr::parse(header, raw) else {
                    continue;
                };
                let declared = declared_by.get(&expr.alias).copied();
                if declared.is_some_and(|d| d < idx) {
                    continue;
                }
                issues.push(OrderIssue {
                    file: file.name.clone(),
                    line: row.line,
                    column: header.clone(),
                    alias: expr.alias,
                    declared_in: declared.map(|d| scenario.files()[d].name.clone()),
                });
            }
        }
    }
    issues.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
    Ok(issues)
}
