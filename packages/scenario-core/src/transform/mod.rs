//! Field transform layer: classifies column headers once per file and turns
//! raw cells into field values or deferred alias lookups.

mod date;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::alias::AliasExpr;
use crate::error::TransformError;
use crate::source::SourceRow;

pub use date::{relative_date, DATE_FORMAT};

/// Header prefix of return-capture columns.
pub const RETURN_PREFIX: &str = "_Return:";
/// Header prefix of reference columns.
pub const REFERENCE_PREFIX: &str = "_Ref:";
/// Header suffix of relative-date columns.
pub const DATE_SUFFIX: &str = "__date";
/// Cell literal requesting an explicit clear on update.
pub const CLEAR_LITERAL: &str = "#N/A";

/// Control columns consumed by handlers (consent toggles and their dates).
pub const KNOWN_CONTROLS: &[&str] = &[
    "_HasOptedOutSolicit",
    "_EmailConsent",
    "_SMSConsent",
    "_EffectiveTo__date",
];

/// Prefix of per-channel, per-purpose consent overrides.
pub const DATA_USE_PURPOSE_PREFIX: &str = "_DataUsePurpose_";

/// Typed instruction derived from one column header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldInstruction {
    /// Passed through unchanged
    Plain { field: String },
    /// Integer day offset resolved against today
    RelativeDate { field: String },
    /// Value looked up from the alias registry
    Reference { field: String },
    /// Not sent; fetched from the store after the write
    ReturnCapture { field: String },
    /// Consumed by the engine or a handler, never sent
    Control { name: String },
}

impl FieldInstruction {
    /// Classifies a header.
    ///
    /// Precedence: known control names > `_Return:` > `_Ref:` > any other
    /// leading underscore > `__date` suffix > plain.
    pub fn classify(header: &str, alias_column: &str) -> Self {
        let header = header.trim();
        if header == alias_column
            || KNOWN_CONTROLS.contains(&header)
            || header.starts_with(DATA_USE_PURPOSE_PREFIX)
        {
            return FieldInstruction::Control {
                name: header.to_string(),
            };
        }
        if let Some(field) = header.strip_prefix(RETURN_PREFIX) {
            return FieldInstruction::ReturnCapture {
                field: field.to_string(),
            };
        }
        if let Some(field) = header.strip_prefix(REFERENCE_PREFIX) {
            return FieldInstruction::Reference {
                field: field.to_string(),
            };
        }
        if header.starts_with('_') {
            return FieldInstruction::Control {
                name: header.to_string(),
            };
        }
        if let Some(field) = header.strip_suffix(DATE_SUFFIX) {
            return FieldInstruction::RelativeDate {
                field: field.to_string(),
            };
        }
        FieldInstruction::Plain {
            field: header.to_string(),
        }
    }
}

/// Transformed value of one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Immediately known value
    Set(Value),
    /// Explicit clear (`#N/A`): null on update, omitted on create
    Clear,
    /// Resolved from the alias registry at write time
    Deferred(AliasExpr),
}

/// One transformed field of a row.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftField {
    /// Source column (for error reporting)
    pub column: String,
    /// Target field name
    pub field: String,
    /// Value or deferred lookup
    pub value: CellValue,
}

/// A row after the transform step, before reference resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDraft {
    /// Source line number
    pub line: u64,
    /// Declared alias, if any
    pub alias: Option<String>,
    /// Writable fields in column order
    pub fields: Vec<DraftField>,
    /// Non-empty control cells by column name
    pub controls: BTreeMap<String, String>,
}

impl RowDraft {
    /// Returns true if the row has nothing to write and no alias.
    pub fn is_empty(&self) -> bool {
        self.alias.is_none() && self.fields.is_empty()
    }

    /// Returns the immediate string value of a field, if set.
    pub fn plain_str(&self, field: &str) -> Option<&str> {
        self.fields.iter().find_map(|f| match &f.value {
            CellValue::Set(Value::String(s)) if f.field == field => Some(s.as_str()),
            _ => None,
        })
    }
}

/// Column classification of one source file, computed once and reused per row.
#[derive(Debug, Clone)]
pub struct HeaderPlan {
    columns: Vec<(String, FieldInstruction)>,
    alias_column: String,
}

impl HeaderPlan {
    /// Classifies every header of a file.
    pub fn new(headers: &[String], alias_column: &str) -> Self {
        Self {
            columns: headers
                .iter()
                .map(|h| (h.clone(), FieldInstruction::classify(h, alias_column)))
                .collect(),
            alias_column: alias_column.to_string(),
        }
    }

    /// Instructions in column order.
    pub fn instructions(&self) -> impl Iterator<Item = &FieldInstruction> {
        self.columns.iter().map(|(_, i)| i)
    }

    /// Fields declared by `_Return:` columns.
    pub fn return_captures(&self) -> Vec<String> {
        self.instructions()
            .filter_map(|i| match i {
                FieldInstruction::ReturnCapture { field } => Some(field.clone()),
                _ => None,
            })
            .collect()
    }

    /// Transforms one row.
    ///
    /// Empty cells are omitted; `TRUE`/`FALSE` become booleans; relative
    /// dates are resolved against `today`; references become deferred
    /// lookups.
    pub fn transform_row(&self, row: &SourceRow, today: NaiveDate) -> Result<RowDraft, TransformError> {
        let mut draft = RowDraft {
            line: row.line,
            alias: None,
            fields: Vec::new(),
            controls: BTreeMap::new(),
        };

        for ((column, instruction), raw) in self.columns.iter().zip(&row.cells) {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let clear = trimmed == CLEAR_LITERAL;

            let (field, value) = match instruction {
                FieldInstruction::Control { name } => {
                    if name == &self.alias_column {
                        draft.alias = Some(trimmed.to_string());
                    } else {
                        draft.controls.insert(name.clone(), trimmed.to_string());
                    }
                    continue;
                }
                FieldInstruction::ReturnCapture { .. } => continue,
                FieldInstruction::Plain { field } if clear => (field, CellValue::Clear),
                FieldInstruction::Plain { field } => (field, CellValue::Set(plain_value(raw))),
                FieldInstruction::RelativeDate { field } if clear => (field, CellValue::Clear),
                FieldInstruction::RelativeDate { field } => (
                    field,
                    CellValue::Set(Value::String(relative_date(column, trimmed, today)?)),
                ),
                FieldInstruction::Reference { field } if clear => (field, CellValue::Clear),
                FieldInstruction::Reference { field } => {
                    (field, CellValue::Deferred(AliasExpr::parse(column, trimmed)?))
                }
            };
            draft.fields.push(DraftField {
                column: column.clone(),
                field: field.clone(),
                value,
            });
        }

        Ok(draft)
    }
}

/// Converts a plain cell: `TRUE`/`FALSE` (any case) become booleans.
fn plain_value(raw: &str) -> Value {
    match raw.trim().to_ascii_uppercase().as_str() {
        "TRUE" => Value::Bool(true),
        "FALSE" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
