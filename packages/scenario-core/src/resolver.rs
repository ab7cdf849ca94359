//! Reference resolver: turns deferred alias lookups into concrete values.
//!
//! Resolution happens at write time against the registry as it stands. No
//! retries, no look-ahead: an alias that is not bound yet is an error.

use serde_json::Value;

use crate::alias::{AliasExpr, AliasRegistry};
use crate::error::ResolveError;
use crate::store::Fields;
use crate::transform::{CellValue, RowDraft};

/// Resolves one alias expression.
///
/// # Arguments
/// * `column` - Source column (for error reporting)
/// * `expr` - `Alias` or `Alias.Field`
/// * `registry` - Aliases bound so far in this run
///
/// # Returns
/// The remote id (as a string) for `Alias`, the last captured value for
/// `Alias.Field`.
pub fn resolve(
    column: &str,
    expr: &AliasExpr,
    registry: &AliasRegistry,
) -> Result<Value, ResolveError> {
    let entry = registry
        .get(&expr.alias)
        .ok_or_else(|| ResolveError::UnresolvedAlias {
            alias: expr.alias.clone(),
            column: column.to_string(),
        })?;

    match &expr.field {
        None => Ok(Value::String(entry.remote_id.as_str().to_string())),
        Some(field) => entry
            .captured
            .get(field)
            .cloned()
            .ok_or_else(|| ResolveError::UnresolvedField {
                alias: expr.alias.clone(),
                field: field.clone(),
                column: column.to_string(),
            }),
    }
}

/// Builds the write payload of a row, resolving every deferred field.
///
/// Explicit clears become `null`; the caller drops them for creates.
pub fn resolve_draft(draft: &RowDraft, registry: &AliasRegistry) -> Result<Fields, ResolveError> {
    let mut payload = Fields::new();
    for field in &draft.fields {
        let value = match &field.value {
            CellValue::Set(value) => value.clone(),
            CellValue::Clear => Value::Null,
            CellValue::Deferred(expr) => resolve(&field.column, expr, registry)?,
        };
        payload.insert(field.field.clone(), value);
    }
    Ok(payload)
}
