//! Relative-date cells: integer day offsets from "today".

use chrono::{Duration, NaiveDate};

use crate::error::TransformError;

/// Date format expected by the record store.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Resolves a day offset against `today` and formats it for the store.
///
/// # Arguments
/// * `column` - Column the value came from (for error reporting)
/// * `raw` - Raw cell value, e.g. `"-3"` or `"14"`
/// * `today` - Reference date fixed for the run
///
/// # Returns
/// `Result<String, TransformError>` with the formatted date.
pub fn relative_date(column: &str, raw: &str, today: NaiveDate) -> Result<String, TransformError> {
    let invalid = || TransformError::InvalidDateOffset {
        column: column.to_string(),
        value: raw.to_string(),
    };
    let offset: i64 = raw.trim().parse().map_err(|_| invalid())?;
    let days = Duration::try_days(offset).ok_or_else(invalid)?;
    let date = today.checked_add_signed(days).ok_or_else(invalid)?;
    Ok(date.format(DATE_FORMAT).to_string())
}
