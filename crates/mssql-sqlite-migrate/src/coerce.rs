//! Per-value transforms applied while moving rows between engines.
//!
//! SQLite has no native datetime or decimal storage: calendar timestamps are
//! encoded as a continuous fractional day count (Julian Day, day 0 at the
//! proleptic Julian epoch) and decimals as their canonical text. Going back
//! toward SQL Server the decode decision is driven by the destination
//! column's declared type, never by sniffing the value's shape.

use crate::catalog;
use crate::error::{MigrateError, Result};
use crate::schema::Column;
use crate::value::SqlValue;
use chrono::{DateTime, NaiveDateTime, Offset};
use rust_decimal::Decimal;

/// Julian Day number of the Unix epoch (1970-01-01T00:00:00Z).
const UNIX_EPOCH_DAY_COUNT: f64 = 2_440_587.5;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Day count of 0001-01-01T00:00:00, inclusive lower bound of the
/// plausible window.
pub const MIN_PLAUSIBLE_DAY_COUNT: f64 = 1_721_425.5;

/// Day count of 10000-01-01T00:00:00, exclusive upper bound of the
/// plausible window (the last accepted instant is in year 9999).
pub const MAX_PLAUSIBLE_DAY_COUNT: f64 = 5_373_484.5;

/// Encode a calendar timestamp as a fractional day count.
pub fn to_day_count(dt: NaiveDateTime) -> f64 {
    UNIX_EPOCH_DAY_COUNT + dt.and_utc().timestamp_millis() as f64 / MS_PER_DAY
}

/// Decode a day count back to a timestamp, rounded to the nearest
/// millisecond. Returns `None` when the value falls outside the plausible
/// calendar window.
pub fn from_day_count(day_count: f64) -> Option<NaiveDateTime> {
    if !in_calendar_range(day_count) {
        return None;
    }

    let millis = ((day_count - UNIX_EPOCH_DAY_COUNT) * MS_PER_DAY).round() as i64;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Whether a numeric value lies within the calendar window accepted by
/// [`from_day_count`] (years 1 through 9999).
pub fn in_calendar_range(day_count: f64) -> bool {
    (MIN_PLAUSIBLE_DAY_COUNT..MAX_PLAUSIBLE_DAY_COUNT).contains(&day_count)
}

/// The local UTC offset in whole hours.
pub fn local_utc_offset_hours() -> i32 {
    chrono::Local::now().offset().fix().local_minus_utc() / 3600
}

/// Double single quotes for embedding in a textual statement.
///
/// Data values are bound as parameters throughout this crate; this helper
/// exists only for the rare literal that cannot be bound (default-value
/// expressions carried into DDL).
pub fn escape_single_quotes(value: &str) -> String {
    value.replace('\'', "''")
}

/// Coerce a source value into what SQLite can store: timestamps become day
/// counts, decimals become canonical text. Everything else passes through.
pub fn for_sqlite(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::DateTime(dt) => SqlValue::F64(to_day_count(dt)),
        SqlValue::Decimal(d) => SqlValue::Text(d.to_string()),
        other => other,
    }
}

/// Coerce a SQLite-sourced value for an SQL Server destination column.
///
/// The destination column's declared type decides the decode: a datetime
/// column receiving a numeric value gets a day-count decode (validated
/// against the calendar window), a decimal column receiving text gets a
/// decimal parse. Values that cannot be decoded fail with `RowCoercion`,
/// which skips the row without aborting the table.
pub fn for_mssql(value: SqlValue, dest: &Column) -> Result<SqlValue> {
    if catalog::is_datetime_type(&dest.data_type) {
        return match value {
            SqlValue::F64(day_count) => from_day_count(day_count)
                .map(SqlValue::DateTime)
                .ok_or_else(|| MigrateError::RowCoercion {
                    column: dest.name.clone(),
                    message: format!("day count {} outside calendar range", day_count),
                }),
            SqlValue::I64(days) => from_day_count(days as f64)
                .map(SqlValue::DateTime)
                .ok_or_else(|| MigrateError::RowCoercion {
                    column: dest.name.clone(),
                    message: format!("day count {} outside calendar range", days),
                }),
            other => Ok(other),
        };
    }

    if catalog::is_decimal_type(&dest.data_type) {
        return match value {
            SqlValue::Text(s) => s
                .parse::<Decimal>()
                .map(SqlValue::Decimal)
                .map_err(|e| MigrateError::RowCoercion {
                    column: dest.name.clone(),
                    message: format!("cannot parse '{}' as decimal: {}", s, e),
                }),
            other => Ok(other),
        };
    }

    Ok(value)
}
