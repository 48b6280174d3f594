//! SQL value enum bridging tiberius rows and rusqlite parameters.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

/// A single cell value in transit between the two engines.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Blob(Vec<u8>),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Human-readable type tag for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::I64(_) => "integer",
            SqlValue::F64(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::DateTime(_) => "datetime",
        }
    }
}

/// Conversion for binding into SQLite. Types SQLite has no storage class
/// for fall back to the coercions of [`crate::coerce`]: decimals become
/// their canonical text, timestamps become day-count reals.
impl From<SqlValue> for rusqlite::types::Value {
    fn from(value: SqlValue) -> Self {
        use rusqlite::types::Value;

        match value {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Integer(b as i64),
            SqlValue::I64(i) => Value::Integer(i),
            SqlValue::F64(f) => Value::Real(f),
            SqlValue::Text(s) => Value::Text(s),
            SqlValue::Blob(b) => Value::Blob(b),
            SqlValue::Decimal(d) => Value::Text(d.to_string()),
            SqlValue::DateTime(dt) => Value::Real(crate::coerce::to_day_count(dt)),
        }
    }
}
