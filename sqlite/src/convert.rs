//! Conversion between [`SqlValue`] and rusqlite's value types.

use rusqlite::types::{Value, ValueRef};
use schema_ledger_core::SqlValue;

use crate::error::{Result, SqliteError};

/// Converts an engine parameter to an owned rusqlite value.
///
/// Booleans are stored as `0`/`1`, which is how SQLite represents them.
pub(crate) fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Bool(v) => Value::Integer(i64::from(*v)),
    }
}

/// Converts a borrowed column value into an engine value.
///
/// Blobs have no counterpart in [`SqlValue`] and are rejected.
pub(crate) fn from_sqlite(column: &str, value: ValueRef<'_>) -> Result<SqlValue> {
    match value {
        ValueRef::Null => Ok(SqlValue::Null),
        ValueRef::Integer(v) => Ok(SqlValue::Integer(v)),
        ValueRef::Real(v) => Ok(SqlValue::Real(v)),
        ValueRef::Text(bytes) => Ok(SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(_) => Err(SqliteError::ConversionError {
            column: column.to_string(),
            kind: "blob",
        }),
    }
}
