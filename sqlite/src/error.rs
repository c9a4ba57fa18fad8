//! Error types for the SQLite backend.

use schema_ledger_core::ConnectionError;
use thiserror::Error;

/// Errors raised by [`SqliteConnection`](crate::SqliteConnection).
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A column holds a value the engine's value model cannot represent.
    #[error("conversion error: column '{column}' holds a {kind} value")]
    ConversionError { column: String, kind: &'static str },
}

impl From<SqliteError> for ConnectionError {
    fn from(err: SqliteError) -> Self {
        match err {
            // SQLite's message verbatim, without the wrapper prefix.
            SqliteError::DatabaseError(inner) => ConnectionError::new(inner.to_string()),
            other => ConnectionError::new(other.to_string()),
        }
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
