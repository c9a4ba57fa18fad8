//! Error types for migration operations.
//!
//! [`MigrateError`] covers every failure the ledger, executor and generator
//! can report. [`ErrorKind`] gives callers a stable discriminant to match
//! on without destructuring.

use std::fmt;

use schema_ledger_core::{CoreError, Direction, Version};
use thiserror::Error;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The ledger table cannot be created or queried. Fatal for every
    /// other operation.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The script's unit could not be resolved.
    #[error("failed to load migration {version}: {reason}")]
    ScriptLoad { version: Version, reason: String },

    /// The unit was resolved but does not define the requested operation.
    #[error("migration {version} does not define its {direction} operation")]
    MissingOperation { version: Version, direction: Direction },

    /// The script's own `up`/`down` reported failure. `message` is verbatim.
    #[error("failed to {} migration {version}: {message}", .direction.verb())]
    ScriptExecution {
        version: Version,
        direction: Direction,
        message: String,
    },

    /// The script ran but the ledger could not be updated: the database
    /// change happened without being recorded (or un-recorded).
    #[error("migration {version} ran ({direction}) but the ledger update failed: {reason}")]
    LedgerWrite {
        version: Version,
        direction: Direction,
        reason: String,
    },

    /// A ledger row has no script on disk.
    #[error("migration not found: {0}")]
    OrphanedRecord(Version),

    /// A generated version is already taken by an existing file.
    #[error("migration already exists: {file_name}")]
    VersionCollision { version: Version, file_name: String },

    /// Migration name produced an empty slug.
    #[error("invalid migration name: '{0}'")]
    InvalidName(String),

    /// Version string is not a 14-digit timestamp.
    #[error("invalid version: '{0}'")]
    InvalidVersion(String),

    /// Ledger table name contains characters other than `[A-Za-z0-9_]`.
    #[error("invalid ledger table name '{0}': must contain only alphanumeric characters and underscores")]
    InvalidTableName(String),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<CoreError> for MigrateError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidName(name) => Self::InvalidName(name),
            CoreError::InvalidVersion(version) => Self::InvalidVersion(version),
        }
    }
}

/// Field-less discriminant of [`MigrateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    LedgerUnavailable,
    ScriptLoad,
    MissingOperation,
    ScriptExecution,
    LedgerWrite,
    OrphanedRecord,
    VersionCollision,
    InvalidName,
    InvalidVersion,
    InvalidTableName,
    Io,
    Yaml,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl MigrateError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LedgerUnavailable(_) => ErrorKind::LedgerUnavailable,
            Self::ScriptLoad { .. } => ErrorKind::ScriptLoad,
            Self::MissingOperation { .. } => ErrorKind::MissingOperation,
            Self::ScriptExecution { .. } => ErrorKind::ScriptExecution,
            Self::LedgerWrite { .. } => ErrorKind::LedgerWrite,
            Self::OrphanedRecord(_) => ErrorKind::OrphanedRecord,
            Self::VersionCollision { .. } => ErrorKind::VersionCollision,
            Self::InvalidName(_) => ErrorKind::InvalidName,
            Self::InvalidVersion(_) => ErrorKind::InvalidVersion,
            Self::InvalidTableName(_) => ErrorKind::InvalidTableName,
            Self::Io(_) => ErrorKind::Io,
            Self::Yaml(_) => ErrorKind::Yaml,
        }
    }

    /// Version of the migration the error concerns, if any.
    pub fn version(&self) -> Option<&Version> {
        match self {
            Self::ScriptLoad { version, .. }
            | Self::MissingOperation { version, .. }
            | Self::ScriptExecution { version, .. }
            | Self::LedgerWrite { version, .. }
            | Self::VersionCollision { version, .. }
            | Self::OrphanedRecord(version) => Some(version),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`MigrateError`].
pub type Result<T> = std::result::Result<T, MigrateError>;
