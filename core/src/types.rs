//! Migration data model.
//!
//! [`MigrationScript`] is what discovery finds on disk, [`MigrationRecord`]
//! is a ledger row. A script's state is never stored: it is derived by
//! matching versions between the two, which is what [`MigrationState`]
//! and [`MigrationStatus`] describe.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Which operation of a migration is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply the change.
    Up,
    /// Revert the change.
    Down,
}

impl Direction {
    /// Lower-case name of the operation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// Verb used in messages: `apply` or `revert`.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Up => "apply",
            Self::Down => "revert",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A migration unit discovered in the migration source.
///
/// Immutable for the duration of one executor call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationScript {
    /// Version parsed from the filename.
    pub version: Version,
    /// Slug parsed from the filename.
    pub name: String,
    /// Text of the `Description:` header line, if any.
    pub description: Option<String>,
    /// Location of the script.
    pub path: PathBuf,
}

impl MigrationScript {
    /// Creates a script without a description.
    pub fn new(version: Version, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            version,
            name: name.into(),
            description: None,
            path: path.into(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the final path component, e.g. `20240115093000_add_users.sql`.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// A ledger row: one successfully applied migration.
///
/// Created when `up` succeeds and deleted when `down` succeeds; never
/// updated in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Monotonic insertion sequence. Ordering by `id` is apply order.
    pub id: i64,
    /// Unique across the ledger.
    pub version: Version,
    /// Script slug at the time it was applied.
    pub name: String,
    /// Script description at the time it was applied.
    pub description: Option<String>,
    /// When the row was written.
    pub applied_at: DateTime<Utc>,
    /// Batch the migration was applied in (1-based).
    pub batch: i64,
    /// Success flag as written by the executor.
    pub success: bool,
}

/// An applied migration joined with its script location.
///
/// `path` is `None` when the script has been removed from disk since it
/// was applied (an orphan).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    /// The ledger row.
    pub record: MigrationRecord,
    /// Script location, when it still exists.
    pub path: Option<PathBuf>,
}

impl AppliedMigration {
    /// Returns `true` if the record no longer has a script on disk.
    pub fn is_orphan(&self) -> bool {
        self.path.is_none()
    }
}

/// Derived lifecycle state of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    /// Script exists, no ledger row.
    Pending,
    /// Script exists and a ledger row matches its version.
    Applied,
    /// Ledger row exists but the script file is gone.
    Orphan,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Orphan => "orphan",
        };
        f.write_str(label)
    }
}

/// One line of a status listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub version: Version,
    pub name: String,
    pub state: MigrationState,
    pub batch: Option<i64>,
    pub applied_at: Option<DateTime<Utc>>,
    pub path: Option<PathBuf>,
}

impl MigrationStatus {
    /// Status line for a script that has no ledger row.
    pub fn pending(script: &MigrationScript) -> Self {
        Self {
            version: script.version.clone(),
            name: script.name.clone(),
            state: MigrationState::Pending,
            batch: None,
            applied_at: None,
            path: Some(script.path.clone()),
        }
    }

    /// Status line for a ledger row, with or without its script.
    pub fn recorded(record: &MigrationRecord, path: Option<&Path>) -> Self {
        Self {
            version: record.version.clone(),
            name: record.name.clone(),
            state: if path.is_some() {
                MigrationState::Applied
            } else {
                MigrationState::Orphan
            },
            batch: Some(record.batch),
            applied_at: Some(record.applied_at),
            path: path.map(Path::to_path_buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(version: &str) -> MigrationRecord {
        MigrationRecord {
            id: 1,
            version: Version::parse(version).unwrap(),
            name: "create_users".to_string(),
            description: None,
            applied_at: Utc::now(),
            batch: 2,
            success: true,
        }
    }

    #[test]
    fn test_script_file_name() {
        let script = MigrationScript::new(
            Version::parse("20240115093000").unwrap(),
            "create_users",
            "migrations/20240115093000_create_users.sql",
        );
        assert_eq!(script.file_name(), Some("20240115093000_create_users.sql"));
        assert!(script.description.is_none());
        let described = script.with_description("Create the users table");
        assert_eq!(described.description.as_deref(), Some("Create the users table"));
    }

    #[test]
    fn test_recorded_status_without_path_is_orphan() {
        let status = MigrationStatus::recorded(&record("20240115093000"), None);
        assert_eq!(status.state, MigrationState::Orphan);
        assert_eq!(status.batch, Some(2));
        assert!(status.path.is_none());
    }

    #[test]
    fn test_recorded_status_with_path_is_applied() {
        let path = PathBuf::from("migrations/20240115093000_create_users.sql");
        let status = MigrationStatus::recorded(&record("20240115093000"), Some(&path));
        assert_eq!(status.state, MigrationState::Applied);
        assert_eq!(status.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&MigrationState::Orphan).unwrap();
        assert_eq!(json, "\"orphan\"");
        assert_eq!(Direction::Down.to_string(), "down");
        assert_eq!(Direction::Down.verb(), "revert");
    }
}
