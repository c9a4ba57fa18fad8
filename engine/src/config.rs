//! Migration engine configuration.
//!
//! [`MigrationConfig`] is YAML-serializable and usually lives next to the
//! project as `schema-ledger.yml`. Every field has a default, so an empty
//! file (or no file at all) is a valid configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! migrations_dir: db/migrations
//! ledger_table: schema_migrations
//! extension: sql
//! failure_policy: compensate
//! orphan_policy: abort
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// What `migrate` does with migrations it already applied when a later one
/// in the same call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the failure; earlier migrations stay applied.
    #[default]
    Stop,
    /// Stop at the failure, then revert the migrations applied earlier in
    /// the same call, newest first.
    Compensate,
}

/// What `reset` does with a ledger row whose script is gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Warn, leave the row in place and keep going.
    #[default]
    Skip,
    /// Fail the reset with [`MigrateError::OrphanedRecord`].
    Abort,
}

/// Top-level migration configuration.
///
/// # Examples
///
/// ```
/// use schema_ledger_engine::{FailurePolicy, MigrationConfig};
///
/// let config: MigrationConfig = serde_yaml::from_str("failure_policy: compensate").unwrap();
/// assert_eq!(config.failure_policy, FailurePolicy::Compensate);
/// assert_eq!(config.ledger_table, "migrations");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory holding the migration scripts.
    pub migrations_dir: PathBuf,
    /// Name of the ledger table.
    pub ledger_table: String,
    /// Script file extension, without the dot.
    pub extension: String,
    pub failure_policy: FailurePolicy,
    pub orphan_policy: OrphanPolicy,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            ledger_table: "migrations".to_string(),
            extension: "sql".to_string(),
            failure_policy: FailurePolicy::default(),
            orphan_policy: OrphanPolicy::default(),
        }
    }
}

impl MigrationConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](MigrateError::Io) if the file cannot be read,
    /// [`Yaml`](MigrateError::Yaml) if parsing fails, or
    /// [`InvalidTableName`](MigrateError::InvalidTableName) if the ledger
    /// table name is not a plain identifier.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks the fields that end up inside SQL or file names.
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.ledger_table)?;
        if self.extension.is_empty() || !self.extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MigrateError::InvalidName(format!(
                "extension '{}' must be non-empty and alphanumeric",
                self.extension
            )));
        }
        Ok(())
    }
}

/// Validates that a ledger table name contains only alphanumeric
/// characters and underscores.
///
/// The name is interpolated into SQL, so anything else is rejected.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MigrateError::InvalidTableName(name.to_string()));
    }
    Ok(())
}
