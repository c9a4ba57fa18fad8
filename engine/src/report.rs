//! Outcome of the orchestration operations.

use std::fmt;

use schema_ledger_core::{MigrationRecord, MigrationScript};

use crate::error::{MigrateError, Result};

/// Which orchestration operation produced a [`RunReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Migrate,
    Rollback,
    Reset,
    Refresh,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Migrate => "migrate",
            Self::Rollback => "rollback",
            Self::Reset => "reset",
            Self::Refresh => "refresh",
        };
        f.write_str(label)
    }
}

/// What `migrate`, `rollback`, `reset` or `refresh` did.
///
/// These operations never return `Err`: failure is reported here together
/// with the progress made before it.
#[derive(Debug)]
pub struct RunReport {
    pub operation: Operation,
    pub success: bool,
    /// Human-readable summary, or the failure message.
    pub message: String,
    /// Migrations applied (`migrate`, `refresh`) or reverted (`rollback`,
    /// `reset`), in the order it happened.
    pub migrations: Vec<MigrationScript>,
    /// Migrations reverted by the reset phase of `refresh`.
    pub reverted: Vec<MigrationScript>,
    /// Batch number assigned by `migrate`/`refresh`.
    pub batch: Option<i64>,
    /// Orphaned ledger rows `reset` left in place.
    pub skipped: Vec<MigrationRecord>,
    /// Migrations reverted after a failed `migrate` under the compensate
    /// policy. They are no longer in `migrations`.
    pub compensated: Vec<MigrationScript>,
    pub failure: Option<MigrateError>,
}

impl RunReport {
    pub(crate) fn new(operation: Operation) -> Self {
        Self {
            operation,
            success: true,
            message: String::new(),
            migrations: Vec::new(),
            reverted: Vec::new(),
            batch: None,
            skipped: Vec::new(),
            compensated: Vec::new(),
            failure: None,
        }
    }

    /// Closes the report with the operation's outcome.
    pub(crate) fn complete(mut self, outcome: Result<String>) -> Self {
        match outcome {
            Ok(message) => {
                self.success = true;
                self.message = message;
            }
            Err(err) => {
                self.success = false;
                self.message = err.to_string();
                if !self.compensated.is_empty() {
                    self.message.push_str(&format!(
                        " (reverted {} migrations applied earlier in this run)",
                        self.compensated.len()
                    ));
                }
                self.failure = Some(err);
            }
        }
        self
    }

    /// Versions of [`migrations`](Self::migrations), in order.
    pub fn versions(&self) -> Vec<&str> {
        self.migrations.iter().map(|m| m.version.as_str()).collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
