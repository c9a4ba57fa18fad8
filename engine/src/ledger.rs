//! The applied-migrations ledger.
//!
//! [`VersionLedger`] owns the connection and is the single source of truth
//! for "what has run". Every write commits immediately; a failed write is
//! rolled back before the error is returned.
//!
//! Table layout (`{table}` defaults to `migrations`):
//!
//! | column        | type                                  |
//! |---------------|---------------------------------------|
//! | `id`          | `INTEGER PRIMARY KEY AUTOINCREMENT`   |
//! | `version`     | `VARCHAR(255) NOT NULL UNIQUE`        |
//! | `name`        | `VARCHAR(255) NOT NULL`               |
//! | `applied_at`  | `TIMESTAMP DEFAULT CURRENT_TIMESTAMP` |
//! | `description` | `TEXT`                                |
//! | `batch`       | `INTEGER NOT NULL`                    |
//! | `success`     | `BOOLEAN DEFAULT 1`                   |
//!
//! plus a unique index `idx_{table}_version`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use schema_ledger_core::{Connection, ConnectionError, Direction, MigrationRecord, Row, SqlValue, Version};

use crate::config::validate_table_name;
use crate::error::{MigrateError, Result};
use crate::observer::{MigrationEvent, MigrationObserver, default_observer};

const COLUMNS: &str = "id, version, name, description, applied_at, batch, success";

/// Durable record of applied migrations and their batch numbers.
///
/// # Examples
///
/// ```
/// use schema_ledger_core::Version;
/// use schema_ledger_engine::VersionLedger;
/// use schema_ledger_sqlite::SqliteConnection;
///
/// let conn = SqliteConnection::open_in_memory().unwrap();
/// let mut ledger = VersionLedger::open(conn, "migrations").unwrap();
///
/// let version = Version::parse("20240115093000").unwrap();
/// let batch = ledger.record_applied(&version, "create_users", None, None, true).unwrap();
/// assert_eq!(batch, 1);
/// assert!(ledger.is_applied(&version).unwrap());
/// ```
pub struct VersionLedger<C: Connection> {
    conn: C,
    table: String,
    observer: Arc<dyn MigrationObserver>,
}

impl<C: Connection> VersionLedger<C> {
    /// Creates a ledger over `conn` without touching the database.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::InvalidTableName`] if `table` is not a plain
    /// identifier.
    pub fn new(conn: C, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            conn,
            table,
            observer: default_observer(),
        })
    }

    /// Replaces the observer.
    pub fn with_observer(mut self, observer: Arc<dyn MigrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// [`new`](Self::new) followed by [`ensure_ledger`](Self::ensure_ledger).
    pub fn open(conn: C, table: impl Into<String>) -> Result<Self> {
        let mut ledger = Self::new(conn, table)?;
        ledger.ensure_ledger()?;
        Ok(ledger)
    }

    /// Name of the ledger table.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn into_connection(self) -> C {
        self.conn
    }

    /// Creates the ledger table and its unique index if absent.
    ///
    /// Returns `true` if the table was created by this call.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::LedgerUnavailable`]; no other operation can
    /// work after that.
    pub fn ensure_ledger(&mut self) -> Result<bool> {
        let exists = self.conn.table_exists(&self.table).map_err(unavailable)?;
        if exists {
            return Ok(false);
        }

        let table = &self.table;
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                description TEXT,
                batch INTEGER NOT NULL,
                success BOOLEAN DEFAULT 1
            )"
        );
        let create_index =
            format!("CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_version ON {table} (version)");

        self.write(|conn| {
            conn.execute(&create_table, &[])?;
            conn.execute(&create_index, &[])?;
            Ok(())
        })
        .map_err(unavailable)?;

        self.observer.on_event(&MigrationEvent::LedgerCreated {
            table: self.table.clone(),
        });
        Ok(true)
    }

    /// Returns `true` if a row with `version` exists.
    pub fn is_applied(&mut self, version: &Version) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE version = ?1 LIMIT 1", self.table);
        let rows = self.query(&sql, &[SqlValue::from(version)])?;
        Ok(!rows.is_empty())
    }

    /// Highest batch number in the ledger, `0` when empty.
    pub fn last_batch_number(&mut self) -> Result<i64> {
        let sql = format!("SELECT MAX(batch) AS batch FROM {}", self.table);
        let rows = self.query(&sql, &[])?;
        Ok(rows
            .first()
            .and_then(|row| row.get_i64("batch"))
            .unwrap_or(0))
    }

    /// Inserts a row for `version` and returns the batch it was written in.
    ///
    /// `batch` defaults to `last_batch_number() + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::LedgerWrite`] if the row cannot be written,
    /// including when `version` is already recorded.
    pub fn record_applied(
        &mut self,
        version: &Version,
        name: &str,
        description: Option<&str>,
        batch: Option<i64>,
        success: bool,
    ) -> Result<i64> {
        let write_error = |reason: String| MigrateError::LedgerWrite {
            version: version.clone(),
            direction: Direction::Up,
            reason,
        };

        let batch = match batch {
            Some(batch) => batch,
            None => self
                .last_batch_number()
                .map_err(|err| write_error(err.to_string()))?
                + 1,
        };

        let sql = format!(
            "INSERT INTO {} (version, name, description, batch, success) VALUES (?1, ?2, ?3, ?4, ?5)",
            self.table
        );
        let params = [
            SqlValue::from(version),
            SqlValue::from(name),
            SqlValue::from(description),
            SqlValue::Integer(batch),
            SqlValue::Bool(success),
        ];
        self.write(|conn| conn.execute(&sql, &params).map(drop))
            .map_err(|err| write_error(err.to_string()))?;

        self.observer.on_event(&MigrationEvent::RecordWritten {
            version: version.clone(),
            batch,
        });
        Ok(batch)
    }

    /// Deletes the row for `version`. Removing an absent version is not an
    /// error.
    pub fn remove_record(&mut self, version: &Version) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE version = ?1", self.table);
        let params = [SqlValue::from(version)];
        self.write(|conn| conn.execute(&sql, &params).map(drop))
            .map_err(|err| MigrateError::LedgerWrite {
                version: version.clone(),
                direction: Direction::Down,
                reason: err.to_string(),
            })?;

        self.observer.on_event(&MigrationEvent::RecordRemoved {
            version: version.clone(),
        });
        Ok(())
    }

    /// Rows of one batch, most recently inserted first.
    pub fn records_in_batch(&mut self, batch: i64) -> Result<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE batch = ?1 ORDER BY id DESC",
            self.table
        );
        self.records(&sql, &[SqlValue::Integer(batch)])
    }

    /// Every row, in insertion order.
    pub fn all_applied(&mut self) -> Result<Vec<MigrationRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM {} ORDER BY id ASC", self.table);
        self.records(&sql, &[])
    }

    /// The most recently inserted row.
    pub fn last_record(&mut self) -> Result<Option<MigrationRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM {} ORDER BY id DESC LIMIT 1", self.table);
        Ok(self.records(&sql, &[])?.into_iter().next())
    }

    /// Deletes every row.
    pub fn reset_all(&mut self) -> Result<()> {
        let sql = format!("DELETE FROM {}", self.table);
        self.write(|conn| conn.execute(&sql, &[]).map(drop))
            .map_err(unavailable)?;

        self.observer.on_event(&MigrationEvent::LedgerCleared {
            table: self.table.clone(),
        });
        Ok(())
    }

    /// Runs `op`, committing on success and rolling back on failure.
    fn write<F>(&mut self, op: F) -> std::result::Result<(), ConnectionError>
    where
        F: FnOnce(&mut C) -> std::result::Result<(), ConnectionError>,
    {
        match op(&mut self.conn).and_then(|()| self.conn.commit()) {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = self.conn.rollback();
                Err(err)
            }
        }
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.conn.execute(sql, params).map_err(unavailable)
    }

    fn records(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<MigrationRecord>> {
        self.query(sql, params)?.iter().map(record_from_row).collect()
    }
}

fn unavailable(err: ConnectionError) -> MigrateError {
    MigrateError::LedgerUnavailable(err.to_string())
}

fn record_from_row(row: &Row) -> Result<MigrationRecord> {
    let missing = |column: &str| MigrateError::LedgerUnavailable(format!("ledger row has no valid '{column}'"));

    let version = row.get_str("version").ok_or_else(|| missing("version"))?;
    let applied_at = row
        .get_str("applied_at")
        .and_then(parse_timestamp)
        .ok_or_else(|| missing("applied_at"))?;

    Ok(MigrationRecord {
        id: row.get_i64("id").ok_or_else(|| missing("id"))?,
        version: Version::parse(version)?,
        name: row.get_str("name").ok_or_else(|| missing("name"))?.to_string(),
        description: row.get_str("description").map(str::to_string),
        applied_at,
        batch: row.get_i64("batch").ok_or_else(|| missing("batch"))?,
        success: row.get_bool("success").unwrap_or(true),
    })
}

/// Accepts SQLite's `CURRENT_TIMESTAMP` text (UTC) and RFC 3339.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|at| at.with_timezone(&Utc))
        })
}
