//! Reconciling discovered scripts with the ledger.
//!
//! [`MigrationExecutor`] lists scripts through a [`ScriptSource`], resolves
//! each one's state against the [`VersionLedger`], and applies or reverts
//! them through a [`ScriptLoader`]. Everything is sequential: one script at
//! a time, in version order going up and in reverse insertion order going
//! down.
//!
//! # Example
//!
//! ```no_run
//! use schema_ledger_engine::{MigrationConfig, MigrationExecutor};
//! use schema_ledger_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open("app.db").unwrap();
//! let mut executor = MigrationExecutor::open(conn, MigrationConfig::default()).unwrap();
//!
//! let report = executor.migrate(None);
//! println!("{}", report.message);
//!
//! // Undo the batch that was just applied.
//! let report = executor.rollback(Some(1));
//! assert!(report.success, "{}", report.message);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use schema_ledger_core::{
    AppliedMigration, Connection, Direction, MigrationScript, MigrationStatus, Version,
};

use crate::config::{FailurePolicy, MigrationConfig, OrphanPolicy};
use crate::error::{MigrateError, Result};
use crate::ledger::VersionLedger;
use crate::loader::{ScriptLoader, SqlScriptLoader};
use crate::observer::{MigrationEvent, MigrationObserver, default_observer};
use crate::report::{Operation, RunReport};
use crate::source::{DirectorySource, ScriptSource, discover_scripts};

/// A discovered script and whether the ledger has it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredMigration {
    pub script: MigrationScript,
    pub applied: bool,
}

/// Applies and reverts migrations, tracking them in a [`VersionLedger`].
pub struct MigrationExecutor<C: Connection> {
    ledger: VersionLedger<C>,
    source: Box<dyn ScriptSource>,
    loader: Box<dyn ScriptLoader>,
    config: MigrationConfig,
    observer: Arc<dyn MigrationObserver>,
}

impl<C: Connection> MigrationExecutor<C> {
    /// Returns a builder over `conn`.
    pub fn builder(conn: C) -> ExecutorBuilder<C> {
        ExecutorBuilder::new(conn)
    }

    /// Builds an executor reading SQL scripts from `config.migrations_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::LedgerUnavailable`] if the ledger table
    /// cannot be created, or a validation error for `config`.
    pub fn open(conn: C, config: MigrationConfig) -> Result<Self> {
        Self::builder(conn).config(config).build()
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn ledger(&self) -> &VersionLedger<C> {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut VersionLedger<C> {
        &mut self.ledger
    }

    /// Consumes the executor, returning the connection.
    pub fn into_connection(self) -> C {
        self.ledger.into_connection()
    }

    /// Every script in the source with its applied flag, ascending by
    /// version.
    pub fn discover(&mut self) -> Result<Vec<DiscoveredMigration>> {
        let scripts = self.scripts()?;
        let mut discovered = Vec::with_capacity(scripts.len());
        for script in scripts {
            let applied = self.ledger.is_applied(&script.version)?;
            discovered.push(DiscoveredMigration { script, applied });
        }
        Ok(discovered)
    }

    /// Scripts with no ledger row, ascending by version.
    pub fn pending(&mut self) -> Result<Vec<MigrationScript>> {
        Ok(self
            .discover()?
            .into_iter()
            .filter(|m| !m.applied)
            .map(|m| m.script)
            .collect())
    }

    /// Ledger rows in insertion order, each with its script path when the
    /// script still exists.
    pub fn applied(&mut self) -> Result<Vec<AppliedMigration>> {
        let records = self.ledger.all_applied()?;
        let scripts = self.script_map()?;
        Ok(records
            .into_iter()
            .map(|record| {
                let path = scripts.get(&record.version).map(|s| s.path.clone());
                AppliedMigration { record, path }
            })
            .collect())
    }

    /// Pending, applied and orphaned migrations in one listing, ascending by
    /// version.
    pub fn status(&mut self) -> Result<Vec<MigrationStatus>> {
        let scripts = self.scripts()?;
        let records = self.ledger.all_applied()?;

        let by_version: HashMap<&Version, &MigrationScript> =
            scripts.iter().map(|s| (&s.version, s)).collect();
        let recorded: HashSet<&Version> = records.iter().map(|r| &r.version).collect();

        let mut lines: Vec<MigrationStatus> = records
            .iter()
            .map(|record| {
                let path = by_version.get(&record.version).map(|s| s.path.as_path());
                MigrationStatus::recorded(record, path)
            })
            .collect();
        lines.extend(
            scripts
                .iter()
                .filter(|s| !recorded.contains(&s.version))
                .map(MigrationStatus::pending),
        );
        lines.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(lines)
    }

    /// Applies one script in a new batch.
    ///
    /// Succeeds without doing anything if the script is already applied.
    ///
    /// # Errors
    ///
    /// [`ScriptLoad`](MigrateError::ScriptLoad) and
    /// [`MissingOperation`](MigrateError::MissingOperation) leave the
    /// database untouched. [`ScriptExecution`](MigrateError::ScriptExecution)
    /// carries the script's own message. [`LedgerWrite`](MigrateError::LedgerWrite)
    /// means the script ran but was not recorded.
    pub fn apply(&mut self, script: &MigrationScript) -> Result<String> {
        if self.ledger.is_applied(&script.version)? {
            return Ok(format!("Migration already applied: {}", script.version));
        }
        self.apply_in_batch(script, None)?;
        Ok(format!("Applied migration: {}", script.version))
    }

    /// Reverts one script and removes its ledger row.
    ///
    /// Succeeds without doing anything if the script is not applied.
    pub fn revert(&mut self, script: &MigrationScript) -> Result<String> {
        if !self.ledger.is_applied(&script.version)? {
            return Ok(format!("Migration not applied: {}", script.version));
        }
        self.revert_unchecked(script)?;
        Ok(format!("Reverted migration: {}", script.version))
    }

    /// Applies pending migrations oldest first, all in one new batch.
    ///
    /// `steps` limits how many are applied; `None` or `0` applies all.
    /// Stops at the first failure. What happens to migrations applied
    /// earlier in the call depends on [`FailurePolicy`].
    pub fn migrate(&mut self, steps: Option<usize>) -> RunReport {
        let mut report = RunReport::new(Operation::Migrate);
        let outcome = self.migrate_into(&mut report, steps);
        report.complete(outcome)
    }

    /// Reverts the last `steps` batches (default 1), newest row first.
    ///
    /// Stops at the first failure. A row whose script is gone fails the
    /// rollback with [`MigrateError::OrphanedRecord`].
    pub fn rollback(&mut self, steps: Option<usize>) -> RunReport {
        let mut report = RunReport::new(Operation::Rollback);
        let outcome = self.rollback_into(&mut report, steps);
        report.complete(outcome)
    }

    /// Reverts every applied migration in reverse insertion order.
    ///
    /// Rows without a script are handled per [`OrphanPolicy`].
    pub fn reset(&mut self) -> RunReport {
        let mut report = RunReport::new(Operation::Reset);
        let outcome = self.reset_into(&mut report);
        report.complete(outcome)
    }

    /// [`reset`](Self::reset), then [`migrate`](Self::migrate) with no
    /// limit. A failed reset ends the refresh before anything is applied.
    pub fn refresh(&mut self) -> RunReport {
        let mut report = RunReport::new(Operation::Refresh);
        let outcome = self.refresh_into(&mut report);
        report.complete(outcome)
    }

    fn migrate_into(&mut self, report: &mut RunReport, steps: Option<usize>) -> Result<String> {
        let mut pending = self.pending()?;
        if pending.is_empty() {
            return Ok("No pending migrations".to_string());
        }
        if let Some(steps) = steps.filter(|&n| n > 0) {
            pending.truncate(steps);
        }

        let batch = self.ledger.last_batch_number()? + 1;
        report.batch = Some(batch);

        for script in pending {
            if let Err(err) = self.apply_in_batch(&script, Some(batch)) {
                if self.config.failure_policy == FailurePolicy::Compensate {
                    self.compensate(report);
                }
                return Err(err);
            }
            report.migrations.push(script);
        }

        Ok(format!("Applied {} migrations", report.migrations.len()))
    }

    fn rollback_into(&mut self, report: &mut RunReport, steps: Option<usize>) -> Result<String> {
        let last_batch = self.ledger.last_batch_number()?;
        if last_batch == 0 {
            return Ok("No migrations to rollback".to_string());
        }

        let steps = steps.unwrap_or(1).max(1);
        let mut records = Vec::new();
        for batch in (1..=last_batch).rev().take(steps) {
            records.extend(self.ledger.records_in_batch(batch)?);
        }
        if records.is_empty() {
            return Ok("No migrations to rollback".to_string());
        }

        let scripts = self.script_map()?;
        for record in records {
            let script = scripts
                .get(&record.version)
                .ok_or_else(|| MigrateError::OrphanedRecord(record.version.clone()))?;
            self.revert_unchecked(script)?;
            report.migrations.push(script.clone());
        }

        Ok(format!("Reverted {} migrations", report.migrations.len()))
    }

    fn reset_into(&mut self, report: &mut RunReport) -> Result<String> {
        let records = self.ledger.all_applied()?;
        if records.is_empty() {
            return Ok("No migrations to reset".to_string());
        }

        let scripts = self.script_map()?;
        for record in records.into_iter().rev() {
            let Some(script) = scripts.get(&record.version) else {
                match self.config.orphan_policy {
                    OrphanPolicy::Abort => return Err(MigrateError::OrphanedRecord(record.version)),
                    OrphanPolicy::Skip => {
                        self.observer.on_event(&MigrationEvent::OrphanSkipped {
                            version: record.version.clone(),
                        });
                        report.skipped.push(record);
                        continue;
                    }
                }
            };
            self.revert_unchecked(script)?;
            report.migrations.push(script.clone());
        }

        Ok(format!("Reset {} migrations", report.migrations.len()))
    }

    fn refresh_into(&mut self, report: &mut RunReport) -> Result<String> {
        let mut reset = RunReport::new(Operation::Reset);
        let outcome = self.reset_into(&mut reset);
        report.reverted = reset.migrations;
        report.skipped = reset.skipped;
        outcome?;

        self.migrate_into(report, None)?;
        Ok(format!("Refreshed {} migrations", report.migrations.len()))
    }

    /// Reverts what this `migrate` call applied, newest first. Stops at the
    /// first migration that cannot be reverted; it stays in
    /// `report.migrations`.
    fn compensate(&mut self, report: &mut RunReport) {
        while let Some(script) = report.migrations.pop() {
            if self.revert_unchecked(&script).is_err() {
                report.migrations.push(script);
                break;
            }
            self.observer.on_event(&MigrationEvent::Compensated {
                version: script.version.clone(),
            });
            report.compensated.push(script);
        }
    }

    fn apply_in_batch(&mut self, script: &MigrationScript, batch: Option<i64>) -> Result<i64> {
        let outcome = self.try_apply(script, batch);
        self.report_failure(script, Direction::Up, &outcome);
        outcome
    }

    fn revert_unchecked(&mut self, script: &MigrationScript) -> Result<()> {
        let outcome = self.try_revert(script);
        self.report_failure(script, Direction::Down, &outcome);
        outcome
    }

    fn try_apply(&mut self, script: &MigrationScript, batch: Option<i64>) -> Result<i64> {
        self.invoke(script, Direction::Up)?;
        let batch = self.ledger.record_applied(
            &script.version,
            &script.name,
            script.description.as_deref(),
            batch,
            true,
        )?;
        self.observer.on_event(&MigrationEvent::Applied {
            version: script.version.clone(),
            name: script.name.clone(),
            batch,
        });
        Ok(batch)
    }

    fn try_revert(&mut self, script: &MigrationScript) -> Result<()> {
        self.invoke(script, Direction::Down)?;
        self.ledger.remove_record(&script.version)?;
        self.observer.on_event(&MigrationEvent::Reverted {
            version: script.version.clone(),
            name: script.name.clone(),
        });
        Ok(())
    }

    /// Loads the script's unit and runs one direction. The ledger is not
    /// touched.
    fn invoke(&mut self, script: &MigrationScript, direction: Direction) -> Result<String> {
        let unit = self.loader.load(script, self.source.as_ref())?;
        if !unit.provides(direction) {
            return Err(MigrateError::MissingOperation {
                version: script.version.clone(),
                direction,
            });
        }
        unit.run(direction, self.ledger.connection_mut())
            .map_err(|message| MigrateError::ScriptExecution {
                version: script.version.clone(),
                direction,
                message,
            })
    }

    fn report_failure<T>(&self, script: &MigrationScript, direction: Direction, outcome: &Result<T>) {
        if let Err(err) = outcome {
            self.observer.on_event(&MigrationEvent::Failed {
                version: script.version.clone(),
                direction,
                message: err.to_string(),
            });
        }
    }

    /// Discovered scripts with duplicate versions removed. The first file
    /// (by path) wins.
    fn scripts(&self) -> Result<Vec<MigrationScript>> {
        let discovered = discover_scripts(self.source.as_ref(), &self.config.extension)?;
        let mut scripts: Vec<MigrationScript> = Vec::with_capacity(discovered.len());
        for script in discovered {
            if scripts.last().is_some_and(|prev| prev.version == script.version) {
                self.observer.on_event(&MigrationEvent::DuplicateVersion {
                    version: script.version.clone(),
                    ignored: script.path.clone(),
                });
                continue;
            }
            scripts.push(script);
        }
        Ok(scripts)
    }

    fn script_map(&self) -> Result<HashMap<Version, MigrationScript>> {
        Ok(self
            .scripts()?
            .into_iter()
            .map(|script| (script.version.clone(), script))
            .collect())
    }
}

/// Builder for [`MigrationExecutor`].
///
/// Unset parts default to a [`DirectorySource`] over
/// `config.migrations_dir`, the [`SqlScriptLoader`] and the
/// [`TracingObserver`](crate::TracingObserver).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use schema_ledger_engine::{
///     DirectorySource, MigrationConfig, MigrationExecutor, RecordingObserver,
/// };
/// use schema_ledger_sqlite::SqliteConnection;
///
/// let observer = Arc::new(RecordingObserver::default());
/// let mut executor = MigrationExecutor::builder(SqliteConnection::open_in_memory().unwrap())
///     .config(MigrationConfig::default())
///     .source(DirectorySource::new("db/migrations"))
///     .observer(observer.clone())
///     .build()
///     .unwrap();
///
/// assert!(executor.pending().unwrap().is_empty());
/// assert_eq!(observer.events().len(), 1); // ledger created
/// ```
pub struct ExecutorBuilder<C: Connection> {
    conn: C,
    config: MigrationConfig,
    source: Option<Box<dyn ScriptSource>>,
    loader: Option<Box<dyn ScriptLoader>>,
    observer: Option<Arc<dyn MigrationObserver>>,
}

impl<C: Connection> ExecutorBuilder<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            config: MigrationConfig::default(),
            source: None,
            loader: None,
            observer: None,
        }
    }

    pub fn config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Where scripts are listed and read from.
    pub fn source(mut self, source: impl ScriptSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// How scripts are turned into runnable units.
    pub fn loader(mut self, loader: impl ScriptLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn MigrationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validates the configuration and ensures the ledger table exists.
    pub fn build(self) -> Result<MigrationExecutor<C>> {
        self.config.validate()?;
        let observer = self.observer.unwrap_or_else(default_observer);
        let mut ledger =
            VersionLedger::new(self.conn, self.config.ledger_table.clone())?.with_observer(observer.clone());
        ledger.ensure_ledger()?;

        let source = self.source.unwrap_or_else(|| {
            Box::new(DirectorySource::new(self.config.migrations_dir.clone())) as Box<dyn ScriptSource>
        });
        let loader = self
            .loader
            .unwrap_or_else(|| Box::new(SqlScriptLoader) as Box<dyn ScriptLoader>);

        Ok(MigrationExecutor {
            ledger,
            source,
            loader,
            config: self.config,
            observer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::loader::ScriptRegistry;
    use crate::observer::RecordingObserver;
    use schema_ledger_core::{ConnectionError, FnMigration, MigrationState, Row, SqlValue};
    use schema_ledger_sqlite::SqliteConnection;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, file_name: &str, up: &str, down: &str) {
        let body = format!("-- migrate:up\n{up}\n\n-- migrate:down\n{down}\n");
        std::fs::write(dir.join(file_name), body).unwrap();
    }

    fn executor(dir: &Path) -> MigrationExecutor<SqliteConnection> {
        let config = MigrationConfig {
            migrations_dir: dir.to_path_buf(),
            ..MigrationConfig::default()
        };
        MigrationExecutor::open(SqliteConnection::open_in_memory().unwrap(), config).unwrap()
    }

    /// Fails inserts into the ledger table while `fail_ledger_insert` is set.
    struct FlakyConnection {
        inner: SqliteConnection,
        fail_ledger_insert: bool,
    }

    impl Connection for FlakyConnection {
        fn execute(&mut self, sql: &str, params: &[SqlValue]) -> std::result::Result<Vec<Row>, ConnectionError> {
            if self.fail_ledger_insert && sql.starts_with("INSERT INTO migrations") {
                return Err(ConnectionError::new("disk I/O error"));
            }
            self.inner.execute(sql, params)
        }

        fn execute_batch(&mut self, sql: &str) -> std::result::Result<(), ConnectionError> {
            self.inner.execute_batch(sql)
        }

        fn commit(&mut self) -> std::result::Result<(), ConnectionError> {
            self.inner.commit()
        }

        fn rollback(&mut self) -> std::result::Result<(), ConnectionError> {
            self.inner.rollback()
        }

        fn table_exists(&mut self, name: &str) -> std::result::Result<bool, ConnectionError> {
            self.inner.table_exists(name)
        }
    }

    #[test]
    fn test_apply_and_revert_are_noops_in_target_state() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "20240101000000_a.sql", "CREATE TABLE a (id INT);", "DROP TABLE a;");
        let mut executor = executor(dir.path());
        let script = executor.pending().unwrap().remove(0);

        assert_eq!(executor.revert(&script).unwrap(), "Migration not applied: 20240101000000");
        assert_eq!(executor.apply(&script).unwrap(), "Applied migration: 20240101000000");
        assert_eq!(
            executor.apply(&script).unwrap(),
            "Migration already applied: 20240101000000"
        );
        assert_eq!(executor.ledger_mut().all_applied().unwrap().len(), 1);
        assert_eq!(executor.revert(&script).unwrap(), "Reverted migration: 20240101000000");
        assert!(executor.ledger_mut().all_applied().unwrap().is_empty());
    }

    #[test]
    fn test_single_applies_each_get_their_own_batch() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "20240101000000_a.sql", "CREATE TABLE a (id INT);", "DROP TABLE a;");
        write(dir.path(), "20240102000000_b.sql", "CREATE TABLE b (id INT);", "DROP TABLE b;");
        let mut executor = executor(dir.path());

        for script in executor.pending().unwrap() {
            executor.apply(&script).unwrap();
        }
        let batches: Vec<i64> = executor
            .applied()
            .unwrap()
            .iter()
            .map(|m| m.record.batch)
            .collect();
        assert_eq!(batches, [1, 2]);
    }

    #[test]
    fn test_missing_down_fails_only_revert() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("20240101000000_a.sql"),
            "-- migrate:up\nCREATE TABLE a (id INT);\n",
        )
        .unwrap();
        let mut executor = executor(dir.path());

        assert_eq!(executor.discover().unwrap().len(), 1);
        assert!(executor.migrate(None).success);

        let report = executor.rollback(None);
        assert!(!report.success);
        let failure = report.failure.unwrap();
        assert_eq!(failure.kind(), ErrorKind::MissingOperation);
        assert!(executor.ledger_mut().is_applied(failure.version().unwrap()).unwrap());
    }

    #[test]
    fn test_missing_up_fails_apply_and_leaves_ledger_untouched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("20240101000000_a.sql"),
            "-- migrate:down\nDROP TABLE a;\n",
        )
        .unwrap();
        write(dir.path(), "20240102000000_b.sql", "CREATE TABLE b (id INT);", "DROP TABLE b;");
        let mut executor = executor(dir.path());

        let script = executor.pending().unwrap().remove(0);
        let err = executor.apply(&script).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingOperation);
        assert!(matches!(
            err,
            MigrateError::MissingOperation { direction: Direction::Up, .. }
        ));

        let report = executor.migrate(None);
        assert!(!report.success);
        assert!(report.migrations.is_empty());
        assert_eq!(report.failure.as_ref().unwrap().kind(), ErrorKind::MissingOperation);
        assert_eq!(
            report.message,
            "migration 20240101000000 does not define its up operation"
        );
        assert!(executor.ledger_mut().all_applied().unwrap().is_empty());
        assert!(!executor.ledger_mut().connection_mut().table_exists("b").unwrap());
        assert_eq!(executor.pending().unwrap().len(), 2);
    }

    #[test]
    fn test_unresolvable_script_stops_migrate() {
        let dir = TempDir::new().unwrap();
        for name in ["20240101000000_a.rs", "20240102000000_b.rs", "20240103000000_c.rs"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let registry = ScriptRegistry::new()
            .with(
                Version::parse("20240101000000").unwrap(),
                FnMigration::new().on_up(|_| Ok("a".to_string())),
            )
            .with(
                Version::parse("20240103000000").unwrap(),
                FnMigration::new().on_up(|_| Ok("c".to_string())),
            );
        let config = MigrationConfig {
            migrations_dir: dir.path().to_path_buf(),
            extension: "rs".to_string(),
            ..MigrationConfig::default()
        };
        let mut executor = MigrationExecutor::builder(SqliteConnection::open_in_memory().unwrap())
            .config(config)
            .loader(registry)
            .build()
            .unwrap();

        let report = executor.migrate(None);
        assert!(!report.success);
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.kind(), ErrorKind::ScriptLoad);
        assert_eq!(failure.version().unwrap().as_str(), "20240102000000");
        assert_eq!(report.versions(), ["20240101000000"]);

        let pending: Vec<String> = executor
            .pending()
            .unwrap()
            .into_iter()
            .map(|s| s.version.to_string())
            .collect();
        assert_eq!(pending, ["20240102000000", "20240103000000"]);
    }

    #[test]
    fn test_unavailable_ledger_fails_orchestration_without_panicking() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "20240101000000_a.sql", "CREATE TABLE a (id INT);", "DROP TABLE a;");
        let mut executor = executor(dir.path());
        {
            let conn = executor.ledger_mut().connection_mut();
            conn.execute("DROP TABLE migrations", &[]).unwrap();
            conn.commit().unwrap();
        }

        for report in [
            executor.migrate(None),
            executor.rollback(None),
            executor.reset(),
            executor.refresh(),
        ] {
            assert!(!report.success, "{}", report.operation);
            assert_eq!(
                report.failure.as_ref().unwrap().kind(),
                ErrorKind::LedgerUnavailable,
                "{}",
                report.operation
            );
            assert!(report.migrations.is_empty());
        }
        assert!(!executor.ledger_mut().connection_mut().table_exists("a").unwrap());
    }

    #[test]
    fn test_ledger_write_failure_is_distinct() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "20240101000000_a.sql", "CREATE TABLE a (id INT);", "DROP TABLE a;");
        let conn = FlakyConnection {
            inner: SqliteConnection::open_in_memory().unwrap(),
            fail_ledger_insert: true,
        };
        let config = MigrationConfig {
            migrations_dir: dir.path().to_path_buf(),
            ..MigrationConfig::default()
        };
        let mut executor = MigrationExecutor::open(conn, config).unwrap();

        let report = executor.migrate(None);
        assert!(!report.success);
        assert_eq!(report.failure.as_ref().unwrap().kind(), ErrorKind::LedgerWrite);
        assert!(report.message.contains("disk I/O error"), "{}", report.message);
        assert!(report.migrations.is_empty());

        // The script's change happened, the ledger does not know about it.
        let conn = executor.ledger_mut().connection_mut();
        assert!(conn.table_exists("a").unwrap());
        assert_eq!(executor.pending().unwrap().len(), 1);
    }

    #[test]
    fn test_compensate_policy_reverts_earlier_migrations() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "20240101000000_a.sql", "CREATE TABLE a (id INT);", "DROP TABLE a;");
        write(dir.path(), "20240102000000_b.sql", "CREATE TABLE b (id INT);", "DROP TABLE b;");
        write(dir.path(), "20240103000000_c.sql", "INSERT INTO missing VALUES (1);", "SELECT 1;");
        let observer = Arc::new(RecordingObserver::default());
        let config = MigrationConfig {
            migrations_dir: dir.path().to_path_buf(),
            failure_policy: FailurePolicy::Compensate,
            ..MigrationConfig::default()
        };
        let mut executor = MigrationExecutor::builder(SqliteConnection::open_in_memory().unwrap())
            .config(config)
            .observer(observer.clone())
            .build()
            .unwrap();

        let report = executor.migrate(None);
        assert!(!report.success);
        assert!(report.migrations.is_empty());
        let compensated: Vec<_> = report.compensated.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(compensated, ["b", "a"]);
        assert!(report.message.contains("reverted 2 migrations"), "{}", report.message);

        assert_eq!(executor.pending().unwrap().len(), 3);
        let conn = executor.ledger_mut().connection_mut();
        assert!(!conn.table_exists("a").unwrap());
        assert!(!conn.table_exists("b").unwrap());

        let compensated_events = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, MigrationEvent::Compensated { .. }))
            .count();
        assert_eq!(compensated_events, 2);
    }

    #[test]
    fn test_duplicate_versions_keep_first_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "20240101000000_a.sql", "CREATE TABLE a (id INT);", "DROP TABLE a;");
        write(dir.path(), "20240101000000_b.sql", "CREATE TABLE b (id INT);", "DROP TABLE b;");
        let observer = Arc::new(RecordingObserver::default());
        let mut executor = MigrationExecutor::builder(SqliteConnection::open_in_memory().unwrap())
            .source(DirectorySource::new(dir.path()))
            .observer(observer.clone())
            .build()
            .unwrap();

        let pending = executor.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "a");
        assert!(observer.events().iter().any(|e| matches!(
            e,
            MigrationEvent::DuplicateVersion { ignored, .. } if ignored.ends_with("20240101000000_b.sql")
        )));
    }

    #[test]
    fn test_status_lists_pending_applied_and_orphan() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "20240101000000_a.sql", "CREATE TABLE a (id INT);", "DROP TABLE a;");
        write(dir.path(), "20240102000000_b.sql", "CREATE TABLE b (id INT);", "DROP TABLE b;");
        let mut executor = executor(dir.path());
        executor.migrate(Some(1));
        write(dir.path(), "20240103000000_c.sql", "SELECT 1;", "SELECT 1;");
        executor.migrate(Some(1));
        std::fs::remove_file(dir.path().join("20240102000000_b.sql")).unwrap();

        let states: Vec<_> = executor
            .status()
            .unwrap()
            .into_iter()
            .map(|s| (s.version.to_string(), s.state))
            .collect();
        assert_eq!(
            states,
            [
                ("20240101000000".to_string(), MigrationState::Applied),
                ("20240102000000".to_string(), MigrationState::Orphan),
                ("20240103000000".to_string(), MigrationState::Pending),
            ]
        );

        let applied = executor.applied().unwrap();
        assert!(!applied[0].is_orphan());
        assert!(applied[1].is_orphan());
    }

    #[test]
    fn test_registry_loader_runs_rust_migrations() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("20240101000000_seed.rs"), "").unwrap();
        let version = Version::parse("20240101000000").unwrap();
        let registry = ScriptRegistry::new().with(
            version.clone(),
            FnMigration::new()
                .on_up(|conn| {
                    conn.execute_batch("CREATE TABLE seeded (id INT); INSERT INTO seeded VALUES (1);")
                        .map_err(|e| e.to_string())?;
                    conn.commit().map_err(|e| e.to_string())?;
                    Ok("seeded".to_string())
                })
                .on_down(|conn| {
                    conn.execute("DROP TABLE seeded", &[]).map_err(|e| e.to_string())?;
                    conn.commit().map_err(|e| e.to_string())?;
                    Ok("unseeded".to_string())
                }),
        );
        let config = MigrationConfig {
            migrations_dir: dir.path().to_path_buf(),
            extension: "rs".to_string(),
            ..MigrationConfig::default()
        };
        let mut executor = MigrationExecutor::builder(SqliteConnection::open_in_memory().unwrap())
            .config(config)
            .loader(registry)
            .build()
            .unwrap();

        let report = executor.migrate(None);
        assert!(report.success, "{}", report.message);
        assert!(executor.ledger_mut().is_applied(&version).unwrap());

        let report = executor.rollback(None);
        assert!(report.success, "{}", report.message);
        assert!(!executor.ledger_mut().connection_mut().table_exists("seeded").unwrap());
    }

    #[test]
    fn test_failed_events_are_reported() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "20240101000000_a.sql", "INSERT INTO missing VALUES (1);", "SELECT 1;");
        let observer = Arc::new(RecordingObserver::default());
        let mut executor = MigrationExecutor::builder(SqliteConnection::open_in_memory().unwrap())
            .source(DirectorySource::new(dir.path()))
            .observer(observer.clone())
            .build()
            .unwrap();

        executor.migrate(None);
        assert!(observer.events().iter().any(|e| matches!(
            e,
            MigrationEvent::Failed { direction: Direction::Up, message, .. } if message.contains("missing")
        )));
    }
}
