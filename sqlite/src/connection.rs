//! [`Connection`] implementation backed by a rusqlite connection.
//!
//! SQLite runs in autocommit mode unless a transaction is open. To give
//! the engine explicit commit/rollback semantics, the first write
//! statement issued while in autocommit mode opens a transaction with
//! `BEGIN`; [`commit`](Connection::commit) and
//! [`rollback`](Connection::rollback) close it. Read-only statements never
//! open a transaction.
//!
//! # Example
//!
//! ```
//! use schema_ledger_core::{Connection, SqlValue};
//! use schema_ledger_sqlite::SqliteConnection;
//!
//! let mut conn = SqliteConnection::open_in_memory().unwrap();
//! conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
//! conn.execute("INSERT INTO users (name) VALUES (?1)", &[SqlValue::from("ada")]).unwrap();
//! conn.commit().unwrap();
//!
//! let rows = conn.execute("SELECT name FROM users", &[]).unwrap();
//! assert_eq!(rows[0].get_str("name"), Some("ada"));
//! ```

use std::path::Path;

use rusqlite::params_from_iter;
use schema_ledger_core::{Connection, ConnectionError, Row, SqlValue};

use crate::convert::{from_sqlite, to_sqlite};
use crate::error::Result;

/// SQLite database handle implementing the engine's [`Connection`].
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(rusqlite::Connection::open(path)?))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(rusqlite::Connection::open_in_memory()?))
    }

    /// Wraps an existing rusqlite connection.
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Borrows the underlying rusqlite connection.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Consumes the wrapper, returning the rusqlite connection.
    pub fn into_inner(self) -> rusqlite::Connection {
        self.conn
    }

    /// Returns `true` while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn begin_if_needed(&self, readonly: bool) -> Result<()> {
        if !readonly && self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn run(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        self.begin_if_needed(stmt.readonly())?;

        let values = params.iter().map(to_sqlite);
        if stmt.column_count() == 0 {
            stmt.execute(params_from_iter(values))?;
            return Ok(Vec::new());
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = Row::new();
            for (index, column) in columns.iter().enumerate() {
                let value = from_sqlite(column, row.get_ref(index)?)?;
                out.push(column.clone(), value);
            }
            collected.push(out);
        }
        Ok(collected)
    }

    fn run_batch(&mut self, sql: &str) -> Result<()> {
        self.begin_if_needed(false)?;
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn finish(&mut self, statement: &str) -> Result<()> {
        if self.in_transaction() {
            self.conn.execute_batch(statement)?;
        }
        Ok(())
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> std::result::Result<Vec<Row>, ConnectionError> {
        Ok(self.run(sql, params)?)
    }

    /// Runs the script with SQLite's native batch executor, so triggers
    /// and quoted semicolons are handled correctly.
    ///
    /// The script must not contain its own `BEGIN`: the batch already runs
    /// inside a transaction.
    fn execute_batch(&mut self, sql: &str) -> std::result::Result<(), ConnectionError> {
        Ok(self.run_batch(sql)?)
    }

    fn commit(&mut self) -> std::result::Result<(), ConnectionError> {
        Ok(self.finish("COMMIT")?)
    }

    fn rollback(&mut self) -> std::result::Result<(), ConnectionError> {
        Ok(self.finish("ROLLBACK")?)
    }

    fn table_exists(&mut self, name: &str) -> std::result::Result<bool, ConnectionError> {
        Ok(self.has_table(name)?)
    }
}

impl From<rusqlite::Connection> for SqliteConnection {
    fn from(conn: rusqlite::Connection) -> Self {
        Self::new(conn)
    }
}
