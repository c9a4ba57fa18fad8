//! The narrow connection capability migrations run against.
//!
//! The ledger and the executor only ever need four things from a
//! database: run a statement, commit, roll back, and ask whether a table
//! exists. Backends implement [`Connection`]; migration units receive it
//! as `&mut dyn Connection`.

use thiserror::Error;

use crate::value::{Row, SqlValue};

/// Error reported by a [`Connection`] backend.
///
/// Carries the backend's own message so it can be surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConnectionError(pub String);

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Database capability consumed by the migration engine.
pub trait Connection {
    /// Runs one statement with positional `?` parameters.
    ///
    /// Returns the produced rows; statements without a result set return
    /// an empty vector.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, ConnectionError>;

    /// Runs a script of `;`-separated statements without parameters.
    ///
    /// The default splits on `;`, which is wrong for triggers and quoted
    /// semicolons; backends with a native batch executor should override it.
    fn execute_batch(&mut self, sql: &str) -> Result<(), ConnectionError> {
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.execute(statement, &[])?;
        }
        Ok(())
    }

    /// Commits the open transaction, if any.
    fn commit(&mut self) -> Result<(), ConnectionError>;

    /// Rolls back the open transaction, if any.
    fn rollback(&mut self) -> Result<(), ConnectionError>;

    /// Returns `true` if a table named `name` exists.
    fn table_exists(&mut self, name: &str) -> Result<bool, ConnectionError>;
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, ConnectionError> {
        (**self).execute(sql, params)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), ConnectionError> {
        (**self).execute_batch(sql)
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        (**self).rollback()
    }

    fn table_exists(&mut self, name: &str) -> Result<bool, ConnectionError> {
        (**self).table_exists(name)
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, ConnectionError> {
        (**self).execute(sql, params)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), ConnectionError> {
        (**self).execute_batch(sql)
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        (**self).rollback()
    }

    fn table_exists(&mut self, name: &str) -> Result<bool, ConnectionError> {
        (**self).table_exists(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records statements instead of running them.
    #[derive(Default)]
    struct Recorder {
        statements: Vec<String>,
    }

    impl Connection for Recorder {
        fn execute(&mut self, sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>, ConnectionError> {
            if sql.contains("FAIL") {
                return Err(ConnectionError::new("forced failure"));
            }
            self.statements.push(sql.to_string());
            Ok(Vec::new())
        }

        fn commit(&mut self) -> Result<(), ConnectionError> {
            Ok(())
        }

        fn rollback(&mut self) -> Result<(), ConnectionError> {
            Ok(())
        }

        fn table_exists(&mut self, _name: &str) -> Result<bool, ConnectionError> {
            Ok(false)
        }
    }

    #[test]
    fn test_default_batch_splits_statements() {
        let mut conn = Recorder::default();
        conn.execute_batch("CREATE TABLE a (id INT);\n\nCREATE TABLE b (id INT);  ;")
            .unwrap();
        assert_eq!(conn.statements, ["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]);
    }

    #[test]
    fn test_default_batch_stops_at_first_error() {
        let mut conn = Recorder::default();
        let err = conn
            .execute_batch("CREATE TABLE a (id INT); FAIL; CREATE TABLE c (id INT)")
            .unwrap_err();
        assert_eq!(err.to_string(), "forced failure");
        assert_eq!(conn.statements.len(), 1);
    }

    fn run_select<C: Connection>(mut conn: C, sql: &str) {
        conn.execute(sql, &[]).unwrap();
    }

    #[test]
    fn test_dyn_and_borrowed_connections_delegate() {
        let mut conn = Recorder::default();
        {
            let dynamic: &mut dyn Connection = &mut conn;
            dynamic.execute("SELECT 1", &[]).unwrap();
        }
        run_select(&mut conn, "SELECT 2");
        run_select(Box::new(Recorder::default()), "SELECT 3");
        assert_eq!(conn.statements, ["SELECT 1", "SELECT 2"]);
    }
}
