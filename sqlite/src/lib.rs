//! SQLite backend for the schema-ledger migration engine.
//!
//! Provides [`SqliteConnection`], an implementation of
//! [`schema_ledger_core::Connection`] over a rusqlite connection. The
//! engine's ledger and SQL migration scripts run against it unchanged.
//!
//! # Quick start
//!
//! ```no_run
//! use schema_ledger_core::Connection;
//! use schema_ledger_sqlite::SqliteConnection;
//!
//! let mut conn = SqliteConnection::open("app.db").unwrap();
//! if !conn.table_exists("migrations").unwrap() {
//!     println!("no migrations applied yet");
//! }
//! ```
//!
//! # Transactions
//!
//! Write statements open a transaction lazily; nothing is persisted until
//! [`Connection::commit`](schema_ledger_core::Connection::commit) is
//! called. Dropping a connection with an open transaction discards it.

mod connection;
mod convert;
mod error;

pub use connection::SqliteConnection;
pub use error::{Result, SqliteError};
