//! Core types for versioned schema migrations.
//!
//! This crate defines the shared vocabulary of the migration engine and
//! performs no I/O:
//!
//! - [`Version`]: fixed-width, time-derived version whose string order is
//!   chronological order.
//! - [`format_slug`], [`migration_file_name`], [`parse_file_name`]: the
//!   `{version}_{slug}.{ext}` filename contract.
//! - [`MigrationScript`]: a unit discovered on disk.
//! - [`MigrationRecord`]: a row of the applied-migrations ledger.
//! - [`MigrationState`] / [`MigrationStatus`]: derived lifecycle state.
//! - [`Connection`]: the narrow database capability the engine consumes.
//! - [`MigrationUnit`]: the `up`/`down` contract a loaded script exposes.
//!
//! # Example
//!
//! ```
//! use schema_ledger_core::*;
//!
//! let (version, name) =
//!     parse_file_name("20240115093000_add_email_to_users.sql", "sql").unwrap();
//! let script = MigrationScript::new(version, name, "migrations/20240115093000_add_email_to_users.sql");
//!
//! let status = MigrationStatus::pending(&script);
//! assert_eq!(status.state, MigrationState::Pending);
//! ```

mod connection;
mod error;
mod types;
mod unit;
mod value;
mod version;

pub use connection::{Connection, ConnectionError};
pub use error::{CoreError, Result};
pub use types::*;
pub use unit::{FnMigration, MigrationUnit, StepResult};
pub use value::{Row, SqlValue};
pub use version::{
    VERSION_FORMAT, VERSION_WIDTH, Version, format_slug, migration_file_name, migration_slug,
    parse_file_name,
};
