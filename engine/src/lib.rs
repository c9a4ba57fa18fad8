//! Versioned schema-migration engine.
//!
//! Keeps a ledger of applied migrations in the target database and
//! reconciles it with the scripts on disk:
//!
//! - **`ledger`**: [`VersionLedger`], the durable "what has run" table
//! - **`executor`**: [`MigrationExecutor`], which applies and reverts
//!   scripts in batches (`migrate`, `rollback`, `reset`, `refresh`)
//! - **`generator`**: [`MigrationGenerator`], which writes new scripts from
//!   [`Template`]s
//! - **`source`** / **`loader`**: how scripts are listed ([`ScriptSource`])
//!   and turned into runnable units ([`ScriptLoader`])
//! - **`observer`**: the injected logging capability
//!
//! The database is reached only through
//! [`schema_ledger_core::Connection`].
//!
//! # Quick start
//!
//! ```
//! use schema_ledger_engine::{MigrationConfig, MigrationExecutor, MigrationGenerator, Template};
//! use schema_ledger_sqlite::SqliteConnection;
//!
//! let dir = tempfile::TempDir::new().unwrap();
//! let config = MigrationConfig {
//!     migrations_dir: dir.path().to_path_buf(),
//!     ..MigrationConfig::default()
//! };
//!
//! MigrationGenerator::from_config(&config)
//!     .generate("create posts", None, Template::CreateTable)
//!     .unwrap();
//!
//! let conn = SqliteConnection::open_in_memory().unwrap();
//! let mut executor = MigrationExecutor::open(conn, config).unwrap();
//!
//! let report = executor.migrate(None);
//! assert!(report.success, "{}", report.message);
//! assert_eq!(report.message, "Applied 1 migrations");
//! assert!(executor.pending().unwrap().is_empty());
//! ```

mod config;
mod error;
mod executor;
mod generator;
mod ledger;
mod loader;
mod observer;
mod report;
mod source;
mod templates;

pub use config::{FailurePolicy, MigrationConfig, OrphanPolicy, validate_table_name};
pub use error::{ErrorKind, MigrateError, Result};
pub use executor::{DiscoveredMigration, ExecutorBuilder, MigrationExecutor};
pub use generator::{GeneratedMigration, MigrationGenerator};
pub use ledger::VersionLedger;
pub use loader::{ScriptLoader, ScriptRegistry, SqlMigration, SqlScriptLoader};
pub use observer::{
    MigrationEvent, MigrationObserver, RecordingObserver, TracingObserver, default_observer,
};
pub use report::{Operation, RunReport};
pub use source::{DirectorySource, ScriptSource, discover_scripts, extract_description};
pub use templates::Template;
