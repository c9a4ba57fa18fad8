//! Resolving discovered scripts to runnable [`MigrationUnit`]s.
//!
//! [`SqlScriptLoader`] parses SQL files with `-- migrate:up` /
//! `-- migrate:down` section markers. [`ScriptRegistry`] is a compiled
//! lookup table for migrations written in Rust.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use schema_ledger_core::{
    Connection, Direction, MigrationScript, MigrationUnit, StepResult, Version,
};

use crate::error::{MigrateError, Result};
use crate::source::ScriptSource;

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^--\s*(?:migrate:)?(up|down)\s*$").expect("static regex must compile")
});

/// Resolves a discovered script to the unit that runs it.
pub trait ScriptLoader {
    /// Loads the unit for `script`, reading from `source` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::ScriptLoad`] when the script cannot be read
    /// or resolved.
    fn load(&self, script: &MigrationScript, source: &dyn ScriptSource)
    -> Result<Arc<dyn MigrationUnit>>;
}

/// Loads SQL migration files.
///
/// ```sql
/// -- Description: Create the users table
///
/// -- migrate:up
/// CREATE TABLE users (id INTEGER PRIMARY KEY);
///
/// -- migrate:down
/// DROP TABLE users;
/// ```
///
/// The bare `-- up` / `-- down` markers are accepted too. A file without a
/// `down` marker does not provide `down`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlScriptLoader;

impl ScriptLoader for SqlScriptLoader {
    fn load(
        &self,
        script: &MigrationScript,
        source: &dyn ScriptSource,
    ) -> Result<Arc<dyn MigrationUnit>> {
        let name = script.file_name().ok_or_else(|| MigrateError::ScriptLoad {
            version: script.version.clone(),
            reason: format!("'{}' has no file name", script.path.display()),
        })?;
        let content = source.read(name).map_err(|err| MigrateError::ScriptLoad {
            version: script.version.clone(),
            reason: err.to_string(),
        })?;
        Ok(Arc::new(SqlMigration::parse(&content)))
    }
}

/// A parsed SQL migration: the statements of each section, if present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlMigration {
    pub up: Option<String>,
    pub down: Option<String>,
}

impl SqlMigration {
    /// Splits `content` into its `up` and `down` sections.
    ///
    /// Lines before the first marker belong to the header and are ignored.
    /// Comment and blank lines are dropped from sections, so a section that
    /// holds only comments is present but empty.
    pub fn parse(content: &str) -> Self {
        let mut up: Option<Vec<&str>> = None;
        let mut down: Option<Vec<&str>> = None;
        let mut current = None;

        for line in content.lines() {
            let trimmed = line.trim();
            if let Some(captures) = SECTION_RE.captures(trimmed) {
                let direction = if captures[1].eq_ignore_ascii_case("up") {
                    Direction::Up
                } else {
                    Direction::Down
                };
                match direction {
                    Direction::Up => up.get_or_insert_with(Vec::new),
                    Direction::Down => down.get_or_insert_with(Vec::new),
                };
                current = Some(direction);
                continue;
            }

            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }

            let section = match current {
                Some(Direction::Up) => up.as_mut(),
                Some(Direction::Down) => down.as_mut(),
                None => None,
            };
            if let Some(lines) = section {
                lines.push(line);
            }
        }

        Self {
            up: up.map(|lines| lines.join("\n")),
            down: down.map(|lines| lines.join("\n")),
        }
    }

    fn section(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Up => self.up.as_deref(),
            Direction::Down => self.down.as_deref(),
        }
    }

    fn run_section(&self, direction: Direction, conn: &mut dyn Connection) -> StepResult {
        let sql = self
            .section(direction)
            .ok_or_else(|| format!("no migrate:{direction} section"))?;
        if sql.trim().is_empty() {
            return Ok(format!("migrate:{direction} section is empty"));
        }

        let outcome = conn.execute_batch(sql).and_then(|()| conn.commit());
        match outcome {
            Ok(()) => Ok(format!("ran migrate:{direction} section")),
            Err(err) => {
                // Report the statement failure, not a secondary rollback error.
                let _ = conn.rollback();
                Err(err.to_string())
            }
        }
    }
}

impl MigrationUnit for SqlMigration {
    fn up(&self, conn: &mut dyn Connection) -> StepResult {
        self.run_section(Direction::Up, conn)
    }

    fn down(&self, conn: &mut dyn Connection) -> StepResult {
        self.run_section(Direction::Down, conn)
    }

    fn provides(&self, direction: Direction) -> bool {
        self.section(direction).is_some()
    }
}

/// Compiled lookup table of Rust migrations keyed by version.
///
/// Discovery still happens through a [`ScriptSource`]; the registry only
/// answers "which unit runs this version".
///
/// # Examples
///
/// ```
/// use schema_ledger_core::{FnMigration, Version};
/// use schema_ledger_engine::ScriptRegistry;
///
/// let version = Version::parse("20240115093000").unwrap();
/// let registry = ScriptRegistry::new().with(
///     version.clone(),
///     FnMigration::new().on_up(|_| Ok("noop".to_string())),
/// );
/// assert!(registry.contains(&version));
/// ```
#[derive(Default)]
pub struct ScriptRegistry {
    units: HashMap<Version, Arc<dyn MigrationUnit>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `unit` for `version`, replacing any earlier registration.
    pub fn register(&mut self, version: Version, unit: impl MigrationUnit + 'static) {
        self.units.insert(version, Arc::new(unit));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, version: Version, unit: impl MigrationUnit + 'static) -> Self {
        self.register(version, unit);
        self
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.units.contains_key(version)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl ScriptLoader for ScriptRegistry {
    fn load(
        &self,
        script: &MigrationScript,
        _source: &dyn ScriptSource,
    ) -> Result<Arc<dyn MigrationUnit>> {
        self.units
            .get(&script.version)
            .cloned()
            .ok_or_else(|| MigrateError::ScriptLoad {
                version: script.version.clone(),
                reason: "no migration registered for this version".to_string(),
            })
    }
}
