//! The two-operation contract every migration unit implements.
//!
//! Discovery only knows paths. A loader resolves a path to something
//! implementing [`MigrationUnit`]: a parsed SQL file, a Rust closure pair
//! registered at compile time, or anything else that can run `up` and
//! `down` against a [`Connection`].

use crate::connection::Connection;
use crate::types::Direction;

/// Outcome of one `up`/`down` call: a message on success, the unit's own
/// failure message on error.
pub type StepResult = std::result::Result<String, String>;

/// A loadable migration exposing `up` and `down`.
///
/// Units own their transaction handling; the executor does not wrap calls
/// in a transaction.
pub trait MigrationUnit {
    /// Applies the change.
    fn up(&self, conn: &mut dyn Connection) -> StepResult;

    /// Reverts the change.
    fn down(&self, conn: &mut dyn Connection) -> StepResult;

    /// Whether the unit actually defines `direction`.
    ///
    /// Returning `false` makes that operation fail at call time while the
    /// script stays discoverable.
    fn provides(&self, direction: Direction) -> bool {
        let _ = direction;
        true
    }

    /// Dispatches to [`up`](Self::up) or [`down`](Self::down).
    fn run(&self, direction: Direction, conn: &mut dyn Connection) -> StepResult {
        match direction {
            Direction::Up => self.up(conn),
            Direction::Down => self.down(conn),
        }
    }
}

type StepFn = Box<dyn Fn(&mut dyn Connection) -> StepResult>;

/// Migration unit built from closures.
///
/// # Examples
///
/// ```
/// use schema_ledger_core::{Direction, FnMigration, MigrationUnit};
///
/// let unit = FnMigration::new()
///     .on_up(|conn| {
///         conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY)", &[])
///             .map_err(|e| e.to_string())?;
///         conn.commit().map_err(|e| e.to_string())?;
///         Ok("created users".to_string())
///     });
///
/// assert!(unit.provides(Direction::Up));
/// assert!(!unit.provides(Direction::Down));
/// ```
#[derive(Default)]
pub struct FnMigration {
    up: Option<StepFn>,
    down: Option<StepFn>,
}

impl FnMigration {
    /// Creates a unit with neither operation defined.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines the `up` operation.
    pub fn on_up<F>(mut self, step: F) -> Self
    where
        F: Fn(&mut dyn Connection) -> StepResult + 'static,
    {
        self.up = Some(Box::new(step));
        self
    }

    /// Defines the `down` operation.
    pub fn on_down<F>(mut self, step: F) -> Self
    where
        F: Fn(&mut dyn Connection) -> StepResult + 'static,
    {
        self.down = Some(Box::new(step));
        self
    }
}

impl MigrationUnit for FnMigration {
    fn up(&self, conn: &mut dyn Connection) -> StepResult {
        match &self.up {
            Some(step) => step(conn),
            None => Err("migration does not define an up operation".to_string()),
        }
    }

    fn down(&self, conn: &mut dyn Connection) -> StepResult {
        match &self.down {
            Some(step) => step(conn),
            None => Err("migration does not define a down operation".to_string()),
        }
    }

    fn provides(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.up.is_some(),
            Direction::Down => self.down.is_some(),
        }
    }
}
