//! Injected logging capability.
//!
//! The ledger, executor and generator never log through globals. Each
//! receives an [`Arc<dyn MigrationObserver>`](MigrationObserver) at
//! construction and reports [`MigrationEvent`]s to it. [`TracingObserver`]
//! is the default and forwards events to `tracing`; [`RecordingObserver`]
//! keeps them in memory for assertions.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use schema_ledger_core::{Direction, Version};
use tracing::{debug, error, info, warn};

/// Something the engine did or ran into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationEvent {
    /// The ledger table was created.
    LedgerCreated { table: String },
    /// A ledger row was inserted.
    RecordWritten { version: Version, batch: i64 },
    /// A ledger row was deleted.
    RecordRemoved { version: Version },
    /// Every ledger row was deleted.
    LedgerCleared { table: String },
    /// A script's `up` ran and was recorded.
    Applied { version: Version, name: String, batch: i64 },
    /// A script's `down` ran and its record was removed.
    Reverted { version: Version, name: String },
    /// An `up`/`down` call failed.
    Failed {
        version: Version,
        direction: Direction,
        message: String,
    },
    /// `reset` left a ledger row alone because its script is gone.
    OrphanSkipped { version: Version },
    /// Two script files share one version; only the first is used.
    DuplicateVersion { version: Version, ignored: PathBuf },
    /// A migration applied earlier in a failed `migrate` call was reverted.
    Compensated { version: Version },
    /// A new script skeleton was written.
    Generated { version: Version, path: PathBuf },
}

/// Receiver for [`MigrationEvent`]s.
pub trait MigrationObserver: Send + Sync {
    fn on_event(&self, event: &MigrationEvent);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl MigrationObserver for TracingObserver {
    fn on_event(&self, event: &MigrationEvent) {
        match event {
            MigrationEvent::LedgerCreated { table } => info!(table = %table, "created ledger table"),
            MigrationEvent::RecordWritten { version, batch } => {
                debug!(version = %version, batch, "recorded migration")
            }
            MigrationEvent::RecordRemoved { version } => {
                debug!(version = %version, "removed migration record")
            }
            MigrationEvent::LedgerCleared { table } => info!(table = %table, "cleared ledger"),
            MigrationEvent::Applied { version, name, batch } => {
                info!(version = %version, name = %name, batch, "applied migration")
            }
            MigrationEvent::Reverted { version, name } => {
                info!(version = %version, name = %name, "reverted migration")
            }
            MigrationEvent::Failed {
                version,
                direction,
                message,
            } => error!(
                version = %version,
                direction = %direction,
                error = %message,
                "migration failed"
            ),
            MigrationEvent::OrphanSkipped { version } => {
                warn!(version = %version, "migration not found on disk, skipping")
            }
            MigrationEvent::DuplicateVersion { version, ignored } => warn!(
                version = %version,
                ignored = %ignored.display(),
                "duplicate migration version, ignoring file"
            ),
            MigrationEvent::Compensated { version } => {
                warn!(version = %version, "reverted migration after failed run")
            }
            MigrationEvent::Generated { version, path } => {
                info!(version = %version, path = %path.display(), "generated migration")
            }
        }
    }
}

/// Keeps every event in memory.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use schema_ledger_engine::{MigrationEvent, MigrationObserver, RecordingObserver};
///
/// let observer = Arc::new(RecordingObserver::default());
/// observer.on_event(&MigrationEvent::LedgerCreated { table: "migrations".into() });
/// assert_eq!(observer.events().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<MigrationEvent>>,
}

impl RecordingObserver {
    /// Returns a copy of the events seen so far, oldest first.
    pub fn events(&self) -> Vec<MigrationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drops every recorded event.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl MigrationObserver for RecordingObserver {
    fn on_event(&self, event: &MigrationEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// The observer components use when none is injected.
pub fn default_observer() -> Arc<dyn MigrationObserver> {
    Arc::new(TracingObserver)
}
