//! Creating new migration scripts.

use std::fs::OpenOptions;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use schema_ledger_core::{Version, migration_file_name, migration_slug};

use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::observer::{MigrationEvent, MigrationObserver, default_observer};
use crate::templates::Template;

/// A script written by [`MigrationGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMigration {
    pub version: Version,
    /// Slug used in the file name.
    pub name: String,
    pub file_name: String,
    pub path: PathBuf,
}

/// Writes new script skeletons into a migrations directory.
///
/// The version is the current UTC time, so it only grows as long as the
/// clock does. A version that is already taken by any file in the directory
/// is rejected; nothing is ever overwritten.
///
/// # Examples
///
/// ```
/// use schema_ledger_engine::{MigrationGenerator, Template};
///
/// let dir = tempfile::TempDir::new().unwrap();
/// let generator = MigrationGenerator::new(dir.path());
/// let generated = generator
///     .generate("Create users", Some("Users table"), Template::CreateTable)
///     .unwrap();
/// assert!(generated.file_name.ends_with("_create_users.sql"));
/// ```
pub struct MigrationGenerator {
    dir: PathBuf,
    extension: String,
    observer: Arc<dyn MigrationObserver>,
}

impl MigrationGenerator {
    /// Generator writing `.sql` files into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: "sql".to_string(),
            observer: default_observer(),
        }
    }

    /// Generator for `config.migrations_dir` and `config.extension`.
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            dir: config.migrations_dir.clone(),
            extension: config.extension.clone(),
            observer: default_observer(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn MigrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generates a script versioned at the current time.
    pub fn generate(
        &self,
        name: &str,
        description: Option<&str>,
        template: Template,
    ) -> Result<GeneratedMigration> {
        self.generate_at(name, description, template, Utc::now())
    }

    /// Generates a script versioned at `now`.
    ///
    /// # Errors
    ///
    /// - [`InvalidName`](MigrateError::InvalidName) if `name` has no usable
    ///   characters.
    /// - [`VersionCollision`](MigrateError::VersionCollision) if a file with
    ///   the same version already exists.
    /// - [`Io`](MigrateError::Io) if the directory or file cannot be written.
    pub fn generate_at(
        &self,
        name: &str,
        description: Option<&str>,
        template: Template,
        now: DateTime<Utc>,
    ) -> Result<GeneratedMigration> {
        let slug = migration_slug(name)?;
        let version = Version::from_datetime(now);
        let file_name = migration_file_name(&version, &slug, &self.extension);

        std::fs::create_dir_all(&self.dir)?;
        if let Some(existing) = self.file_with_version(&version)? {
            return Err(MigrateError::VersionCollision {
                version,
                file_name: existing,
            });
        }

        let path = self.dir.join(&file_name);
        let content = template.render(version.as_str(), name, description);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == IoErrorKind::AlreadyExists => {
                return Err(MigrateError::VersionCollision { version, file_name });
            }
            Err(err) => return Err(err.into()),
        };
        file.write_all(content.as_bytes())?;

        self.observer.on_event(&MigrationEvent::Generated {
            version: version.clone(),
            path: path.clone(),
        });

        Ok(GeneratedMigration {
            version,
            name: slug,
            file_name,
            path,
        })
    }

    /// Name of any file in the directory that starts with `{version}_`.
    fn file_with_version(&self, version: &Version) -> Result<Option<String>> {
        let prefix = format!("{version}_");
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            if let Some(name) = name.to_str().filter(|n| n.starts_with(&prefix)) {
                return Ok(Some(name.to_string()));
            }
        }
        Ok(None)
    }
}
