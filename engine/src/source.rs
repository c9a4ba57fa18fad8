//! Where migration scripts come from.
//!
//! [`ScriptSource`] is the filesystem collaborator: list entries, read one
//! as text, and say where it lives. [`discover_scripts`] turns a listing
//! into [`MigrationScript`]s following the `{version}_{slug}.{ext}`
//! contract; names that do not match are skipped silently.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use schema_ledger_core::{MigrationScript, parse_file_name};

static DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Description:[ \t]*(.+)").expect("static regex must compile"));

/// Listing and reading capability over a set of script entries.
pub trait ScriptSource {
    /// Entry names, in no particular order. A source with nothing in it
    /// returns an empty list.
    fn list(&self) -> io::Result<Vec<String>>;

    /// Reads one entry as UTF-8 text.
    fn read(&self, name: &str) -> io::Result<String>;

    /// Location reported for an entry.
    fn path(&self, name: &str) -> PathBuf;
}

/// Scripts stored as files in one directory (not recursive).
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory being listed.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ScriptSource for DirectorySource {
    /// Lists regular files, following symlinks. A missing directory lists
    /// as empty.
    fn list(&self) -> io::Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn read(&self, name: &str) -> io::Result<String> {
        std::fs::read_to_string(self.dir.join(name))
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// Extracts the text after the first `Description:` marker.
///
/// Returns `None` when there is no marker or nothing follows it.
pub fn extract_description(content: &str) -> Option<String> {
    let captures = DESCRIPTION_RE.captures(content)?;
    let text = captures[1].trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Lists `source` and returns every entry that follows the filename
/// contract for `extension`, sorted by version then path.
///
/// Descriptions are read from the file contents; a file that cannot be read
/// is still discovered, without a description.
pub fn discover_scripts(source: &dyn ScriptSource, extension: &str) -> io::Result<Vec<MigrationScript>> {
    let mut scripts: Vec<MigrationScript> = source
        .list()?
        .into_iter()
        .filter_map(|name| {
            let (version, slug) = parse_file_name(&name, extension)?;
            let description = source
                .read(&name)
                .ok()
                .and_then(|content| extract_description(&content));
            let mut script = MigrationScript::new(version, slug, source.path(&name));
            script.description = description;
            Some(script)
        })
        .collect();

    scripts.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));
    Ok(scripts)
}
