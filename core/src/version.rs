//! Migration versions and the on-disk filename contract.
//!
//! A version is a 14-digit UTC timestamp (`YYYYMMDDHHMMSS`). Because the
//! width is fixed, plain string ordering is chronological ordering, which
//! is what discovery and the ledger rely on.
//!
//! Script files are named `{version}_{slug}.{ext}`:
//!
//! ```
//! use schema_ledger_core::{format_slug, migration_file_name, parse_file_name, Version};
//!
//! let version = Version::parse("20240115093000").unwrap();
//! let slug = format_slug("Add Email to Users!");
//! assert_eq!(slug, "add_email_to_users");
//!
//! let file_name = migration_file_name(&version, &slug, "sql");
//! assert_eq!(file_name, "20240115093000_add_email_to_users.sql");
//!
//! let (parsed, name) = parse_file_name(&file_name, "sql").unwrap();
//! assert_eq!(parsed, version);
//! assert_eq!(name, "add_email_to_users");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// `strftime` pattern used to derive a version from a timestamp.
pub const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// Number of characters in every version.
pub const VERSION_WIDTH: usize = 14;

static FILE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{14})_([a-z0-9_]+)\.([A-Za-z0-9]+)$").expect("static regex must compile")
});

/// Fixed-width, lexicographically sortable migration version.
///
/// # Examples
///
/// ```
/// use schema_ledger_core::Version;
///
/// let older = Version::parse("20231231235959").unwrap();
/// let newer = Version::parse("20240101000000").unwrap();
/// assert!(older < newer);
/// assert!(Version::parse("2024-01-01").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Parses a version, requiring exactly 14 ASCII digits.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidVersion`] for any other input.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() == VERSION_WIDTH && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::InvalidVersion(raw.to_string()))
        }
    }

    /// Derives the version for a point in time.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(VERSION_FORMAT).to_string())
    }

    /// Returns the version as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the instant encoded by the version.
    ///
    /// `None` when the digits do not name a real calendar instant
    /// (for example month `13`).
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        let field = |range: std::ops::Range<usize>| self.0[range].parse::<u32>().ok();
        let year = self.0[0..4].parse::<i32>().ok()?;
        NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_opt(
            field(8..10)?,
            field(10..12)?,
            field(12..14)?,
        )
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turns a free-form migration name into a filename slug.
///
/// Whitespace runs collapse to a single `_`, anything outside
/// `[A-Za-z0-9_]` is dropped and the rest is lower-cased. Non-ASCII letters
/// are dropped rather than case-folded.
pub fn format_slug(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// [`format_slug`], rejecting names that leave nothing behind.
pub fn migration_slug(name: &str) -> Result<String> {
    let slug = format_slug(name);
    if slug.is_empty() {
        return Err(CoreError::InvalidName(name.to_string()));
    }
    Ok(slug)
}

/// Builds the `{version}_{slug}.{ext}` filename for a script.
pub fn migration_file_name(version: &Version, slug: &str, extension: &str) -> String {
    format!("{version}_{slug}.{extension}")
}

/// Splits a script filename into its version and slug.
///
/// Returns `None` when the name does not follow the contract or carries a
/// different extension. Callers treat that as "not a migration", never as
/// an error.
pub fn parse_file_name(file_name: &str, extension: &str) -> Option<(Version, String)> {
    let captures = FILE_NAME_RE.captures(file_name)?;
    if &captures[3] != extension {
        return None;
    }
    let version = Version(captures[1].to_string());
    Some((version, captures[2].to_string()))
}
