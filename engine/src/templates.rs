//! Skeleton bodies for generated migration scripts.
//!
//! Each template is SQL with a comment header and `-- migrate:up` /
//! `-- migrate:down` sections. `{{version}}`, `{{name}}` and
//! `{{description}}` are substituted by [`Template::render`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(version|name|description)\}\}").expect("static regex must compile")
});

const HEADER: &str = "\
-- Migration: {{name}}
-- Version: {{version}}
-- Description: {{description}}
";

const DEFAULT_BODY: &str = "
-- migrate:up
-- Write the forward change here.

-- migrate:down
-- Write the statements that undo the forward change here.
";

const CREATE_TABLE_BODY: &str = "
-- migrate:up
CREATE TABLE table_name (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX idx_table_name_name ON table_name (name);

-- migrate:down
DROP INDEX IF EXISTS idx_table_name_name;
DROP TABLE IF EXISTS table_name;
";

const ALTER_TABLE_BODY: &str = "
-- migrate:up
ALTER TABLE table_name ADD COLUMN new_column TEXT;
CREATE INDEX idx_table_name_new_column ON table_name (new_column);

-- migrate:down
DROP INDEX IF EXISTS idx_table_name_new_column;
ALTER TABLE table_name DROP COLUMN new_column;
";

const DATA_MIGRATION_BODY: &str = "
-- migrate:up
INSERT INTO target_table (id, name, description, status)
SELECT id, name, COALESCE(description, ''), 'active'
FROM source_table;

-- migrate:down
DELETE FROM target_table;
";

/// Which skeleton a generated script starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Empty `up` and `down` sections.
    #[default]
    Default,
    /// A table with an index.
    CreateTable,
    /// A new column with an index.
    AlterTable,
    /// Copying rows between tables.
    DataMigration,
}

impl Template {
    pub const ALL: [Template; 4] = [
        Template::Default,
        Template::CreateTable,
        Template::AlterTable,
        Template::DataMigration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::CreateTable => "create_table",
            Self::AlterTable => "alter_table",
            Self::DataMigration => "data_migration",
        }
    }

    fn body(self) -> &'static str {
        match self {
            Self::Default => DEFAULT_BODY,
            Self::CreateTable => CREATE_TABLE_BODY,
            Self::AlterTable => ALTER_TABLE_BODY,
            Self::DataMigration => DATA_MIGRATION_BODY,
        }
    }

    /// Renders the script body.
    ///
    /// `name` is the name as the user typed it, not the slug. Line breaks in
    /// `description` become spaces so the header stays one comment line.
    ///
    /// # Examples
    ///
    /// ```
    /// use schema_ledger_engine::Template;
    ///
    /// let body = Template::Default.render("20240115093000", "Create users", Some("Users table"));
    /// assert!(body.starts_with("-- Migration: Create users\n-- Version: 20240115093000\n"));
    /// assert!(body.contains("-- Description: Users table\n"));
    /// ```
    pub fn render(self, version: &str, name: &str, description: Option<&str>) -> String {
        let description = description
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let name = one_line(name);

        let mut content = String::with_capacity(HEADER.len() + self.body().len());
        content.push_str(HEADER);
        content.push_str(self.body());
        PLACEHOLDER_RE
            .replace_all(&content, |captures: &Captures<'_>| match &captures[1] {
                "version" => version.to_string(),
                "name" => name.clone(),
                _ => description.clone(),
            })
            .into_owned()
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Template {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|template| template.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown template '{s}' (expected one of: default, create_table, alter_table, data_migration)"
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SqlMigration;
    use crate::source::extract_description;
    use schema_ledger_core::{Direction, MigrationUnit};

    #[test]
    fn test_every_template_has_both_sections() {
        for template in Template::ALL {
            let body = template.render("20240115093000", "x", None);
            let parsed = SqlMigration::parse(&body);
            assert!(parsed.provides(Direction::Up), "{template}");
            assert!(parsed.provides(Direction::Down), "{template}");
            assert!(!body.contains("{{"), "{template} left a placeholder");
        }
    }

    #[test]
    fn test_description_is_flattened() {
        let body = Template::CreateTable.render("20240115093000", "x", Some("Line one\n  line two\n"));
        assert_eq!(
            extract_description(&body).as_deref(),
            Some("Line one line two")
        );
    }

    #[test]
    fn test_user_text_is_not_expanded() {
        let body = Template::Default.render(
            "20240115093000",
            "copy {{description}}",
            Some("uses {{version}} and {{name}}"),
        );
        assert!(body.starts_with("-- Migration: copy {{description}}\n-- Version: 20240115093000\n"));
        assert!(body.contains("-- Description: uses {{version}} and {{name}}\n"));
    }

    #[test]
    fn test_missing_description_reads_back_as_none() {
        let body = Template::Default.render("20240115093000", "x", None);
        assert_eq!(extract_description(&body), None);
    }

    #[test]
    fn test_from_str_and_display() {
        for template in Template::ALL {
            assert_eq!(template.as_str().parse::<Template>().unwrap(), template);
        }
        assert!("drop_everything".parse::<Template>().is_err());
        assert_eq!(Template::DataMigration.to_string(), "data_migration");
    }
}
