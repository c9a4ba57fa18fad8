//! Backend-neutral SQL parameter and row values.

use crate::version::Version;

/// A single SQL value passed as a parameter or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl SqlValue {
    /// Returns `true` for [`SqlValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view. Booleans map to `0`/`1`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    /// Text view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Boolean view. Integers are truthy when non-zero, which is how
    /// SQLite stores `BOOLEAN` columns.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Integer(value) => Some(*value != 0),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&Version> for SqlValue {
    fn from(value: &Version) -> Self {
        Self::Text(value.as_str().to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One result row: ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column.
    pub fn push(&mut self, column: impl Into<String>, value: SqlValue) {
        self.columns.push((column.into(), value));
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value.into());
        self
    }

    /// Looks up a column by name (first match).
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Looks up a column by position.
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.columns.get(index).map(|(_, value)| value)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_str)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(SqlValue::as_bool)
    }

    /// Iterates over column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_by_name_and_index() {
        let row = Row::new()
            .with("id", 7_i64)
            .with("version", "20240115093000")
            .with("success", SqlValue::Integer(1))
            .with("description", None::<String>);

        assert_eq!(row.get_i64("id"), Some(7));
        assert_eq!(row.get_str("version"), Some("20240115093000"));
        assert_eq!(row.get_bool("success"), Some(true));
        assert!(row.get("description").unwrap().is_null());
        assert_eq!(row.get_index(0), Some(&SqlValue::Integer(7)));
        assert!(row.get("missing").is_none());
        assert_eq!(row.len(), 4);
        assert_eq!(
            row.column_names().collect::<Vec<_>>(),
            ["id", "version", "success", "description"]
        );
    }

    #[test]
    fn test_value_views() {
        assert_eq!(SqlValue::Bool(true).as_i64(), Some(1));
        assert_eq!(SqlValue::Integer(0).as_bool(), Some(false));
        assert_eq!(SqlValue::Text("x".into()).as_i64(), None);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }
}
