//! Core Source Traits
//!
//! The engine never talks to a driver directly. It consumes a
//! [`MigrationSource`], which can run statements, read rows and open a
//! transaction. Concrete bindings differ only in placeholder style and in how
//! driver rows are adapted to [`DatabaseRow`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use crate::error::MigrateResult;

/// Transactional SQL execution surface used by the migration engine
#[async_trait]
pub trait MigrationSource: Send + Sync {
    /// Execute a statement outside of any transaction and return affected rows
    async fn exec(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64>;

    /// Execute a query outside of any transaction and return all rows
    async fn scan(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<Box<dyn DatabaseRow>>>;

    /// Begin a transaction
    ///
    /// Dropping the returned handle without calling `commit` rolls it back.
    async fn begin(&self) -> MigrateResult<Box<dyn SourceTransaction>>;

    /// Get the SQL dialect used by this source
    fn dialect(&self) -> SqlDialect;
}

/// A transaction opened through [`MigrationSource::begin`]
#[async_trait]
pub trait SourceTransaction: Send {
    /// Execute a statement within the transaction
    async fn exec(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64>;

    /// Execute a query and return result rows within the transaction
    async fn scan(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<Box<dyn DatabaseRow>>>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> MigrateResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> MigrateResult<()>;
}

/// Abstract database row
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by index
    fn get_by_index(&self, index: usize) -> MigrateResult<DatabaseValue>;

    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> MigrateResult<DatabaseValue>;

    /// Get column count
    fn column_count(&self) -> usize;
}

/// Database value used for parameter binding and row access
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    String(String),
    DateTime(DateTime<Utc>),
    /// Timestamp without time zone, interpreted as UTC
    Timestamp(NaiveDateTime),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Borrow the value as a string, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read the value as a UTC timestamp
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            DatabaseValue::DateTime(dt) => Some(*dt),
            DatabaseValue::Timestamp(ts) => Some(ts.and_utc()),
            _ => None,
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<NaiveDateTime> for DatabaseValue {
    fn from(value: NaiveDateTime) -> Self {
        DatabaseValue::Timestamp(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
}

impl SqlDialect {
    /// Get the parameter placeholder for a zero-based parameter index
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL => "?".to_string(),
        }
    }

    /// Get the current timestamp function for this dialect
    pub fn current_timestamp(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "NOW()",
            SqlDialect::MySQL => "CURRENT_TIMESTAMP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parameter_placeholders() {
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(0), "$1");
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(1), "$2");
        assert_eq!(SqlDialect::MySQL.parameter_placeholder(0), "?");
        assert_eq!(SqlDialect::MySQL.parameter_placeholder(5), "?");
    }

    #[test]
    fn test_value_accessors() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let value = DatabaseValue::from(ts);
        assert_eq!(value.as_datetime(), Some(ts.and_utc()));
        assert_eq!(value.as_str(), None);

        assert_eq!(DatabaseValue::from("table").as_str(), Some("table"));
        assert!(DatabaseValue::from(Option::<String>::None).is_null());
    }
}
