//! Error types for the migration engine
//!
//! Configuration problems are reported before any I/O happens, discovery
//! problems abort a registry reload, and execution problems carry the name of
//! the offending file so a failed transaction can be traced back to its script.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Where an execution error happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Applying a file during `up`
    Apply(String),
    /// Rolling back a file during `down`
    Rollback(String),
    /// The rollback phase of a refresh
    RefreshRollback(String),
    /// The re-apply phase of a refresh
    RefreshApply(String),
}

impl ExecutionContext {
    /// Name of the migration file the error belongs to
    pub fn name(&self) -> &str {
        match self {
            ExecutionContext::Apply(name)
            | ExecutionContext::Rollback(name)
            | ExecutionContext::RefreshRollback(name)
            | ExecutionContext::RefreshApply(name) => name,
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::Apply(name) | ExecutionContext::Rollback(name) => write!(f, "{}", name),
            ExecutionContext::RefreshRollback(name) => write!(f, "rollback \"{}\"", name),
            ExecutionContext::RefreshApply(name) => write!(f, "up \"{}\"", name),
        }
    }
}

/// Error type for the migration engine
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Duplicate migration name '{name}' ({} and {})", first.display(), second.display())]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Invalid migration name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("{context}: {source}")]
    Execution {
        context: ExecutionContext,
        source: Box<MigrateError>,
    },

    #[error("{operation} timed out after {}s", after.as_secs_f64())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Transaction error: {message}")]
    Transaction { message: String },
}

impl MigrateError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a new transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the file (and phase) an error was raised for
    pub fn in_context(self, context: ExecutionContext) -> Self {
        Self::Execution {
            context,
            source: Box::new(self),
        }
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, MigrateError::Configuration { .. })
    }
}

impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        MigrateError::database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_context_display() {
        let err = MigrateError::database("syntax error").in_context(ExecutionContext::Apply("001_users".into()));
        assert_eq!(err.to_string(), "001_users: Database error: syntax error");

        let err = MigrateError::database("boom").in_context(ExecutionContext::RefreshRollback("001_users".into()));
        assert_eq!(err.to_string(), "rollback \"001_users\": Database error: boom");

        let err = MigrateError::database("boom").in_context(ExecutionContext::RefreshApply("001_users".into()));
        assert_eq!(err.to_string(), "up \"001_users\": Database error: boom");
    }

    #[test]
    fn test_context_name() {
        assert_eq!(ExecutionContext::Rollback("a".into()).name(), "a");
        assert_eq!(ExecutionContext::RefreshApply("b".into()).name(), "b");
    }

    #[test]
    fn test_timeout_display() {
        let err = MigrateError::Timeout {
            operation: "up",
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "up timed out after 1.5s");
    }
}
