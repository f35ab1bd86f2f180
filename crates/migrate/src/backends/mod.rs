//! Migration Source Backends
//!
//! The engine is written against the traits in [`core`]. This module provides
//! the sqlx bindings for PostgreSQL and MySQL and an in-memory source used by
//! tests and dry runs.

pub mod core;
pub mod memory;
pub mod mysql;
pub mod postgres;

use std::sync::Arc;

// Re-export core traits and types
pub use self::core::*;
pub use memory::MemorySource;
pub use mysql::MySqlSource;
pub use postgres::PostgresSource;

use crate::error::{MigrateError, MigrateResult};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    MySQL,
}

impl DatabaseBackendType {
    /// Detect the backend from a connection URL scheme
    pub fn from_url(database_url: &str) -> MigrateResult<Self> {
        let url = url::Url::parse(database_url)
            .map_err(|e| MigrateError::configuration(format!("Invalid database URL: {}", e)))?;

        url.scheme().parse().map_err(MigrateError::configuration)
    }

    /// SQL dialect spoken by this backend
    pub fn dialect(&self) -> SqlDialect {
        match self {
            DatabaseBackendType::PostgreSQL => SqlDialect::PostgreSQL,
            DatabaseBackendType::MySQL => SqlDialect::MySQL,
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::MySQL => write!(f, "mysql"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            "mysql" | "mariadb" => Ok(DatabaseBackendType::MySQL),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}

/// Connect to `database_url` with the binding matching its scheme
pub async fn connect_source(database_url: &str) -> MigrateResult<Arc<dyn MigrationSource>> {
    let backend = DatabaseBackendType::from_url(database_url)?;
    tracing::debug!("Connecting {} migration source", backend);

    let source: Arc<dyn MigrationSource> = match backend {
        DatabaseBackendType::PostgreSQL => Arc::new(PostgresSource::connect(database_url).await?),
        DatabaseBackendType::MySQL => Arc::new(MySqlSource::connect(database_url).await?),
    };

    Ok(source)
}
