//! # stagehand-migrate: staged SQL schema migrations
//!
//! Migration files declare per-stage `up` and `down` scripts:
//!
//! ```sql
//! -- { up: table }
//! CREATE TABLE users (id BIGINT PRIMARY KEY, email TEXT NOT NULL);
//! -- { down: table }
//! DROP TABLE users;
//!
//! -- { up: index }
//! CREATE UNIQUE INDEX users_email ON users (email);
//! -- { down: index }
//! DROP INDEX users_email;
//! ```
//!
//! A [`Migrator`] applies, rolls back or refreshes the scripts of the stages
//! it is given, records every applied `(file, stage)` pair in a history
//! table, and runs each call in a single transaction.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stagehand_migrate::{connect_source, DirFs, MigrationFilter, Migrator, MigratorConfig};
//!
//! # async fn run() -> stagehand_migrate::MigrateResult<()> {
//! let source = connect_source("postgres://localhost/app").await?;
//! let config = MigratorConfig::new().with_root("database/migrations");
//! let migrator = Migrator::new(source, Arc::new(DirFs::new()), config).await?;
//!
//! let applied = migrator.up(&["table", "index"], &MigrationFilter::new()).await?;
//! for (stage, files) in applied.group_by_stage() {
//!     println!("{}: {} files", stage, files.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod create;
pub mod error;
pub mod file;
pub mod filter;
pub mod fs;
pub mod history;
pub mod migrator;
pub mod registry;

// Re-export core traits and types
pub use backends::{
    connect_source, DatabaseBackendType, DatabaseRow, DatabaseValue, MemorySource, MigrationSource,
    MySqlSource, PostgresSource, SourceTransaction, SqlDialect,
};
pub use config::{Environment, MigratorConfig};
pub use create::{create_migration_file, slugify};
pub use error::{ExecutionContext, MigrateError, MigrateResult};
pub use file::MigrationFile;
pub use filter::{MigrationFilter, OptionSet};
pub use fs::{DirFs, FileSystem, MemoryFs};
pub use history::{HistoryStore, Migrated, Summary};
pub use migrator::Migrator;
pub use registry::{Order, Registry};
