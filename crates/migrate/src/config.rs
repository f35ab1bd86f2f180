//! Migrator configuration
//!
//! `MigratorConfig` is an explicit options struct built with `with_*`
//! methods. It can also be read from the environment:
//!
//! | Variable           | Field         | Default       |
//! |--------------------|---------------|---------------|
//! | `MIGRATIONS_DIR`   | `root`        | `.`           |
//! | `MIGRATIONS_EXT`   | `extension`   | `sql`         |
//! | `MIGRATIONS_TABLE` | `table`       | `migrations`  |
//! | `ENVIRONMENT`      | `environment` | `production`  |

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use crate::error::{MigrateError, MigrateResult};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid")
});

/// Default timeout for history reads and table initialization
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for apply, rollback and refresh transactions
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Environment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    Testing,
    #[default]
    Production,
}

impl FromStr for Environment {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(MigrateError::configuration(format!(
                "Invalid environment '{}', expected development, testing, or production",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_str = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        };
        write!(f, "{}", env_str)
    }
}

impl Environment {
    /// Check if environment is development
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Configuration for a [`Migrator`](crate::Migrator)
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Directory scanned for migration files
    pub root: PathBuf,
    /// File extension, without the leading dot
    pub extension: String,
    /// Development mode reloads the registry before every operation
    pub environment: Environment,
    /// Name of the history table
    pub table: String,
    pub query_timeout: Duration,
    pub transaction_timeout: Duration,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            extension: "sql".to_string(),
            environment: Environment::Production,
            table: "migrations".to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }
}

impl MigratorConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations root directory
    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        self.root = root.as_ref().to_path_buf();
        self
    }

    /// Set the migration file extension; leading dots are ignored
    pub fn with_extension(mut self, extension: impl AsRef<str>) -> Self {
        self.extension = extension.as_ref().trim_start_matches('.').to_string();
        self
    }

    /// Set the environment
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Set the history table name
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> MigrateResult<Self> {
        let mut config = Self::new();

        if let Ok(dir) = env::var("MIGRATIONS_DIR") {
            config = config.with_root(dir);
        }

        if let Ok(ext) = env::var("MIGRATIONS_EXT") {
            config = config.with_extension(ext);
        }

        if let Ok(table) = env::var("MIGRATIONS_TABLE") {
            config.table = table;
        }

        if let Ok(env_str) = env::var("ENVIRONMENT") {
            config.environment = env_str.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> MigrateResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(MigrateError::configuration("Migrations root must not be empty"));
        }

        if self.extension.is_empty() {
            return Err(MigrateError::configuration("Migration file extension must not be empty"));
        }

        if !self.extension.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.') {
            return Err(MigrateError::configuration(format!(
                "Invalid migration file extension '{}'",
                self.extension
            )));
        }

        if !IDENTIFIER.is_match(&self.table) {
            return Err(MigrateError::configuration(format!(
                "Invalid history table name '{}', expected an SQL identifier",
                self.table
            )));
        }

        if self.query_timeout.is_zero() || self.transaction_timeout.is_zero() {
            return Err(MigrateError::configuration("Timeouts must be greater than zero"));
        }

        Ok(())
    }

    /// Check if the registry is reloaded on every call
    pub fn is_dev(&self) -> bool {
        self.environment.is_development()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in ["MIGRATIONS_DIR", "MIGRATIONS_EXT", "MIGRATIONS_TABLE", "ENVIRONMENT"] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults() {
        let config = MigratorConfig::default();
        assert_eq!(config.root, PathBuf::from("."));
        assert_eq!(config.extension, "sql");
        assert_eq!(config.table, "migrations");
        assert_eq!(config.query_timeout, Duration::from_secs(10));
        assert_eq!(config.transaction_timeout, Duration::from_secs(300));
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.is_dev());
        assert!(MigratorConfig::new().with_environment(Environment::Development).is_dev());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extension_dots_are_trimmed() {
        assert_eq!(MigratorConfig::new().with_extension(".sql").extension, "sql");
        assert_eq!(MigratorConfig::new().with_extension("..pgsql").extension, "pgsql");
        assert!(MigratorConfig::new().with_extension(".").validate().is_err());
    }

    #[test]
    fn test_table_must_be_identifier() {
        assert!(MigratorConfig::new().with_table("schema_history").validate().is_ok());
        assert!(MigratorConfig::new().with_table("_h2").validate().is_ok());

        let err = MigratorConfig::new()
            .with_table("migrations; DROP TABLE users")
            .validate()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(MigratorConfig::new().with_table("1st").validate().is_err());
        assert!(MigratorConfig::new().with_table("").validate().is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("PRODUCTION".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("test".parse::<Environment>().unwrap(), Environment::Testing);
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!(Environment::Testing.to_string(), "testing");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = MigratorConfig::new().with_query_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("MIGRATIONS_DIR", "db/migrations");
        env::set_var("MIGRATIONS_EXT", ".pgsql");
        env::set_var("MIGRATIONS_TABLE", "schema_history");
        env::set_var("ENVIRONMENT", "production");

        let config = MigratorConfig::from_env().unwrap();
        assert_eq!(config.root, PathBuf::from("db/migrations"));
        assert_eq!(config.extension, "pgsql");
        assert_eq!(config.table, "schema_history");
        assert!(!config.is_dev());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_values() {
        clear_env();
        env::set_var("ENVIRONMENT", "staging");
        assert!(MigratorConfig::from_env().is_err());

        clear_env();
        assert!(!MigratorConfig::from_env().unwrap().is_dev());

        clear_env();
        env::set_var("MIGRATIONS_TABLE", "bad-name");
        assert!(MigratorConfig::from_env().unwrap_err().is_configuration());

        clear_env();
    }
}
