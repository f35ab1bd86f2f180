//! In-memory Source
//!
//! A process-local [`MigrationSource`] that keeps the history table in memory
//! and records every script it is asked to run. It understands exactly the
//! statements issued by [`HistoryStore`](crate::history::HistoryStore):
//! parameterised statements and queries address the history table, anything
//! else is treated as a migration script.
//!
//! Writes made through a transaction are staged and only become visible on
//! commit, and the `(name, stage)` key is enforced like a primary key would.
//! Like PostgreSQL's `NOW()`, every row inserted by one transaction gets the
//! transaction's start time.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use crate::error::{MigrateError, MigrateResult};
use super::core::*;

#[derive(Debug, Clone)]
struct HistoryRow {
    name: String,
    stage: String,
    created_at: NaiveDateTime,
}

#[derive(Debug, Default)]
struct MemoryState {
    table_created: bool,
    rows: Vec<HistoryRow>,
    executed: Vec<String>,
    fail_on: Vec<String>,
    last_timestamp: Option<NaiveDateTime>,
}

impl MemoryState {
    /// Clock reading, strictly increasing across calls
    fn now(&mut self) -> NaiveDateTime {
        let mut now = Utc::now().naive_utc();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + chrono::Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn check_script(&self, sql: &str) -> MigrateResult<()> {
        match self.fail_on.iter().find(|pattern| sql.contains(pattern.as_str())) {
            Some(pattern) => Err(MigrateError::database(format!(
                "Query execution failed: script rejected (matched '{}')",
                pattern
            ))),
            None => Ok(()),
        }
    }
}

/// In-memory migration source
#[derive(Debug, Clone)]
pub struct MemorySource {
    dialect: SqlDialect,
    latency: Option<Duration>,
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySource {
    /// Create an empty source speaking the PostgreSQL placeholder style
    pub fn new() -> Self {
        Self::with_dialect(SqlDialect::PostgreSQL)
    }

    /// Create an empty source speaking the given dialect
    pub fn with_dialect(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            latency: None,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Delay every script execution, to exercise deadlines
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every script containing `pattern` fail
    pub fn fail_on(&self, pattern: impl Into<String>) -> MigrateResult<()> {
        self.lock()?.fail_on.push(pattern.into());
        Ok(())
    }

    /// Stop failing scripts
    pub fn clear_failures(&self) -> MigrateResult<()> {
        self.lock()?.fail_on.clear();
        Ok(())
    }

    /// Scripts executed by committed transactions, in execution order
    pub fn executed_scripts(&self) -> MigrateResult<Vec<String>> {
        Ok(self.lock()?.executed.clone())
    }

    /// Committed history as `(name, stage)` pairs, in insertion order
    pub fn history(&self) -> MigrateResult<Vec<(String, String)>> {
        Ok(self.lock()?
            .rows
            .iter()
            .map(|row| (row.name.clone(), row.stage.clone()))
            .collect())
    }

    /// Whether the history table has been created
    pub fn is_initialized(&self) -> MigrateResult<bool> {
        Ok(self.lock()?.table_created)
    }

    /// Insert a history row directly, bypassing any script
    pub fn record(&self, name: impl Into<String>, stage: impl Into<String>) -> MigrateResult<()> {
        let mut state = self.lock()?;
        let created_at = state.now();
        let row = HistoryRow {
            name: name.into(),
            stage: stage.into(),
            created_at,
        };
        insert_row(&mut state.rows, row)
    }

    fn lock(&self) -> MigrateResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| MigrateError::database("Memory source state is poisoned"))
    }

    fn history_params<'p>(&self, sql: &str, params: &'p [DatabaseValue]) -> MigrateResult<(&'p str, &'p str)> {
        let placeholder = self.dialect.parameter_placeholder(1);
        if !sql.contains(&placeholder) {
            return Err(MigrateError::database(format!(
                "Statement does not use {:?} placeholders: {}",
                self.dialect, sql
            )));
        }

        match params {
            [name, stage] => match (name.as_str(), stage.as_str()) {
                (Some(name), Some(stage)) => Ok((name, stage)),
                _ => Err(MigrateError::database("History parameters must be strings")),
            },
            _ => Err(MigrateError::database(format!(
                "Expected 2 history parameters, got {}",
                params.len()
            ))),
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MigrationSource for MemorySource {
    async fn exec(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        if params.is_empty() && is_create_table(sql) {
            self.lock()?.table_created = true;
            return Ok(0);
        }

        // Outside a transaction every statement commits on its own.
        let mut tx = self.begin().await?;
        let affected = tx.exec(sql, params).await?;
        tx.commit().await?;
        Ok(affected)
    }

    async fn scan(&self, sql: &str, _params: &[DatabaseValue]) -> MigrateResult<Vec<Box<dyn DatabaseRow>>> {
        let state = self.lock()?;
        select_rows(&state, &state.rows, sql)
    }

    async fn begin(&self) -> MigrateResult<Box<dyn SourceTransaction>> {
        let (rows, started_at) = {
            let mut state = self.lock()?;
            (state.rows.clone(), state.now())
        };
        Ok(Box::new(MemoryTransaction {
            source: self.clone(),
            rows,
            executed: Vec::new(),
            started_at,
        }))
    }

    fn dialect(&self) -> SqlDialect {
        self.dialect
    }
}

/// Transaction over a [`MemorySource`]; staged writes are discarded on drop
pub struct MemoryTransaction {
    source: MemorySource,
    rows: Vec<HistoryRow>,
    executed: Vec<String>,
    started_at: NaiveDateTime,
}

#[async_trait]
impl SourceTransaction for MemoryTransaction {
    async fn exec(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        let statement = sql.trim_start().to_ascii_uppercase();

        if params.is_empty() {
            self.source.simulate_latency().await;
            self.source.lock()?.check_script(sql)?;
            self.executed.push(sql.to_string());
            return Ok(0);
        }

        let (name, stage) = self.source.history_params(sql, params)?;
        if statement.starts_with("INSERT") {
            let row = HistoryRow {
                name: name.to_string(),
                stage: stage.to_string(),
                created_at: self.started_at,
            };
            insert_row(&mut self.rows, row)?;
            Ok(1)
        } else if statement.starts_with("DELETE") {
            let before = self.rows.len();
            self.rows.retain(|row| !(row.name == name && row.stage == stage));
            Ok((before - self.rows.len()) as u64)
        } else {
            Err(MigrateError::database(format!("Unsupported history statement: {}", sql)))
        }
    }

    async fn scan(&mut self, sql: &str, _params: &[DatabaseValue]) -> MigrateResult<Vec<Box<dyn DatabaseRow>>> {
        let state = self.source.lock()?;
        select_rows(&state, &self.rows, sql)
    }

    async fn commit(self: Box<Self>) -> MigrateResult<()> {
        let MemoryTransaction { source, rows, executed, .. } = *self;
        let mut state = source.lock()?;
        state.rows = rows;
        state.executed.extend(executed);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrateResult<()> {
        Ok(())
    }
}

/// A history row as returned by `SELECT name, stage, created_at`
struct MemoryRow {
    values: [(&'static str, DatabaseValue); 3],
}

impl DatabaseRow for MemoryRow {
    fn get_by_index(&self, index: usize) -> MigrateResult<DatabaseValue> {
        self.values
            .get(index)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| MigrateError::database(format!("Column index {} out of range", index)))
    }

    fn get_by_name(&self, name: &str) -> MigrateResult<DatabaseValue> {
        self.values
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| MigrateError::database(format!("Column '{}' not found", name)))
    }

    fn column_count(&self) -> usize {
        self.values.len()
    }
}

fn is_create_table(sql: &str) -> bool {
    sql.trim_start().to_ascii_uppercase().starts_with("CREATE TABLE IF NOT EXISTS")
}

fn insert_row(rows: &mut Vec<HistoryRow>, row: HistoryRow) -> MigrateResult<()> {
    if rows.iter().any(|r| r.name == row.name && r.stage == row.stage) {
        return Err(MigrateError::database(format!(
            "Query execution failed: duplicate key ({}, {}) violates unique constraint",
            row.name, row.stage
        )));
    }
    rows.push(row);
    Ok(())
}

fn select_rows(state: &MemoryState, rows: &[HistoryRow], sql: &str) -> MigrateResult<Vec<Box<dyn DatabaseRow>>> {
    if !state.table_created {
        return Err(MigrateError::database("Query fetch failed: history table does not exist"));
    }
    if !sql.trim_start().to_ascii_uppercase().starts_with("SELECT") {
        return Err(MigrateError::database(format!("Unsupported query: {}", sql)));
    }

    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.stage.cmp(&b.stage))
    });

    Ok(rows
        .into_iter()
        .map(|row| {
            Box::new(MemoryRow {
                values: [
                    ("name", DatabaseValue::String(row.name)),
                    ("stage", DatabaseValue::String(row.stage)),
                    ("created_at", DatabaseValue::Timestamp(row.created_at)),
                ],
            }) as Box<dyn DatabaseRow>
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSERT: &str = "INSERT INTO migrations (name, stage) VALUES ($1, $2)";
    const DELETE: &str = "DELETE FROM migrations WHERE name = $1 AND stage = $2";
    const SELECT: &str = "SELECT name, stage, created_at FROM migrations ORDER BY created_at ASC";

    fn params(name: &str, stage: &str) -> Vec<DatabaseValue> {
        vec![name.into(), stage.into()]
    }

    #[tokio::test]
    async fn test_scan_requires_table() {
        let source = MemorySource::new();
        assert!(source.scan(SELECT, &[]).await.is_err());

        source.exec("CREATE TABLE IF NOT EXISTS migrations (name VARCHAR(100))", &[]).await.unwrap();
        assert!(source.is_initialized().unwrap());
        assert!(source.scan(SELECT, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let source = MemorySource::new();
        source.exec("CREATE TABLE IF NOT EXISTS migrations ()", &[]).await.unwrap();

        let mut tx = source.begin().await.unwrap();
        tx.exec("CREATE TABLE users (id INT)", &[]).await.unwrap();
        tx.exec(INSERT, &params("001_users", "table")).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(source.history().unwrap().is_empty());
        assert!(source.executed_scripts().unwrap().is_empty());

        let mut tx = source.begin().await.unwrap();
        tx.exec("CREATE TABLE users (id INT)", &[]).await.unwrap();
        tx.exec(INSERT, &params("001_users", "table")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(source.history().unwrap(), vec![("001_users".to_string(), "table".to_string())]);
        assert_eq!(source.executed_scripts().unwrap(), vec!["CREATE TABLE users (id INT)".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_rejected() {
        let source = MemorySource::new();
        source.record("001_users", "table").unwrap();

        let mut tx = source.begin().await.unwrap();
        let err = tx.exec(INSERT, &params("001_users", "table")).await.unwrap_err();
        assert!(err.to_string().contains("unique constraint"));
        assert!(tx.exec(INSERT, &params("001_users", "index")).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_and_order() {
        let source = MemorySource::new();
        source.exec("CREATE TABLE IF NOT EXISTS migrations ()", &[]).await.unwrap();
        source.record("b", "table").unwrap();
        source.record("a", "table").unwrap();

        let rows = source.scan(SELECT, &[]).await.unwrap();
        assert_eq!(rows[0].get_by_name("name").unwrap().as_str(), Some("b"));
        assert_eq!(rows[1].get_by_index(0).unwrap().as_str(), Some("a"));
        assert!(rows[0].get_by_name("created_at").unwrap().as_datetime() < rows[1].get_by_name("created_at").unwrap().as_datetime());

        assert_eq!(source.exec(DELETE, &params("b", "table")).await.unwrap(), 1);
        assert_eq!(source.history().unwrap(), vec![("a".to_string(), "table".to_string())]);
    }

    #[tokio::test]
    async fn test_rows_share_transaction_time() {
        let source = MemorySource::new();
        source.exec("CREATE TABLE IF NOT EXISTS migrations ()", &[]).await.unwrap();

        let mut tx = source.begin().await.unwrap();
        tx.exec(INSERT, &params("b", "table")).await.unwrap();
        tx.exec(INSERT, &params("a", "table")).await.unwrap();
        tx.commit().await.unwrap();

        let rows = source.scan(SELECT, &[]).await.unwrap();
        assert_eq!(
            rows[0].get_by_name("created_at").unwrap().as_datetime(),
            rows[1].get_by_name("created_at").unwrap().as_datetime()
        );
        assert_eq!(rows[0].get_by_name("name").unwrap().as_str(), Some("a"));
        assert_eq!(rows[1].get_by_name("name").unwrap().as_str(), Some("b"));
    }

    #[tokio::test]
    async fn test_placeholder_style_is_checked() {
        let source = MemorySource::with_dialect(SqlDialect::MySQL);
        source.exec("CREATE TABLE IF NOT EXISTS migrations ()", &[]).await.unwrap();

        assert!(source.exec(INSERT, &params("a", "table")).await.is_err());
        assert!(source
            .exec("INSERT INTO migrations (name, stage) VALUES (?, ?)", &params("a", "table"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_fail_on_pattern() {
        let source = MemorySource::new();
        source.fail_on("DROP").unwrap();

        let mut tx = source.begin().await.unwrap();
        assert!(tx.exec("DROP TABLE users", &[]).await.is_err());
        assert!(tx.exec("CREATE TABLE users (id INT)", &[]).await.is_ok());

        source.clear_failures().unwrap();
        assert!(tx.exec("DROP TABLE users", &[]).await.is_ok());
    }
}
