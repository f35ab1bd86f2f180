//! MySQL Source Implementation
//!
//! Same contract as the PostgreSQL binding; only the placeholder style and
//! the column decoding differ.

use std::sync::Arc;
use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, MySql, Pool, Row, TypeInfo, ValueRef};
use crate::error::{MigrateError, MigrateResult};
use super::core::*;

/// MySQL migration source backed by a sqlx pool
#[derive(Debug, Clone)]
pub struct MySqlSource {
    pool: Arc<Pool<MySql>>,
}

impl MySqlSource {
    /// Create a source over an existing pool
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect to the database at `url`
    pub async fn connect(url: &str) -> MigrateResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .map_err(|e| MigrateError::database(format!("Failed to connect to MySQL: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &Pool<MySql> {
        &self.pool
    }
}

#[async_trait]
impl MigrationSource for MySqlSource {
    async fn exec(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        run_execute(&*self.pool, sql, params).await
    }

    async fn scan(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<Box<dyn DatabaseRow>>> {
        run_fetch_all(&*self.pool, sql, params).await
    }

    async fn begin(&self) -> MigrateResult<Box<dyn SourceTransaction>> {
        let tx = self.pool
            .begin()
            .await
            .map_err(|e| MigrateError::transaction(format!("Failed to begin transaction: {}", e)))?;

        Ok(Box::new(MySqlTransaction { tx: Some(tx) }))
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::MySQL
    }
}

/// MySQL transaction implementation
///
/// MySQL commits DDL implicitly, so a failed `up` only rolls back the history
/// rows and DML written so far.
pub struct MySqlTransaction {
    tx: Option<sqlx::Transaction<'static, MySql>>,
}

impl MySqlTransaction {
    fn inner(&mut self) -> MigrateResult<&mut sqlx::Transaction<'static, MySql>> {
        self.tx.as_mut().ok_or_else(|| MigrateError::transaction("Transaction already completed"))
    }
}

#[async_trait]
impl SourceTransaction for MySqlTransaction {
    async fn exec(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        let tx = self.inner()?;
        run_execute(&mut **tx, sql, params).await
    }

    async fn scan(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<Box<dyn DatabaseRow>>> {
        let tx = self.inner()?;
        run_fetch_all(&mut **tx, sql, params).await
    }

    async fn commit(mut self: Box<Self>) -> MigrateResult<()> {
        let tx = self.tx.take().ok_or_else(|| MigrateError::transaction("Transaction already completed"))?;

        tx.commit()
            .await
            .map_err(|e| MigrateError::transaction(format!("Transaction commit failed: {}", e)))
    }

    async fn rollback(mut self: Box<Self>) -> MigrateResult<()> {
        let tx = self.tx.take().ok_or_else(|| MigrateError::transaction("Transaction already completed"))?;

        tx.rollback()
            .await
            .map_err(|e| MigrateError::transaction(format!("Transaction rollback failed: {}", e)))
    }
}

/// MySQL row implementation
pub struct MySqlSourceRow {
    row: MySqlRow,
}

impl DatabaseRow for MySqlSourceRow {
    fn get_by_index(&self, index: usize) -> MigrateResult<DatabaseValue> {
        mysql_value_to_database_value(&self.row, index)
    }

    fn get_by_name(&self, name: &str) -> MigrateResult<DatabaseValue> {
        let index = self.row
            .columns()
            .iter()
            .position(|col| col.name() == name)
            .ok_or_else(|| MigrateError::database(format!("Column '{}' not found", name)))?;

        mysql_value_to_database_value(&self.row, index)
    }

    fn column_count(&self) -> usize {
        self.row.len()
    }
}

async fn run_execute<'c, E>(executor: E, sql: &'c str, params: &'c [DatabaseValue]) -> MigrateResult<u64>
where
    E: Executor<'c, Database = MySql>,
{
    let result = if params.is_empty() {
        executor.execute(sql).await
    } else {
        bind_all(sqlx::query(sql), params).execute(executor).await
    };

    result
        .map(|done| done.rows_affected())
        .map_err(|e| MigrateError::database(format!("Query execution failed: {}", e)))
}

async fn run_fetch_all<'c, E>(executor: E, sql: &'c str, params: &'c [DatabaseValue]) -> MigrateResult<Vec<Box<dyn DatabaseRow>>>
where
    E: Executor<'c, Database = MySql>,
{
    let rows = bind_all(sqlx::query(sql), params)
        .fetch_all(executor)
        .await
        .map_err(|e| MigrateError::database(format!("Query fetch failed: {}", e)))?;

    Ok(rows
        .into_iter()
        .map(|row| Box::new(MySqlSourceRow { row }) as Box<dyn DatabaseRow>)
        .collect())
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    params: &[DatabaseValue],
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            DatabaseValue::Null => query.bind(Option::<String>::None),
            DatabaseValue::Bool(b) => query.bind(*b),
            DatabaseValue::Int64(i) => query.bind(*i),
            DatabaseValue::String(s) => query.bind(s.clone()),
            DatabaseValue::DateTime(dt) => query.bind(*dt),
            DatabaseValue::Timestamp(ts) => query.bind(*ts),
        };
    }
    query
}

/// Convert a MySQL column value to DatabaseValue
fn mysql_value_to_database_value(row: &MySqlRow, index: usize) -> MigrateResult<DatabaseValue> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| MigrateError::database(format!("Failed to read column {}: {}", index, e)))?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(index).map(DatabaseValue::Bool),
        "TINYINT" | "SMALLINT" | "INT" | "MEDIUMINT" | "BIGINT" => {
            row.try_get::<i64, _>(index).map(DatabaseValue::Int64)
        }
        "TIMESTAMP" => row.try_get::<chrono::DateTime<chrono::Utc>, _>(index).map(DatabaseValue::DateTime),
        "DATETIME" => row.try_get::<chrono::NaiveDateTime, _>(index).map(DatabaseValue::Timestamp),
        _ => row.try_get::<String, _>(index).map(DatabaseValue::String),
    };

    value.map_err(|e| MigrateError::database(format!("Failed to decode {} column {}: {}", type_name, index, e)))
}
