//! PostgreSQL Source Implementation
//!
//! Binds the [`MigrationSource`] traits to sqlx's PostgreSQL driver. Scripts
//! without parameters go through the simple query protocol so a single
//! migration block may hold several statements.

use std::sync::Arc;
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Pool, Postgres, Row, TypeInfo, ValueRef};
use crate::error::{MigrateError, MigrateResult};
use super::core::*;

/// PostgreSQL migration source backed by a sqlx pool
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: Arc<Pool<Postgres>>,
}

impl PostgresSource {
    /// Create a source over an existing pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect to the database at `url`
    pub async fn connect(url: &str) -> MigrateResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .map_err(|e| MigrateError::database(format!("Failed to connect to PostgreSQL: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MigrationSource for PostgresSource {
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

        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }
}

/// PostgreSQL transaction implementation
pub struct PostgresTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn inner(&mut self) -> MigrateResult<&mut sqlx::Transaction<'static, Postgres>> {
        self.tx.as_mut().ok_or_else(|| MigrateError::transaction("Transaction already completed"))
    }
}

#[async_trait]
impl SourceTransaction for PostgresTransaction {
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

/// PostgreSQL row implementation
pub struct PostgresRow {
    row: PgRow,
}

impl DatabaseRow for PostgresRow {
    fn get_by_index(&self, index: usize) -> MigrateResult<DatabaseValue> {
        postgres_value_to_database_value(&self.row, index)
    }

    fn get_by_name(&self, name: &str) -> MigrateResult<DatabaseValue> {
        let index = self.row
            .columns()
            .iter()
            .position(|col| col.name() == name)
            .ok_or_else(|| MigrateError::database(format!("Column '{}' not found", name)))?;

        postgres_value_to_database_value(&self.row, index)
    }

    fn column_count(&self) -> usize {
        self.row.len()
    }
}

async fn run_execute<'c, E>(executor: E, sql: &'c str, params: &'c [DatabaseValue]) -> MigrateResult<u64>
where
    E: Executor<'c, Database = Postgres>,
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
    E: Executor<'c, Database = Postgres>,
{
    let rows = bind_all(sqlx::query(sql), params)
        .fetch_all(executor)
        .await
        .map_err(|e| MigrateError::database(format!("Query fetch failed: {}", e)))?;

    Ok(rows
        .into_iter()
        .map(|row| Box::new(PostgresRow { row }) as Box<dyn DatabaseRow>)
        .collect())
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &[DatabaseValue],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
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

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> MigrateResult<DatabaseValue> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| MigrateError::database(format!("Failed to read column {}: {}", index, e)))?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index).map(DatabaseValue::Bool),
        "INT2" => row.try_get::<i16, _>(index).map(|v| DatabaseValue::Int64(v as i64)),
        "INT4" => row.try_get::<i32, _>(index).map(|v| DatabaseValue::Int64(v as i64)),
        "INT8" => row.try_get::<i64, _>(index).map(DatabaseValue::Int64),
        "TIMESTAMP" => row.try_get::<chrono::NaiveDateTime, _>(index).map(DatabaseValue::Timestamp),
        "TIMESTAMPTZ" => row.try_get::<chrono::DateTime<chrono::Utc>, _>(index).map(DatabaseValue::DateTime),
        _ => row.try_get::<String, _>(index).map(DatabaseValue::String),
    };

    value.map_err(|e| MigrateError::database(format!("Failed to decode {} column {}: {}", type_name, index, e)))
}
