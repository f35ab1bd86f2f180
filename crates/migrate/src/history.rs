//! Migration history
//!
//! Applied `(name, stage)` pairs are kept in a single table reached through a
//! [`MigrationSource`]. Rows are inserted when a script is applied and deleted
//! when it is rolled back; `created_at` is assigned by the database.

use std::collections::HashSet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::backends::{DatabaseRow, MigrationSource, SourceTransaction, SqlDialect};
use crate::error::{MigrateError, MigrateResult};

/// One applied `(stage, name)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migrated {
    pub stage: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Ordered list of applied or rolled-back pairs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Summary(Vec<Migrated>);

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, migrated: Migrated) {
        self.0.push(migrated);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Migrated> {
        self.0.iter()
    }

    /// Group entries by stage
    ///
    /// Stages appear in order of their first entry and entries keep their
    /// relative order within a stage.
    pub fn group_by_stage(&self) -> Vec<(&str, Vec<&Migrated>)> {
        let mut groups: Vec<(&str, Vec<&Migrated>)> = Vec::new();
        for migrated in &self.0 {
            match groups.iter_mut().find(|(stage, _)| *stage == migrated.stage) {
                Some((_, entries)) => entries.push(migrated),
                None => groups.push((migrated.stage.as_str(), vec![migrated])),
            }
        }
        groups
    }

    /// Membership set keyed by `(name, stage)`
    pub fn applied_set(&self) -> AppliedSet {
        AppliedSet(
            self.0
                .iter()
                .map(|m| (m.name.clone(), m.stage.clone()))
                .collect(),
        )
    }

    pub fn into_inner(self) -> Vec<Migrated> {
        self.0
    }
}

impl From<Vec<Migrated>> for Summary {
    fn from(entries: Vec<Migrated>) -> Self {
        Self(entries)
    }
}

impl IntoIterator for Summary {
    type Item = Migrated;
    type IntoIter = std::vec::IntoIter<Migrated>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Summary {
    type Item = &'a Migrated;
    type IntoIter = std::slice::Iter<'a, Migrated>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Constant-time lookup of applied pairs
#[derive(Debug, Clone, Default)]
pub struct AppliedSet(HashSet<(String, String)>);

impl AppliedSet {
    pub fn contains(&self, name: &str, stage: &str) -> bool {
        // HashSet<(String, String)> cannot be probed with borrowed tuples.
        self.0.contains(&(name.to_string(), stage.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// SQL access to the history table
#[derive(Debug, Clone)]
pub struct HistoryStore {
    table: String,
    dialect: SqlDialect,
}

impl HistoryStore {
    /// The table name must already be a validated identifier
    pub fn new(table: impl Into<String>, dialect: SqlDialect) -> Self {
        Self {
            table: table.into(),
            dialect,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
             name VARCHAR(100) NOT NULL,\n    \
             stage VARCHAR(100) NOT NULL,\n    \
             created_at TIMESTAMP DEFAULT {},\n    \
             PRIMARY KEY (name, stage)\n)",
            self.table,
            self.dialect.current_timestamp()
        )
    }

    /// Rows inserted by one transaction share `created_at` (PostgreSQL's
    /// `NOW()` is the transaction start, MySQL's `TIMESTAMP` has whole
    /// seconds), so ties are ordered by name then stage.
    pub fn select_sql(&self) -> String {
        format!(
            "SELECT name, stage, created_at FROM {} ORDER BY created_at ASC, name ASC, stage ASC",
            self.table
        )
    }

    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (name, stage) VALUES ({}, {})",
            self.table,
            self.dialect.parameter_placeholder(0),
            self.dialect.parameter_placeholder(1)
        )
    }

    pub fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE name = {} AND stage = {}",
            self.table,
            self.dialect.parameter_placeholder(0),
            self.dialect.parameter_placeholder(1)
        )
    }

    /// Create the history table if it does not exist
    pub async fn initialize(&self, source: &dyn MigrationSource) -> MigrateResult<()> {
        source.exec(&self.create_table_sql(), &[]).await?;
        tracing::debug!("History table '{}' is ready", self.table);
        Ok(())
    }

    /// Read every applied pair, oldest first
    pub async fn read(&self, source: &dyn MigrationSource) -> MigrateResult<Summary> {
        let rows = source.scan(&self.select_sql(), &[]).await?;
        rows.iter().map(|row| migrated_from_row(&**row)).collect::<MigrateResult<Vec<_>>>().map(Summary)
    }

    /// Record `(name, stage)` as applied within `tx`
    pub async fn record(&self, tx: &mut dyn SourceTransaction, name: &str, stage: &str) -> MigrateResult<()> {
        tx.exec(&self.insert_sql(), &[name.into(), stage.into()]).await?;
        Ok(())
    }

    /// Remove `(name, stage)` from the history within `tx`
    pub async fn remove(&self, tx: &mut dyn SourceTransaction, name: &str, stage: &str) -> MigrateResult<()> {
        let affected = tx.exec(&self.delete_sql(), &[name.into(), stage.into()]).await?;
        if affected == 0 {
            tracing::warn!("No history row for {} ({}) to remove", name, stage);
        }
        Ok(())
    }
}

fn migrated_from_row(row: &dyn DatabaseRow) -> MigrateResult<Migrated> {
    let text = |column: &str| -> MigrateResult<String> {
        row.get_by_name(column)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MigrateError::database(format!("History column '{}' is not text", column)))
    };

    let created_at = row
        .get_by_name("created_at")?
        .as_datetime()
        .ok_or_else(|| MigrateError::database("History column 'created_at' is not a timestamp"))?;

    Ok(Migrated {
        stage: text("stage")?,
        name: text("name")?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::backends::MemorySource;

    fn migrated(stage: &str, name: &str, second: u32) -> Migrated {
        Migrated {
            stage: stage.to_string(),
            name: name.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap(),
        }
    }

    #[test]
    fn test_sql_uses_dialect() {
        let pg = HistoryStore::new("migrations", SqlDialect::PostgreSQL);
        assert_eq!(pg.insert_sql(), "INSERT INTO migrations (name, stage) VALUES ($1, $2)");
        assert_eq!(pg.delete_sql(), "DELETE FROM migrations WHERE name = $1 AND stage = $2");
        assert!(pg.create_table_sql().contains("DEFAULT NOW()"));
        assert!(pg.create_table_sql().contains("PRIMARY KEY (name, stage)"));

        let mysql = HistoryStore::new("schema_history", SqlDialect::MySQL);
        assert_eq!(mysql.insert_sql(), "INSERT INTO schema_history (name, stage) VALUES (?, ?)");
        assert!(mysql.create_table_sql().contains("DEFAULT CURRENT_TIMESTAMP"));
        assert!(mysql.select_sql().starts_with("SELECT name, stage, created_at FROM schema_history"));
        assert!(mysql.select_sql().ends_with("ORDER BY created_at ASC, name ASC, stage ASC"));
    }

    #[test]
    fn test_group_by_stage_preserves_order() {
        let summary = Summary::from(vec![
            migrated("table", "001", 0),
            migrated("index", "001", 1),
            migrated("table", "002", 2),
        ]);

        let groups = summary.group_by_stage();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "table");
        assert_eq!(groups[0].1.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(), vec!["001", "002"]);
        assert_eq!(groups[1].0, "index");
    }

    #[test]
    fn test_applied_set() {
        let summary = Summary::from(vec![migrated("table", "001", 0)]);
        let applied = summary.applied_set();
        assert!(applied.contains("001", "table"));
        assert!(!applied.contains("001", "index"));
        assert_eq!(applied.len(), 1);
    }

    #[test]
    fn test_summary_serializes_as_list() {
        let summary = Summary::from(vec![migrated("table", "001", 0)]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json[0]["stage"], "table");
        assert_eq!(json[0]["name"], "001");
        assert_eq!(json[0]["created_at"], "2024-05-01T12:00:00Z");
    }

    #[tokio::test]
    async fn test_record_read_remove() {
        let source = MemorySource::new();
        let store = HistoryStore::new("migrations", source.dialect());
        store.initialize(&source).await.unwrap();
        assert!(store.read(&source).await.unwrap().is_empty());

        let mut tx = source.begin().await.unwrap();
        store.record(tx.as_mut(), "001_users", "table").await.unwrap();
        store.record(tx.as_mut(), "001_users", "index").await.unwrap();
        tx.commit().await.unwrap();

        let summary = store.read(&source).await.unwrap();
        assert_eq!(
            summary.iter().map(|m| (m.name.as_str(), m.stage.as_str())).collect::<Vec<_>>(),
            vec![("001_users", "table"), ("001_users", "index")]
        );

        let mut tx = source.begin().await.unwrap();
        store.remove(tx.as_mut(), "001_users", "table").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.read(&source).await.unwrap().len(), 1);
    }
}
