//! Migration engine
//!
//! `Migrator` ties the registry, the history store and a migration source
//! together. Every `up`, `down` and `refresh` call runs in a single
//! transaction: either all selected scripts and their history writes are
//! committed, or none are.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::RwLock;
use crate::backends::{MigrationSource, SourceTransaction};
use crate::config::MigratorConfig;
use crate::create::create_migration_file;
use crate::error::{ExecutionContext, MigrateError, MigrateResult};
use crate::file::{MigrationFile, MAX_NAME_LEN};
use crate::filter::{MigrationFilter, OptionSet};
use crate::fs::FileSystem;
use crate::history::{AppliedSet, HistoryStore, Migrated, Summary};
use crate::registry::{Order, Registry};

/// Staged migration engine
pub struct Migrator {
    source: Arc<dyn MigrationSource>,
    fs: Arc<dyn FileSystem>,
    config: MigratorConfig,
    history: HistoryStore,
    registry: RwLock<Registry>,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("config", &self.config)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl Migrator {
    /// Create a migrator, load the migration files and create the history table
    pub async fn new(
        source: Arc<dyn MigrationSource>,
        fs: Arc<dyn FileSystem>,
        config: MigratorConfig,
    ) -> MigrateResult<Self> {
        config.validate()?;

        let history = HistoryStore::new(config.table.clone(), source.dialect());
        let migrator = Self {
            source,
            fs,
            config,
            history,
            registry: RwLock::new(Registry::default()),
        };

        migrator.load().await?;
        migrator.initialize().await?;
        Ok(migrator)
    }

    /// Rebuild the registry from the file system
    ///
    /// On failure the previously loaded files stay in place.
    pub async fn load(&self) -> MigrateResult<()> {
        let registry = Registry::load(self.fs.as_ref(), &self.config.root, &self.config.extension)?;
        let count = registry.len();

        *self.registry.write().await = registry;
        tracing::debug!("Loaded {} migration files from {}", count, self.config.root.display());
        Ok(())
    }

    /// Create the history table if it does not exist
    pub async fn initialize(&self) -> MigrateResult<()> {
        self.with_deadline(
            "initialize",
            self.config.query_timeout,
            self.history.initialize(self.source.as_ref()),
        )
        .await
    }

    /// Every applied `(stage, name)` pair, oldest first
    pub async fn summary(&self) -> MigrateResult<Summary> {
        self.with_deadline("summary", self.config.query_timeout, self.history.read(self.source.as_ref()))
            .await
    }

    /// Apply pending scripts for `stages`, in stage order then file order
    pub async fn up<S: AsRef<str>>(&self, stages: &[S], filter: &MigrationFilter) -> MigrateResult<Summary> {
        let stages = normalize_stages(stages)?;
        self.reload_if_dev().await?;
        let applied = self.summary().await?.applied_set();

        let registry = self.registry.read().await;
        let files = registry.filter(filter, Order::Ascending);
        if files.is_empty() {
            return Ok(Summary::new());
        }

        let work = async {
            let mut tx = self.begin("up").await?;
            let outcome = async {
                let mut summary = Summary::new();
                for stage in stages.iter() {
                    self.apply_stage(tx.as_mut(), stage, &files, Some(&applied), ExecutionContext::Apply, &mut summary)
                        .await?;
                }
                Ok::<_, MigrateError>(summary)
            }
            .await;
            self.finish("up", tx, outcome).await
        };
        let summary = self.with_deadline("up", self.config.transaction_timeout, work).await?;

        tracing::info!("Applied {} migration scripts", summary.len());
        Ok(summary)
    }

    /// Roll back applied scripts for `stages`, in stage order then reverse file order
    pub async fn down<S: AsRef<str>>(&self, stages: &[S], filter: &MigrationFilter) -> MigrateResult<Summary> {
        let stages = normalize_stages(stages)?;
        self.reload_if_dev().await?;
        let applied = self.summary().await?.applied_set();

        let registry = self.registry.read().await;
        let files = registry.filter(filter, Order::Descending);
        if files.is_empty() || applied.is_empty() {
            return Ok(Summary::new());
        }

        let work = async {
            let mut tx = self.begin("down").await?;
            let outcome = async {
                let mut summary = Summary::new();
                for stage in stages.iter() {
                    self.rollback_stage(tx.as_mut(), stage, &files, &applied, ExecutionContext::Rollback, &mut summary)
                        .await?;
                }
                Ok::<_, MigrateError>(summary)
            }
            .await;
            self.finish("down", tx, outcome).await
        };
        let summary = self.with_deadline("down", self.config.transaction_timeout, work).await?;

        tracing::info!("Rolled back {} migration scripts", summary.len());
        Ok(summary)
    }

    /// Roll back then re-apply `stages`
    ///
    /// Each stage is rolled back over the reversed file list and then applied
    /// over the forward list, all in one transaction. Only the re-applied
    /// pairs are returned.
    pub async fn refresh<S: AsRef<str>>(&self, stages: &[S], filter: &MigrationFilter) -> MigrateResult<Summary> {
        let stages = normalize_stages(stages)?;
        self.reload_if_dev().await?;
        let applied = self.summary().await?.applied_set();

        let registry = self.registry.read().await;
        let forward = registry.filter(filter, Order::Ascending);
        if forward.is_empty() {
            return Ok(Summary::new());
        }
        let reverse: Vec<&MigrationFile> = forward.iter().rev().copied().collect();

        let work = async {
            let mut tx = self.begin("refresh").await?;
            let outcome = async {
                let mut rolled_back = Summary::new();
                let mut summary = Summary::new();
                for stage in stages.iter() {
                    self.rollback_stage(
                        tx.as_mut(),
                        stage,
                        &reverse,
                        &applied,
                        ExecutionContext::RefreshRollback,
                        &mut rolled_back,
                    )
                    .await?;
                    self.apply_stage(tx.as_mut(), stage, &forward, None, ExecutionContext::RefreshApply, &mut summary)
                        .await?;
                }
                tracing::debug!("Refresh rolled back {} scripts", rolled_back.len());
                Ok::<_, MigrateError>(summary)
            }
            .await;
            self.finish("refresh", tx, outcome).await
        };
        let summary = self.with_deadline("refresh", self.config.transaction_timeout, work).await?;

        tracing::info!("Refreshed {} migration scripts", summary.len());
        Ok(summary)
    }

    /// Write a new, empty migration file under the configured root
    pub fn create_file<S: AsRef<str>>(&self, name: &str, stages: &[S]) -> MigrateResult<PathBuf> {
        create_migration_file(&self.config.root, name, &self.config.extension, stages)
    }

    /// Names of the currently loaded migration files, ascending
    pub async fn files(&self) -> Vec<String> {
        let registry = self.registry.read().await;
        registry.files().iter().map(|file| file.name().to_string()).collect()
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn extension(&self) -> &str {
        &self.config.extension
    }

    /// Check if files are reloaded before every operation
    pub fn is_dev(&self) -> bool {
        self.config.is_dev()
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    async fn reload_if_dev(&self) -> MigrateResult<()> {
        if self.is_dev() {
            self.load().await?;
        }
        Ok(())
    }

    /// Apply one stage of `files` in order
    ///
    /// With `applied` set, pairs already in the history are skipped.
    async fn apply_stage(
        &self,
        tx: &mut dyn SourceTransaction,
        stage: &str,
        files: &[&MigrationFile],
        applied: Option<&AppliedSet>,
        context: fn(String) -> ExecutionContext,
        summary: &mut Summary,
    ) -> MigrateResult<()> {
        for file in files {
            if applied.is_some_and(|applied| applied.contains(file.name(), stage)) {
                continue;
            }
            let Some(script) = file.up_script(stage) else {
                continue;
            };

            self.apply_script(tx, file.name(), stage, script)
                .await
                .map_err(|e| e.in_context(context(file.name().to_string())))?;

            tracing::debug!("Applied {} ({})", file.name(), stage);
            summary.push(Migrated {
                stage: stage.to_string(),
                name: file.name().to_string(),
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    /// Roll back one stage of `files`, which must already be in reverse order
    async fn rollback_stage(
        &self,
        tx: &mut dyn SourceTransaction,
        stage: &str,
        files: &[&MigrationFile],
        applied: &AppliedSet,
        context: fn(String) -> ExecutionContext,
        summary: &mut Summary,
    ) -> MigrateResult<()> {
        for file in files {
            if !applied.contains(file.name(), stage) {
                continue;
            }
            let Some(script) = file.down_script(stage) else {
                continue;
            };

            self.rollback_script(tx, file.name(), stage, script)
                .await
                .map_err(|e| e.in_context(context(file.name().to_string())))?;

            tracing::debug!("Rolled back {} ({})", file.name(), stage);
            summary.push(Migrated {
                stage: stage.to_string(),
                name: file.name().to_string(),
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn apply_script(&self, tx: &mut dyn SourceTransaction, name: &str, stage: &str, script: &str) -> MigrateResult<()> {
        if !script.is_empty() {
            tx.exec(script, &[]).await?;
        }
        self.history.record(tx, name, stage).await
    }

    async fn rollback_script(&self, tx: &mut dyn SourceTransaction, name: &str, stage: &str, script: &str) -> MigrateResult<()> {
        if !script.is_empty() {
            tx.exec(script, &[]).await?;
        }
        self.history.remove(tx, name, stage).await
    }

    async fn begin(&self, operation: &str) -> MigrateResult<Box<dyn SourceTransaction>> {
        let tx = self.source.begin().await?;
        tracing::debug!("Began {} transaction", operation);
        Ok(tx)
    }

    /// Commit `tx` if `outcome` succeeded, roll it back otherwise
    async fn finish<T>(
        &self,
        operation: &str,
        tx: Box<dyn SourceTransaction>,
        outcome: MigrateResult<T>,
    ) -> MigrateResult<T> {
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                tracing::debug!("Committed {} transaction", operation);
                Ok(value)
            }
            Err(e) => {
                match tx.rollback().await {
                    Ok(()) => tracing::debug!("Rolled back {} transaction: {}", operation, e),
                    Err(rollback) => tracing::warn!("Failed to roll back {} transaction: {}", operation, rollback),
                }
                Err(e)
            }
        }
    }

    /// Bound `work` by `after`; a transaction still open inside it is dropped
    /// on expiry, which rolls it back
    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        after: Duration,
        work: impl Future<Output = MigrateResult<T>>,
    ) -> MigrateResult<T> {
        match tokio::time::timeout(after, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", operation, after);
                Err(MigrateError::Timeout { operation, after })
            }
        }
    }
}

/// Deduplicate and validate the requested stages, keeping their order
fn normalize_stages<S: AsRef<str>>(stages: &[S]) -> MigrateResult<OptionSet> {
    let stages: OptionSet = stages.iter().map(|s| s.as_ref().to_string()).collect();
    if stages.is_empty() {
        return Err(MigrateError::configuration("At least one stage is required"));
    }

    for stage in stages.iter() {
        if stage.trim().is_empty() || stage.chars().count() > MAX_NAME_LEN {
            return Err(MigrateError::configuration(format!("Invalid stage name '{}'", stage)));
        }
    }

    Ok(stages)
}
