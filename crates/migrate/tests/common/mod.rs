//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use stagehand_migrate::{Environment, MemoryFs, MemorySource, Migrator, MigratorConfig};

pub const ROOT: &str = "db";

/// A file with a `table` and an `index` stage, both reversible
pub fn two_stage(table: &str) -> String {
    format!(
        "-- {{ up: table }}\nCREATE TABLE {t} (id BIGINT);\n\
         -- {{ down: table }}\nDROP TABLE {t};\n\
         -- {{ up: index }}\nCREATE INDEX {t}_id ON {t} (id);\n\
         -- {{ down: index }}\nDROP INDEX {t}_id;\n",
        t = table
    )
}

pub fn path(name: &str) -> String {
    format!("{}/{}.sql", ROOT, name)
}

/// Install `files` as `(name, content)` pairs
pub fn fs_with(files: &[(&str, String)]) -> Arc<MemoryFs> {
    let fs = Arc::new(MemoryFs::new());
    for (name, content) in files {
        fs.insert(path(name), content.clone());
    }
    fs
}

/// Three two-stage files `001_a`, `002_b` and `003_c`
pub fn abc() -> Arc<MemoryFs> {
    fs_with(&[
        ("001_a", two_stage("a")),
        ("002_b", two_stage("b")),
        ("003_c", two_stage("c")),
    ])
}

pub fn config(environment: Environment) -> MigratorConfig {
    MigratorConfig::new().with_root(ROOT).with_environment(environment)
}

pub async fn migrator(source: &MemorySource, fs: Arc<MemoryFs>) -> Migrator {
    migrator_with(source, fs, config(Environment::Production)).await
}

pub async fn migrator_with(source: &MemorySource, fs: Arc<MemoryFs>, config: MigratorConfig) -> Migrator {
    Migrator::new(Arc::new(source.clone()), fs, config)
        .await
        .expect("migrator should initialize")
}

/// `(name, stage)` pairs of a summary or history, in order
pub fn pairs<'a>(entries: impl IntoIterator<Item = &'a stagehand_migrate::Migrated>) -> Vec<(String, String)> {
    entries
        .into_iter()
        .map(|m| (m.name.clone(), m.stage.clone()))
        .collect()
}

pub fn pair(name: &str, stage: &str) -> (String, String) {
    (name.to_string(), stage.to_string())
}
