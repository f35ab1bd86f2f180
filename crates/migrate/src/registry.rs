//! Migration file registry
//!
//! A registry is an immutable snapshot of the parsed migration files under a
//! root, sorted by canonical name. Reloading builds a new snapshot; the caller
//! swaps it in only once discovery and parsing have fully succeeded.

use std::collections::HashMap;
use std::path::Path;
use regex::Regex;
use crate::error::{MigrateError, MigrateResult};
use crate::file::MigrationFile;
use crate::filter::MigrationFilter;
use crate::fs::FileSystem;

/// Iteration order for [`Registry::filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending by name, used to apply
    Ascending,
    /// Descending by name, used to roll back
    Descending,
}

/// Sorted snapshot of migration files
#[derive(Debug, Clone, Default)]
pub struct Registry {
    files: Vec<MigrationFile>,
}

impl Registry {
    /// Discover and parse every file under `root` with the given extension
    pub fn load(fs: &dyn FileSystem, root: &Path, extension: &str) -> MigrateResult<Self> {
        let pattern = extension_pattern(extension)?;
        let paths = fs.lookup(root, &pattern)?;

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs.read_file(&path)?;
            let content = String::from_utf8(bytes).map_err(|e| {
                MigrateError::io(
                    &path,
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e.utf8_error()),
                )
            })?;

            let file = MigrationFile::parse(&path, &content)?;
            if file.is_empty() {
                tracing::debug!("Skipping {}: no migration blocks", path.display());
                continue;
            }
            files.push(file);
        }

        Self::from_files(files)
    }

    /// Build a registry from parsed files, rejecting duplicate names
    pub fn from_files(mut files: Vec<MigrationFile>) -> MigrateResult<Self> {
        let mut seen: HashMap<&str, &Path> = HashMap::with_capacity(files.len());
        for file in &files {
            if let Some(first) = seen.insert(file.name(), file.path()) {
                return Err(MigrateError::DuplicateName {
                    name: file.name().to_string(),
                    first: first.to_path_buf(),
                    second: file.path().to_path_buf(),
                });
            }
        }

        files.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(Self { files })
    }

    /// Files selected by `filter`, in the requested order
    pub fn filter(&self, filter: &MigrationFilter, order: Order) -> Vec<&MigrationFile> {
        let selected = self.files.iter().filter(|file| filter.allows(file.name()));
        match order {
            Order::Ascending => selected.collect(),
            Order::Descending => selected.rev().collect(),
        }
    }

    /// Every file, descending by name
    pub fn reverse(&self) -> Vec<&MigrationFile> {
        self.files.iter().rev().collect()
    }

    pub fn files(&self) -> &[MigrationFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn extension_pattern(extension: &str) -> MigrateResult<Regex> {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        return Err(MigrateError::configuration("Migration file extension must not be empty"));
    }

    Regex::new(&format!(r"^.+\.{}$", regex::escape(extension)))
        .map_err(|e| MigrateError::configuration(format!("Invalid extension pattern: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::fs::MemoryFs;

    fn fixture() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.insert("db/003_tags.sql", "-- { up: table }\nCREATE TABLE tags ();");
        fs.insert("db/001_users.sql", "-- { up: table }\nCREATE TABLE users ();");
        fs.insert("db/nested/002_posts.sql", "-- { up: table }\nCREATE TABLE posts ();");
        fs.insert("db/004_notes.sql", "-- nothing here");
        fs.insert("db/005_other.txt", "-- { up: table }\nSELECT 1;");
        fs
    }

    fn names(files: Vec<&MigrationFile>) -> Vec<&str> {
        files.into_iter().map(|f| f.name()).collect()
    }

    #[test]
    fn test_load_sorts_and_drops_empty_files() {
        let registry = Registry::load(&fixture(), Path::new("db"), "sql").unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(
            names(registry.filter(&MigrationFilter::new(), Order::Ascending)),
            vec!["001_users", "002_posts", "003_tags"]
        );
        assert_eq!(
            names(registry.filter(&MigrationFilter::new(), Order::Descending)),
            vec!["003_tags", "002_posts", "001_users"]
        );
        assert_eq!(names(registry.reverse()), vec!["003_tags", "002_posts", "001_users"]);
    }

    #[test]
    fn test_extension_is_literal() {
        let fs = MemoryFs::new();
        fs.insert("a.sql", "-- { up: t }\nSELECT 1;");
        fs.insert("bsql", "-- { up: t }\nSELECT 1;");
        let registry = Registry::load(&fs, Path::new("."), ".sql").unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let fs = MemoryFs::new();
        fs.insert("db/a/001_users.sql", "-- { up: table }\nSELECT 1;");
        fs.insert("db/b/001_users.sql", "-- { up: table }\nSELECT 2;");

        let err = Registry::load(&fs, Path::new("db"), "sql").unwrap_err();
        match err {
            MigrateError::DuplicateName { name, first, second } => {
                assert_eq!(name, "001_users");
                assert_eq!(first, PathBuf::from("db/a/001_users.sql"));
                assert_eq!(second, PathBuf::from("db/b/001_users.sql"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_filter_applies_before_order() {
        let registry = Registry::load(&fixture(), Path::new("db"), "sql").unwrap();
        let filter = MigrationFilter::new()
            .only_files(["001_users", "003_tags"])
            .skip_files(["001_users"]);
        assert_eq!(names(registry.filter(&filter, Order::Descending)), vec!["003_tags"]);
    }

    #[test]
    fn test_invalid_utf8_fails_load() {
        let fs = MemoryFs::new();
        fs.insert("001_bad.sql", vec![0xff, 0xfe]);
        assert!(matches!(
            Registry::load(&fs, Path::new("."), "sql").unwrap_err(),
            MigrateError::Io { .. }
        ));
    }
}
