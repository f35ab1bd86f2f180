//! File system access for migration discovery
//!
//! The registry never touches `std::fs` directly. It asks a [`FileSystem`] for
//! the files under a root whose name matches a pattern, then reads each one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use regex::Regex;
use crate::error::{MigrateError, MigrateResult};

/// Read-only file lookup used by the registry
pub trait FileSystem: Send + Sync {
    /// List the files under `root`, recursively, whose file name matches `pattern`
    fn lookup(&self, root: &Path, pattern: &Regex) -> MigrateResult<Vec<PathBuf>>;

    /// Read the full contents of a file
    fn read_file(&self, path: &Path) -> MigrateResult<Vec<u8>>;
}

/// Operating system file system
///
/// Relative roots are resolved against `base` when one is set, otherwise
/// against the working directory. A missing root yields no files.
#[derive(Debug, Clone, Default)]
pub struct DirFs {
    base: Option<PathBuf>,
}

impl DirFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative roots against `base`
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: Some(base.into()) }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn walk(&self, dir: &Path, pattern: &Regex, found: &mut Vec<PathBuf>) -> MigrateResult<()> {
        let entries = fs::read_dir(dir).map_err(|e| MigrateError::io(dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| MigrateError::io(dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| MigrateError::io(&path, e))?;

            if file_type.is_dir() {
                self.walk(&path, pattern, found)?;
            } else if entry.file_name().to_str().is_some_and(|name| pattern.is_match(name)) {
                found.push(path);
            }
        }

        Ok(())
    }
}

impl FileSystem for DirFs {
    fn lookup(&self, root: &Path, pattern: &Regex) -> MigrateResult<Vec<PathBuf>> {
        let root = self.resolve(root);
        if !root.exists() {
            tracing::debug!("Migrations root {} does not exist", root.display());
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        self.walk(&root, pattern, &mut found)?;
        found.sort();
        Ok(found)
    }

    fn read_file(&self, path: &Path) -> MigrateResult<Vec<u8>> {
        let path = self.resolve(path);
        fs::read(&path).map_err(|e| MigrateError::io(path, e))
    }
}

/// In-memory file system
///
/// Files can be added and removed through a shared reference so tests can
/// change the tree underneath a running migrator.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(path.into(), content.into());
    }

    /// Remove a file, returning whether it existed
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.remove(path.as_ref()).is_some()
    }
}

impl FileSystem for MemoryFs {
    fn lookup(&self, root: &Path, pattern: &Regex) -> MigrateResult<Vec<PathBuf>> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let match_all = root.as_os_str().is_empty() || root == Path::new(".");

        Ok(files
            .keys()
            .filter(|path| match_all || path.starts_with(root))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| pattern.is_match(name))
            })
            .cloned()
            .collect())
    }

    fn read_file(&self, path: &Path) -> MigrateResult<Vec<u8>> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.get(path).cloned().ok_or_else(|| {
            MigrateError::io(path, std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sql_pattern() -> Regex {
        Regex::new(r"\.sql$").unwrap()
    }

    #[test]
    fn test_dir_fs_walks_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("billing")).unwrap();
        fs::write(root.join("002_posts.sql"), "-- { up: table }").unwrap();
        fs::write(root.join("001_users.sql"), "-- { up: table }").unwrap();
        fs::write(root.join("billing/003_invoices.sql"), "-- { up: table }").unwrap();
        fs::write(root.join("README.md"), "notes").unwrap();

        let fs = DirFs::new();
        let found = fs.lookup(root, &sql_pattern()).unwrap();
        assert_eq!(
            found,
            vec![
                root.join("001_users.sql"),
                root.join("002_posts.sql"),
                root.join("billing/003_invoices.sql"),
            ]
        );
        assert_eq!(fs.read_file(&found[0]).unwrap(), b"-- { up: table }");
    }

    #[test]
    fn test_dir_fs_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let fs = DirFs::with_base(temp_dir.path());
        assert!(fs.lookup(Path::new("missing"), &sql_pattern()).unwrap().is_empty());
    }

    #[test]
    fn test_dir_fs_read_error_carries_path() {
        let temp_dir = TempDir::new().unwrap();
        let fs = DirFs::with_base(temp_dir.path());
        let err = fs.read_file(Path::new("nope.sql")).unwrap_err();
        assert!(matches!(err, MigrateError::Io { .. }));
        assert!(err.to_string().contains("nope.sql"));
    }

    #[test]
    fn test_memory_fs_lookup() {
        let fs = MemoryFs::new();
        fs.insert("db/001_users.sql", "a");
        fs.insert("db/nested/002_posts.sql", "b");
        fs.insert("other/003_tags.sql", "c");
        fs.insert("db/notes.txt", "d");

        let found = fs.lookup(Path::new("db"), &sql_pattern()).unwrap();
        assert_eq!(
            found,
            vec![PathBuf::from("db/001_users.sql"), PathBuf::from("db/nested/002_posts.sql")]
        );
        assert_eq!(fs.lookup(Path::new("."), &sql_pattern()).unwrap().len(), 3);

        assert!(fs.remove("db/001_users.sql"));
        assert!(fs.read_file(Path::new("db/001_users.sql")).is_err());
    }
}
