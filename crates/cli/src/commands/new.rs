use std::path::{Path, PathBuf};
use anyhow::{bail, Context};
use console::style;
use stagehand_migrate::create_migration_file;

/// Create an empty migration file for `stages` under `root`
pub fn create(root: &Path, name: &str, extension: &str, stages: &[String]) -> anyhow::Result<PathBuf> {
    if stages.is_empty() {
        bail!("no stages given; pass --stage or set MIGRATIONS_STAGES");
    }

    let path = create_migration_file(root, name, extension, stages)
        .with_context(|| format!("failed to create migration '{}'", name))?;

    println!(
        "{} {}",
        style("Create").green().bold(),
        style(format!("\"{}\" migration file created", path.display())).italic()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_writes_into_root() {
        let temp_dir = TempDir::new().unwrap();
        let path = create(temp_dir.path(), "add users", "sql", &["table".to_string()]).unwrap();

        assert!(path.starts_with(temp_dir.path()));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("-- { up: table }"));
        assert!(content.contains("-- { down: table }"));
    }

    #[test]
    fn test_create_requires_stages() {
        let temp_dir = TempDir::new().unwrap();
        assert!(create(temp_dir.path(), "add users", "sql", &[]).is_err());
    }
}
