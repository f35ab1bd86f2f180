//! Migration file creation
//!
//! New files are named `<timestamp>_<slug>.<ext>` so that name order follows
//! creation order, and contain an empty `up` and `down` block per stage.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use crate::error::{MigrateError, MigrateResult};
use crate::file::MAX_NAME_LEN;
use crate::filter::OptionSet;

static NON_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\s\-]").expect("slug filter pattern is valid"));

static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-]+").expect("slug separator pattern is valid"));

static STAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,100}$").expect("stage pattern is valid"));

/// Turn free text into a file-name friendly slug
///
/// Only ASCII letters and digits are kept; runs of whitespace and hyphens
/// become a single `-`.
pub fn slugify(text: &str) -> String {
    let kept = NON_SLUG.replace_all(text.trim(), "");
    let slug = SEPARATORS.replace_all(&kept.to_lowercase(), "-").into_owned();
    slug.trim_matches('-').to_string()
}

/// Render the contents of a new migration file
pub fn migration_template(name: &str, stages: &OptionSet) -> String {
    let mut content = format!(
        "-- Migration: {}\n-- Created: {}\n",
        name,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );

    for stage in stages.iter() {
        content.push_str(&format!("\n-- {{ up: {} }}\n\n", stage));
        content.push_str(&format!("\n-- {{ down: {} }}\n\n", stage));
    }

    content
}

/// Create an empty migration file under `root`
///
/// `name` may carry a relative directory (`billing/create invoices`); only
/// its last component is slugified. Existing files are never overwritten.
pub fn create_migration_file<S: AsRef<str>>(
    root: impl AsRef<Path>,
    name: &str,
    extension: &str,
    stages: &[S],
) -> MigrateResult<PathBuf> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MigrateError::configuration("Migration name must not be empty"));
    }

    let stages: OptionSet = stages.iter().map(|s| s.as_ref().trim().to_string()).collect();
    if stages.is_empty() {
        return Err(MigrateError::configuration("At least one stage is required to create a migration"));
    }
    if let Some(stage) = stages.iter().find(|stage| !STAGE.is_match(stage)) {
        return Err(MigrateError::configuration(format!("Invalid stage name '{}'", stage)));
    }

    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        return Err(MigrateError::configuration("Migration file extension must not be empty"));
    }

    let relative = Path::new(name);
    let base = relative
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MigrateError::configuration(format!("Invalid migration name '{}'", name)))?;
    let dir = match relative.parent() {
        Some(parent) if parent.is_absolute() => {
            return Err(MigrateError::configuration("Migration name must be a relative path"));
        }
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::new(),
    };

    let slug = slugify(base);
    if slug.is_empty() {
        return Err(MigrateError::configuration(format!(
            "Migration name '{}' has no usable characters",
            base
        )));
    }

    let stem = format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S"), slug);
    if stem.len() > MAX_NAME_LEN {
        return Err(MigrateError::InvalidName {
            name: stem,
            reason: format!("name is longer than {} characters", MAX_NAME_LEN),
        });
    }

    let dir = root.as_ref().join(dir);
    fs::create_dir_all(&dir).map_err(|e| MigrateError::io(&dir, e))?;

    let path = dir.join(format!("{}.{}", stem, extension));
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| MigrateError::io(&path, e))?;
    file.write_all(migration_template(base, &stages).as_bytes())
        .map_err(|e| MigrateError::io(&path, e))?;

    tracing::info!("Created migration file {}", path.display());
    Ok(path)
}
