//! Migration file model
//!
//! A migration document is split into blocks by annotation lines:
//!
//! ```sql
//! -- { up: table }
//! CREATE TABLE users (id BIGINT PRIMARY KEY);
//!
//! -- { down: table }
//! DROP TABLE users;
//! ```
//!
//! The direction is `up` or `down` (any case) and the stage is made of
//! letters, digits, `_` and `-`. A line that starts with `-- {` but does not
//! match opens an inert block whose body is ignored, as is any text before the
//! first annotation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use once_cell::sync::Lazy;
use regex::Regex;
use crate::error::{MigrateError, MigrateResult};

/// Maximum length of a file name or stage, matching the history columns
pub const MAX_NAME_LEN: usize = 100;

static ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^--\s*\{\s*(?i:(up|down))\s*:\s*([A-Za-z0-9_-]{1,100})\s*\}\s*$")
        .expect("annotation pattern is valid")
});

static ANNOTATION_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^--\s*\{").expect("annotation prefix pattern is valid"));

/// Direction of a script block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// The up and down scripts declared for one stage
///
/// `None` means the direction was never declared for the stage. `Some("")`
/// is a declared no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageScripts {
    pub up: Option<String>,
    pub down: Option<String>,
}

impl StageScripts {
    fn slot(&mut self, direction: Direction) -> &mut Option<String> {
        match direction {
            Direction::Up => &mut self.up,
            Direction::Down => &mut self.down,
        }
    }
}

/// A parsed migration document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    name: String,
    path: PathBuf,
    stages: BTreeMap<String, StageScripts>,
}

impl MigrationFile {
    /// Parse `content` read from `path`; the canonical name is the file stem
    pub fn parse(path: impl AsRef<Path>, content: &str) -> MigrateResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MigrateError::InvalidName {
                name: path.display().to_string(),
                reason: "file name is not valid UTF-8".to_string(),
            })?;

        Self::from_source(name, path, content)
    }

    /// Build a file from an explicit canonical name
    pub fn from_source(name: &str, path: impl Into<PathBuf>, content: &str) -> MigrateResult<Self> {
        validate_name(name)?;

        Ok(Self {
            name: name.to_string(),
            path: path.into(),
            stages: parse_blocks(content),
        })
    }

    /// Canonical name, unique within a registry
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the file was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Script to run when applying `stage`
    pub fn up_script(&self, stage: &str) -> Option<&str> {
        self.stages.get(stage).and_then(|s| s.up.as_deref())
    }

    /// Script to run when rolling back `stage`
    pub fn down_script(&self, stage: &str) -> Option<&str> {
        self.stages.get(stage).and_then(|s| s.down.as_deref())
    }

    /// Stages declared by this file, sorted by name
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    /// Check if the file declared no recognized block
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

fn validate_name(name: &str) -> MigrateResult<()> {
    if name.is_empty() {
        return Err(MigrateError::InvalidName {
            name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(MigrateError::InvalidName {
            name: name.to_string(),
            reason: format!("name is longer than {} characters", MAX_NAME_LEN),
        });
    }

    Ok(())
}

/// Parse an annotation line into its direction and stage
fn parse_annotation(line: &str) -> Option<(Direction, &str)> {
    let captures = ANNOTATION.captures(line)?;
    let direction = if captures[1].eq_ignore_ascii_case("up") {
        Direction::Up
    } else {
        Direction::Down
    };
    let stage = captures.get(2)?.as_str();
    Some((direction, stage))
}

fn parse_blocks(content: &str) -> BTreeMap<String, StageScripts> {
    let mut stages: BTreeMap<String, StageScripts> = BTreeMap::new();
    let mut current: Option<(Direction, String)> = None;
    let mut body: Vec<&str> = Vec::new();

    // Editors on Windows often save with a byte order mark
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    for line in content.lines() {
        let trimmed = line.trim();

        if let Some((direction, stage)) = parse_annotation(trimmed) {
            flush_block(&mut stages, current.take(), &body);
            body.clear();
            current = Some((direction, stage.to_string()));
            continue;
        }

        if ANNOTATION_PREFIX.is_match(trimmed) {
            flush_block(&mut stages, current.take(), &body);
            body.clear();
            continue;
        }

        if current.is_some() {
            body.push(line);
        }
    }
    flush_block(&mut stages, current, &body);

    stages
}

fn flush_block(stages: &mut BTreeMap<String, StageScripts>, block: Option<(Direction, String)>, body: &[&str]) {
    let Some((direction, stage)) = block else {
        return;
    };

    let text = body.join("\n");
    let text = text.trim();
    let slot = stages.entry(stage).or_default().slot(direction);

    match slot.as_mut() {
        Some(existing) => {
            if !text.is_empty() {
                if !existing.is_empty() {
                    existing.push('\n');
                }
                existing.push_str(text);
            }
        }
        None => *slot = Some(text.to_string()),
    }
}
