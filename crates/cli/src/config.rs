//! CLI settings read from the environment
//!
//! These complement [`MigratorConfig`](stagehand_migrate::MigratorConfig) with
//! the options only the command line needs: default stages, whether `new`
//! is allowed, and logging.

use std::env;
use stagehand_migrate::{Environment, OptionSet};

/// Command line settings
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Stages used by `up`, `down` and `new` when none are given
    pub stages: OptionSet,
    /// Stages used by `refresh` when none are given; falls back to `stages`
    pub refresh_stages: OptionSet,
    /// Whether `new` may create files; `None` means development only
    pub allow_new: Option<bool>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            stages: OptionSet::new(),
            refresh_stages: OptionSet::new(),
            allow_new: None,
            log_level: "warn".to_string(),
            log_json: false,
        }
    }
}

impl CliConfig {
    /// Load settings from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(stages) = env::var("MIGRATIONS_STAGES") {
            config.stages = parse_list(&stages);
        }

        if let Ok(stages) = env::var("MIGRATIONS_REFRESH_STAGES") {
            config.refresh_stages = parse_list(&stages);
        }

        if let Ok(allow) = env::var("MIGRATIONS_ALLOW_NEW") {
            config.allow_new = parse_bool(&allow);
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(format) = env::var("LOG_FORMAT") {
            config.log_json = format.eq_ignore_ascii_case("json");
        }

        config
    }

    /// Stages for `up` and `down`: explicit arguments win over the default list
    pub fn stages_or_default(&self, explicit: &[String]) -> Vec<String> {
        if explicit.is_empty() {
            self.stages.iter().map(str::to_string).collect()
        } else {
            explicit.to_vec()
        }
    }

    /// Stages for `refresh`
    pub fn refresh_stages_or_default(&self, explicit: &[String]) -> Vec<String> {
        if !explicit.is_empty() {
            return explicit.to_vec();
        }
        if self.refresh_stages.is_empty() {
            self.stages_or_default(explicit)
        } else {
            self.refresh_stages.iter().map(str::to_string).collect()
        }
    }

    /// Check if `new` may create files in `environment`
    pub fn new_allowed(&self, environment: Environment) -> bool {
        self.allow_new.unwrap_or_else(|| environment.is_development())
    }
}

/// Split a comma separated list, dropping blanks and repeats
fn parse_list(value: &str) -> OptionSet {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
