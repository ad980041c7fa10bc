use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FarmError;


/// Configuration handed to [`Farm::start`](crate::Farm::start) and to the
/// embedder's start hook.
///
/// Parsed from TOML with support for environment variable overrides:
///
/// ```toml
/// name = "thumbnails"
/// num_workers = 8
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Label used in log events for this farm.
    #[serde(default = "default_name")]
    pub name: String,

    /// Number of concurrent workers spawned at start. Must be positive.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

fn default_name() -> String {
    "farm".into()
}

fn default_num_workers() -> usize {
    4
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            num_workers: default_num_workers(),
        }
    }
}

impl FarmConfig {
    /// Default config with the given worker count.
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, FarmError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FarmError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Check the config can be used to start a farm.
    pub fn validate(&self) -> Result<(), FarmError> {
        if self.num_workers == 0 {
            return Err(FarmError::Config(
                "num_workers must be at least 1".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(FarmError::Config("name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Apply environment variable overrides.
    ///
    /// - `TASKFARM_NAME` -> `name`
    /// - `TASKFARM_NUM_WORKERS` -> `num_workers` (ignored unless it parses)
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TASKFARM_NAME") {
            self.name = v;
        }
        if let Ok(v) = std::env::var("TASKFARM_NUM_WORKERS") {
            if let Ok(n) = v.parse::<usize>() {
                self.num_workers = n;
            }
        }
    }
}
