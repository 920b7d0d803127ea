//! Index configuration
//!
//! Values are resolved with priority: environment variables > config file >
//! defaults. The config file is TOML with an optional `[index]` table.

use crate::error::{IndexError, Result};
use crate::utils::app_data::get_config_path;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default overlay size that triggers a rebuild attempt
pub const DEFAULT_SOFT_REBUILD_THRESHOLD: usize = 1000;

/// Default multiple of the soft threshold at which reads fail
pub const DEFAULT_HARD_FAILURE_FACTOR: usize = 2;

/// Default delay before the first rebuild sweep
pub const DEFAULT_SCHEDULER_INITIAL_DELAY_MS: u64 = 5000;

/// Default interval between rebuild sweeps
pub const DEFAULT_SCHEDULER_PERIOD_MS: u64 = 5000;

/// Default size of the rebuild pool
pub const DEFAULT_SCHEDULER_THREADS: usize = 2;

/// Configuration file format (TOML)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub index: IndexConfigFile,
}

/// `[index]` section of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexConfigFile {
    pub soft_rebuild_threshold: Option<usize>,
    pub hard_failure_factor: Option<usize>,
    pub scheduler_initial_delay_ms: Option<u64>,
    pub scheduler_period_ms: Option<u64>,
    pub scheduler_threads: Option<usize>,
}

/// Tuning for every owner's hot-swap buffer and the rebuild scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Overlay size at which a rebuild is attempted
    pub soft_rebuild_threshold: usize,
    /// Reads fail once the overlay holds `soft_rebuild_threshold * hard_failure_factor`
    pub hard_failure_factor: usize,
    /// Delay before the first sweep, in milliseconds
    pub scheduler_initial_delay_ms: u64,
    /// Interval between sweeps, in milliseconds
    pub scheduler_period_ms: u64,
    /// Number of threads rebuilding buffers during a sweep
    pub scheduler_threads: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            soft_rebuild_threshold: DEFAULT_SOFT_REBUILD_THRESHOLD,
            hard_failure_factor: DEFAULT_HARD_FAILURE_FACTOR,
            scheduler_initial_delay_ms: DEFAULT_SCHEDULER_INITIAL_DELAY_MS,
            scheduler_period_ms: DEFAULT_SCHEDULER_PERIOD_MS,
            scheduler_threads: DEFAULT_SCHEDULER_THREADS,
        }
    }
}

impl IndexConfig {
    /// Config with the given soft threshold and defaults elsewhere
    pub fn with_soft_threshold(soft_rebuild_threshold: usize) -> Self {
        Self {
            soft_rebuild_threshold,
            ..Self::default()
        }
    }

    /// Overlay size at which reads fail
    pub fn hard_limit(&self) -> usize {
        self.soft_rebuild_threshold
            .saturating_mul(self.hard_failure_factor)
    }

    pub fn scheduler_initial_delay(&self) -> Duration {
        Duration::from_millis(self.scheduler_initial_delay_ms)
    }

    pub fn scheduler_period(&self) -> Duration {
        Duration::from_millis(self.scheduler_period_ms)
    }

    /// Check construction-time invariants
    pub fn validate(&self) -> Result<()> {
        if self.soft_rebuild_threshold == 0 {
            return Err(IndexError::InvalidConfig(
                "soft_rebuild_threshold must be at least 1".to_string(),
            ));
        }
        if self.hard_failure_factor == 0 {
            return Err(IndexError::InvalidConfig(
                "hard_failure_factor must be at least 1".to_string(),
            ));
        }
        if self.scheduler_period_ms == 0 {
            return Err(IndexError::InvalidConfig(
                "scheduler_period_ms must be positive".to_string(),
            ));
        }
        if self.scheduler_threads == 0 {
            return Err(IndexError::InvalidConfig(
                "scheduler_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load config with priority: environment variables > config file > defaults.
    ///
    /// The config file is `config.toml` in the app data directory; a missing
    /// file is not an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = get_config_path()?;
        Self::load_from(&path)
    }

    /// Load config from an explicit file path, then apply env overrides
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let file: ConfigFile = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            config.apply_file(&file.index);
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn apply_file(&mut self, file: &IndexConfigFile) {
        if let Some(v) = file.soft_rebuild_threshold {
            self.soft_rebuild_threshold = v;
        }
        if let Some(v) = file.hard_failure_factor {
            self.hard_failure_factor = v;
        }
        if let Some(v) = file.scheduler_initial_delay_ms {
            self.scheduler_initial_delay_ms = v;
        }
        if let Some(v) = file.scheduler_period_ms {
            self.scheduler_period_ms = v;
        }
        if let Some(v) = file.scheduler_threads {
            self.scheduler_threads = v;
        }
    }

    /// Apply `KWIX_*` overrides; unparsable values are ignored
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("KWIX_SOFT_THRESHOLD").and_then(|s| s.parse().ok()) {
            self.soft_rebuild_threshold = v;
        }
        if let Some(v) = var("KWIX_HARD_FACTOR").and_then(|s| s.parse().ok()) {
            self.hard_failure_factor = v;
        }
        if let Some(v) = var("KWIX_SCHEDULER_DELAY_MS").and_then(|s| s.parse().ok()) {
            self.scheduler_initial_delay_ms = v;
        }
        if let Some(v) = var("KWIX_SCHEDULER_PERIOD_MS").and_then(|s| s.parse().ok()) {
            self.scheduler_period_ms = v;
        }
        if let Some(v) = var("KWIX_SCHEDULER_THREADS").and_then(|s| s.parse().ok()) {
            self.scheduler_threads = v;
        }
    }
}
