//! Engine configuration.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults ([`TriageConfig::default`])
//! 2. A TOML file (by default `config.toml` in the platform config directory)
//! 3. Environment variables prefixed with `PHOTOTRIAGE_`
//!
//! ```toml
//! batch_size = 12
//! io_threads = 8
//! fetch_timeout_secs = 10
//! reassign_policy = "reject"
//! asset_kind = "any"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::backend::AssetKind;
use crate::decisions::ReassignPolicy;

/// Prefix for environment overrides, e.g. `PHOTOTRIAGE_BATCH_SIZE=6`.
pub const ENV_PREFIX: &str = "PHOTOTRIAGE_";

/// Default number of assets per review batch.
pub const DEFAULT_BATCH_SIZE: usize = 9;

/// Default number of fingerprinting threads.
pub const DEFAULT_IO_THREADS: usize = 4;

/// Default per-asset fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Assets drawn per review batch.
    pub batch_size: usize,
    /// Worker threads used while fingerprinting.
    pub io_threads: usize,
    /// Per-asset fetch timeout in seconds; 0 disables the timeout.
    pub fetch_timeout_secs: u64,
    /// What happens when a decided asset receives the opposite decision.
    pub reassign_policy: ReassignPolicy,
    /// Kind of assets a session reviews.
    pub asset_kind: AssetKind,
    /// Location of the decision file. Defaults to the platform data directory.
    pub store_path: Option<PathBuf>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            io_threads: DEFAULT_IO_THREADS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            reassign_policy: ReassignPolicy::default(),
            asset_kind: AssetKind::default(),
            store_path: None,
        }
    }
}

impl TriageConfig {
    /// Load from the default config file (if any) and the environment.
    ///
    /// # Errors
    ///
    /// Fails if a layer cannot be parsed or the result does not validate.
    pub fn load() -> Result<Self> {
        match default_config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::debug!("No platform config directory, using defaults and environment");
                Self::extract(Self::figment())
            }
        }
    }

    /// Load from `path` and the environment. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Fails if a layer cannot be parsed or the result does not validate.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            log::debug!("Loading configuration from {}", path.display());
        }
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Fails on a zero batch size or zero worker threads.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.io_threads == 0 {
            bail!("io_threads must be at least 1");
        }
        Ok(())
    }

    /// Fetch timeout as a `Duration`, `None` when disabled.
    #[must_use]
    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
    }

    /// Write these settings to `path` as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails if the settings cannot be serialized or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write configuration to {}", path.display()))?;
        log::debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Configured decision file, falling back to [`default_store_path`].
    #[must_use]
    pub fn resolved_store_path(&self) -> Option<PathBuf> {
        self.store_path.clone().or_else(default_store_path)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "phototriage", "phototriage")
}

/// Platform-specific location of `config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Platform-specific location of the decision file.
#[must_use]
pub fn default_store_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("decisions.json"))
}
