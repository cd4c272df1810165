//! Tracker configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Which snapshot store backs persistence.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process map; lost on exit.
    #[default]
    Memory,
    /// JSON files under [`PersistenceConfig::directory`].
    File,
}

/// Snapshot persistence settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PersistenceConfig {
    /// Whether snapshots are written at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Store implementation.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Snapshot directory for the file backend; defaults under the OS temp dir.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: StoreBackend::Memory,
            directory: None,
        }
    }
}

impl PersistenceConfig {
    /// Effective snapshot directory.
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pipeline-progress"))
    }
}

fn default_true() -> bool {
    true
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_session_timeout_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_delay_tolerance() -> f64 {
    1.5
}

/// Tracker configuration parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TrackerConfig {
    /// Period of the per-session progress tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Absolute deadline from session start.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    /// Recoverable errors absorbed per run before the session fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Multiple of the estimate after which a session is flagged delayed.
    #[serde(default = "default_delay_tolerance")]
    pub delay_tolerance: f64,
    /// Sample process memory on each tick.
    #[serde(default = "default_true")]
    pub sample_memory: bool,
    /// Snapshot persistence.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            session_timeout_ms: default_session_timeout_ms(),
            max_retries: default_max_retries(),
            delay_tolerance: default_delay_tolerance(),
            sample_memory: true,
            persistence: PersistenceConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Tick period as a `Duration`.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Session deadline as a `Duration`.
    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(AppError::Config(
                "tick_interval_ms must be greater than zero".into(),
            ));
        }

        if self.session_timeout_ms == 0 {
            return Err(AppError::Config(
                "session_timeout_ms must be greater than zero".into(),
            ));
        }

        if !self.delay_tolerance.is_finite() || self.delay_tolerance < 1.0 {
            return Err(AppError::Config(
                "delay_tolerance must be a finite value of at least 1.0".into(),
            ));
        }

        if let Some(dir) = &self.persistence.directory {
            if dir.as_os_str().is_empty() {
                return Err(AppError::Config(
                    "persistence.directory must not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}
