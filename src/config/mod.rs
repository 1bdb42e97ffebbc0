//! Fleet configuration module.
//!
//! Provides per-truck and per-fleet configuration loaded from TOML,
//! replacing hardcoded tuning values with operator-tunable ones.
//!
//! ## Loading Order
//!
//! 1. `FUEL_COPILOT_CONFIG` environment variable (path to TOML file)
//! 2. `fuel_copilot.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(Config::load()?);
//!
//! // Anywhere in the codebase:
//! let depth = config::get().per_truck_queue_depth;
//! ```

pub mod defaults;
pub mod validation;
pub mod watcher;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::types::TankShape;

/// Env var naming the config file path.
pub const CONFIG_ENV_VAR: &str = "FUEL_COPILOT_CONFIG";
/// Default config file name, resolved relative to the current directory.
pub const DEFAULT_CONFIG_FILENAME: &str = "fuel_copilot.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config failed validation: {0:?}")]
    Invalid(Vec<String>),
}

/// Per-truck tank registration, overridable from config rather than
/// hardcoded per-fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TankSpecConfig {
    pub capacity_l: f64,
    #[serde(default)]
    pub shape: TankShape,
}

/// EKF process/measurement noise tuning — mirrors the constants in `ekf.rs`
/// so operators can retune per-fleet without a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EkfTuningConfig {
    pub q_volume: f64,
    pub q_rate: f64,
    pub q_efficiency: f64,
    pub r_fuel_sensor: f64,
    pub r_ecu: f64,
    pub r_fuel_rate: f64,
}

impl Default for EkfTuningConfig {
    fn default() -> Self {
        Self {
            q_volume: 0.1,
            q_rate: 0.5,
            q_efficiency: 0.001,
            r_fuel_sensor: 25.0,
            r_ecu: 0.01,
            r_fuel_rate: 1.0,
        }
    }
}

/// Geofence-driven activity classification. Empty `productive_geofences`
/// means "all idle time is non-productive", per spec's Open Question 3.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityClassificationConfig {
    pub productive_geofences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    pub max_reading_rate_hz: f64,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            max_reading_rate_hz: defaults::DEFAULT_MAX_READING_RATE_HZ,
        }
    }
}

/// Top-level fleet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tank_specs: HashMap<String, TankSpecConfig>,
    #[serde(default)]
    pub ekf_tuning: EkfTuningConfig,
    #[serde(default)]
    pub activity_classification: ActivityClassificationConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default = "defaults::default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "defaults::default_per_truck_queue_depth")]
    pub per_truck_queue_depth: usize,
    #[serde(default = "defaults::default_ckpt_interval_seconds")]
    pub ckpt_interval_seconds: u64,
    #[serde(default = "defaults::default_graceful_shutdown_deadline_seconds")]
    pub graceful_shutdown_deadline_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tank_specs: HashMap::new(),
            ekf_tuning: EkfTuningConfig::default(),
            activity_classification: ActivityClassificationConfig::default(),
            rate_limits: RateLimitsConfig::default(),
            worker_pool_size: defaults::default_worker_pool_size(),
            per_truck_queue_depth: defaults::default_per_truck_queue_depth(),
            ckpt_interval_seconds: defaults::default_ckpt_interval_seconds(),
            graceful_shutdown_deadline_seconds: defaults::default_graceful_shutdown_deadline_seconds(),
        }
    }
}

impl Config {
    /// Load configuration per the documented search order. Never fails on
    /// a missing file — only on an existing-but-unparseable or
    /// existing-but-invalid one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = resolve_config_path();
        match path {
            Some(path) => Self::load_from_file(&path),
            None => {
                tracing::info!("no config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        for warning in validation::validate_unknown_keys(&raw) {
            tracing::warn!("{warning}");
        }

        let config: Config = toml::from_str(&raw)?;

        let errors = validation::validate_physical_ranges(&config);
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }
    let default_path = PathBuf::from(DEFAULT_CONFIG_FILENAME);
    if default_path.exists() {
        return Some(default_path);
    }
    None
}

/// A single field-level change detected by `reload()`, surfaced to
/// operators/logs rather than applied piecemeal — the whole `Config` is
/// swapped atomically.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub field: String,
    pub old: String,
    pub new: String,
}

static CONFIG: OnceLock<ArcSwap<Config>> = OnceLock::new();
static CONFIG_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Initialize the global configuration. Must be called exactly once before
/// any call to `get()`.
pub fn init(config: Config) {
    if CONFIG.set(ArcSwap::from_pointee(config)).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
        return;
    }
    let _ = CONFIG_PATH.set(resolve_config_path());
}

/// Get a snapshot of the current global configuration.
///
/// Panics if `init()` has not been called — a missing config is a fatal
/// startup error, not a recoverable condition.
pub fn get() -> arc_swap::Guard<std::sync::Arc<Config>> {
    CONFIG
        .get()
        .unwrap_or_else(|| panic!("config::get() called before config::init() — this is a startup bug"))
        .load()
}

pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}

/// Re-read the config file from its original path and atomically swap it
/// in, returning the set of field-level changes. Returns an empty vec (no
/// error) if the config was never loaded from a file.
pub fn reload() -> Result<Vec<ConfigChange>, ConfigError> {
    let swap = CONFIG.get().expect("config::reload() called before init()");
    let path = match CONFIG_PATH.get().and_then(|p| p.clone()) {
        Some(p) => p,
        None => return Ok(Vec::new()),
    };

    let new_config = Config::load_from_file(&path)?;
    let old_config = swap.load();

    let changes = diff(&old_config, &new_config);
    swap.store(std::sync::Arc::new(new_config));
    Ok(changes)
}

fn diff(old: &Config, new: &Config) -> Vec<ConfigChange> {
    let mut changes = Vec::new();
    macro_rules! check {
        ($field:ident) => {
            if old.$field != new.$field {
                changes.push(ConfigChange {
                    field: stringify!($field).to_string(),
                    old: format!("{:?}", old.$field),
                    new: format!("{:?}", new.$field),
                });
            }
        };
    }
    check!(worker_pool_size);
    check!(per_truck_queue_depth);
    check!(ckpt_interval_seconds);
    check!(graceful_shutdown_deadline_seconds);
    check!(rate_limits);
    check!(ekf_tuning);
    check!(activity_classification);
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_physically_valid() {
        let config = Config::default();
        assert!(validation::validate_physical_ranges(&config).is_empty());
    }

    #[test]
    fn load_from_file_rejects_unparseable_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid = [[[").unwrap();
        assert!(Config::load_from_file(&path).is_err());
    }

    #[test]
    fn load_from_file_accepts_partial_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("good.toml");
        std::fs::write(&path, "worker_pool_size = 8\n").unwrap();
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.worker_pool_size, 8);
        assert_eq!(
            config.per_truck_queue_depth,
            defaults::DEFAULT_PER_TRUCK_QUEUE_DEPTH
        );
    }
}
