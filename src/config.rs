//! Application configuration management.
//!
//! Holds the tunables of the coordination core: the restore retry policy,
//! the guard resolution timeout, and whether cache snapshots are persisted.
//! Stored at `~/.config/clubhouse/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::session::RetryPolicy;

/// Application name used for config/data directory paths
const APP_NAME: &str = "clubhouse";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub restore_retry: RetryPolicy,
    pub guard_timeout_secs: u64,
    pub cache_snapshot: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            restore_retry: RetryPolicy::default(),
            guard_timeout_secs: 10,
            cache_snapshot: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the file-backed key-value store (preferences, cache
    /// snapshots); [`crate::storage::JsonFileStore::at_data_dir`] roots
    /// itself here.
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.restore_retry.max_attempts, 5);
        assert_eq!(config.guard_timeout_secs, 10);
        assert!(config.cache_snapshot);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let config: Config = serde_json::from_str(r#"{"guard_timeout_secs": 3}"#).unwrap();
        assert_eq!(config.guard_timeout_secs, 3);
        assert_eq!(config.restore_retry, RetryPolicy::default());
    }

    #[test]
    fn data_dir_is_namespaced_under_the_app() {
        let dir = Config::data_dir().unwrap();
        assert!(dir.ends_with(APP_NAME));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = Config {
            guard_timeout_secs: 7,
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.guard_timeout_secs, 7);
    }
}
