use crate::core::dirs::{get_cache_directory, get_config_directory};
use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Minimum time between two refreshes of a server-mirrored collection.
pub const DEFAULT_MIN_REFRESH_INTERVAL_MS: u64 = 60_000;

/// Refresh interval for collections that rarely change (users, job statuses).
pub const DEFAULT_DAILY_REFRESH_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

/// Dead identity lookups tolerated before the mapping repo is compacted.
pub const DEFAULT_CACHE_MISS_THRESHOLD: usize = 100;

/// Tunables for the client state cache.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub min_refresh_interval_ms: u64,
    pub daily_refresh_interval_ms: u64,
    pub cache_miss_threshold: usize,
    pub state_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval_ms: DEFAULT_MIN_REFRESH_INTERVAL_MS,
            daily_refresh_interval_ms: DEFAULT_DAILY_REFRESH_INTERVAL_MS,
            cache_miss_threshold: DEFAULT_CACHE_MISS_THRESHOLD,
            state_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn load_or_create() -> Result<Self> {
        let config_file = get_config_directory()?.join("config.json");

        if config_file.exists() {
            Self::load_from(&config_file)
        } else {
            let config = Self::default();
            config.save_to(&config_file)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Base directory for persisted client state: the configured override, or the
    /// platform cache directory.
    pub fn state_directory(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_cache_directory(),
        }
    }

    pub fn min_refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.min_refresh_interval_ms as i64)
    }

    pub fn daily_refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.daily_refresh_interval_ms as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.min_refresh_interval_ms, 60_000);
        assert_eq!(config.daily_refresh_interval_ms, 86_400_000);
        assert_eq!(config.cache_miss_threshold, 100);
        assert!(config.state_dir.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let config = CacheConfig {
            min_refresh_interval_ms: 1_000,
            state_dir: Some(temp_dir.path().to_path_buf()),
            ..CacheConfig::default()
        };
        config.save_to(&path).unwrap();

        let loaded = CacheConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.state_directory().unwrap(), temp_dir.path());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"cache_miss_threshold": 5}"#).unwrap();

        let loaded = CacheConfig::load_from(&path).unwrap();
        assert_eq!(loaded.cache_miss_threshold, 5);
        assert_eq!(loaded.min_refresh_interval_ms, DEFAULT_MIN_REFRESH_INTERVAL_MS);
    }
}
