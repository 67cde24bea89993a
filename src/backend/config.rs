use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_CONCURRENT: usize = 3;
pub const DEFAULT_PRELOAD_DISTANCE: usize = 3;
pub const DEFAULT_CACHE_CLEANUP_DISTANCE: usize = 5;
pub const DEFAULT_MAX_ENTRY_AGE: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_API_BASE_URL: &str = "https://api.mangadex.org";

const APP_DIR: &str = "tachiyomi-tui";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,
}

/// Tuning for the page preloader. Fixed once a `Preloader` is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadConfig {
    pub max_concurrent: usize,
    pub preload_distance: usize,
    pub cache_cleanup_distance: usize,
    pub max_entry_age: Duration,
    /// Re-queue pages whose previous load failed when they fall inside a
    /// new prefetch window.
    pub retry_failed: bool,
    pub load_timeout: Option<Duration>,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            preload_distance: DEFAULT_PRELOAD_DISTANCE,
            cache_cleanup_distance: DEFAULT_CACHE_CLEANUP_DISTANCE,
            max_entry_age: DEFAULT_MAX_ENTRY_AGE,
            retry_failed: false,
            load_timeout: Some(DEFAULT_LOAD_TIMEOUT),
        }
    }
}

impl PreloadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

/// On-disk settings, stored as `config.json` next to the progress file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub data_saver: bool,
    pub preload: PreloadSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreloadSettings {
    pub max_concurrent: usize,
    pub preload_distance: usize,
    pub cache_cleanup_distance: usize,
    pub max_entry_age_secs: u64,
    pub retry_failed: bool,
    /// 0 disables the per-page timeout.
    pub load_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            data_saver: false,
            preload: PreloadSettings::default(),
        }
    }
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            preload_distance: DEFAULT_PRELOAD_DISTANCE,
            cache_cleanup_distance: DEFAULT_CACHE_CLEANUP_DISTANCE,
            max_entry_age_secs: DEFAULT_MAX_ENTRY_AGE.as_secs(),
            retry_failed: false,
            load_timeout_secs: DEFAULT_LOAD_TIMEOUT.as_secs(),
        }
    }
}

impl From<&PreloadSettings> for PreloadConfig {
    fn from(settings: &PreloadSettings) -> Self {
        PreloadConfig {
            max_concurrent: settings.max_concurrent,
            preload_distance: settings.preload_distance,
            cache_cleanup_distance: settings.cache_cleanup_distance,
            max_entry_age: Duration::from_secs(settings.max_entry_age_secs),
            retry_failed: settings.retry_failed,
            load_timeout: (settings.load_timeout_secs > 0)
                .then(|| Duration::from_secs(settings.load_timeout_secs)),
        }
    }
}

/// Directory holding the config and progress files, created on demand.
pub fn app_config_dir() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);

    fs::create_dir_all(&config_dir).ok();
    config_dir
}

impl AppConfig {
    pub fn load() -> Self {
        Self::load_from(&app_config_dir().join("config.json"))
    }

    /// Missing or malformed files fall back to the defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return AppConfig::default();
        }

        match fs::read_to_string(path).map(|content| serde_json::from_str(&content)) {
            Ok(Ok(config)) => config,
            Ok(Err(e)) => {
                log::warn!("Ignoring invalid config {}: {}", path.display(), e);
                AppConfig::default()
            }
            Err(e) => {
                log::warn!("Failed to read config {}: {}", path.display(), e);
                AppConfig::default()
            }
        }
    }

    pub fn preload_config(&self) -> PreloadConfig {
        PreloadConfig::from(&self.preload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = PreloadConfig {
            max_concurrent: 0,
            ..PreloadConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));
        assert!(PreloadConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"data_saver": true, "preload": {"max_concurrent": 5}}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert!(config.data_saver);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);

        let preload = config.preload_config();
        assert_eq!(preload.max_concurrent, 5);
        assert_eq!(preload.preload_distance, DEFAULT_PRELOAD_DISTANCE);
        assert_eq!(preload.load_timeout, Some(DEFAULT_LOAD_TIMEOUT));
    }

    #[test]
    fn test_invalid_or_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());

        fs::write(&path, "not json").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let settings = PreloadSettings {
            load_timeout_secs: 0,
            ..PreloadSettings::default()
        };
        assert_eq!(PreloadConfig::from(&settings).load_timeout, None);
    }
}
