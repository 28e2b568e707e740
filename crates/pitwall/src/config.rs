//! Configuration management for pitwall.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory name used under the platform config/data dirs.
const APP_DIR_NAME: &str = "pitwall";

/// Default history database file name.
const DATABASE_FILE_NAME: &str = "history.db";

/// Earliest season in the dataset.
pub const FIRST_SEASON: i32 = 1950;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `PITWALL_`)
/// 2. TOML config file at `~/.config/pitwall/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory layout.
    pub data: DataConfig,
    /// Season window to keep.
    pub seasons: SeasonsConfig,
    /// Where the raw dataset comes from.
    pub dataset: DatasetConfig,
    /// Run history storage.
    pub storage: StorageConfig,
}

/// Data directory configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root data directory; `raw/` and `processed/` live beneath it.
    pub root: PathBuf,
    /// Override for the raw directory.
    pub raw_dir: Option<PathBuf>,
    /// Override for the processed directory.
    pub processed_dir: Option<PathBuf>,
}

/// Season window configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonsConfig {
    /// First season kept (inclusive).
    pub start_year: i32,
    /// Last season kept (inclusive).
    pub end_year: i32,
}

/// Kind of dataset source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The local KaggleHub download cache.
    #[default]
    KaggleCache,
    /// A plain directory of CSV files.
    Directory,
    /// An HTTP mirror serving the CSV files.
    Http,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KaggleCache => write!(f, "kaggle_cache"),
            Self::Directory => write!(f, "directory"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Dataset source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Kaggle dataset handle, `owner/slug`.
    pub handle: String,
    /// Which source to fetch from.
    pub source: SourceKind,
    /// Directory used by the `directory` source.
    pub source_dir: Option<PathBuf>,
    /// KaggleHub cache root. Defaults to `~/.cache/kagglehub`.
    pub kaggle_cache_dir: Option<PathBuf>,
    /// Base URL used by the `http` source.
    pub mirror_url: Option<String>,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

/// Run history configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Record pipeline runs in the history database.
    pub history_enabled: bool,
    /// Path to the database file.
    /// Defaults to `~/.local/share/pitwall/history.db`
    pub database_path: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            raw_dir: None,
            processed_dir: None,
        }
    }
}

impl Default for SeasonsConfig {
    fn default() -> Self {
        Self {
            start_year: 2020,
            end_year: 2025,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            handle: "jtrotman/formula-1-race-data".to_string(),
            source: SourceKind::KaggleCache,
            source_dir: None,
            kaggle_cache_dir: None,
            mirror_url: None,
            timeout_secs: 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_enabled: true,
            database_path: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("PITWALL_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default application data directory.
    #[must_use]
    pub fn default_app_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(APP_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let SeasonsConfig {
            start_year,
            end_year,
        } = self.seasons;

        if start_year > end_year {
            return Err(Error::ConfigValidation {
                message: format!(
                    "start_year ({start_year}) cannot be greater than end_year ({end_year})"
                ),
            });
        }

        if start_year < FIRST_SEASON {
            return Err(Error::ConfigValidation {
                message: format!("start_year ({start_year}) predates the {FIRST_SEASON} season"),
            });
        }

        let handle_ok = self
            .dataset
            .handle
            .split_once('/')
            .is_some_and(|(owner, slug)| {
                !owner.is_empty() && !slug.is_empty() && !slug.contains('/')
            });
        if !handle_ok {
            return Err(Error::ConfigValidation {
                message: format!(
                    "dataset handle must look like owner/slug, got '{}'",
                    self.dataset.handle
                ),
            });
        }

        if self.dataset.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "timeout_secs must be greater than 0".to_string(),
            });
        }

        match self.dataset.source {
            SourceKind::Directory if self.dataset.source_dir.is_none() => {
                return Err(Error::ConfigValidation {
                    message: "the directory source requires dataset.source_dir".to_string(),
                });
            }
            SourceKind::Http if self.dataset.mirror_url.is_none() => {
                return Err(Error::ConfigValidation {
                    message: "the http source requires dataset.mirror_url".to_string(),
                });
            }
            _ => {}
        }

        Ok(())
    }

    /// Directory raw dataset files are copied into.
    #[must_use]
    pub fn raw_dir(&self) -> PathBuf {
        self.data
            .raw_dir
            .clone()
            .unwrap_or_else(|| self.data.root.join("raw"))
    }

    /// Directory cleaned, enriched and feature tables are written to.
    #[must_use]
    pub fn processed_dir(&self) -> PathBuf {
        self.data
            .processed_dir
            .clone()
            .unwrap_or_else(|| self.data.root.join("processed"))
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_app_dir().join(DATABASE_FILE_NAME))
    }

    /// KaggleHub cache root, resolving defaults if not set.
    #[must_use]
    pub fn kaggle_cache_dir(&self) -> PathBuf {
        self.dataset.kaggle_cache_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".cache")
                .join("kagglehub")
        })
    }

    /// Get the HTTP timeout as a Duration.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.dataset.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.seasons.start_year, 2020);
        assert_eq!(config.seasons.end_year, 2025);
        assert_eq!(config.dataset.handle, "jtrotman/formula-1-race-data");
        assert_eq!(config.dataset.source, SourceKind::KaggleCache);
        assert!(config.storage.history_enabled);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_inverted_seasons() {
        let mut config = Config::default();
        config.seasons.start_year = 2024;
        config.seasons.end_year = 2021;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("start_year"));
    }

    #[test]
    fn test_validate_single_season_window() {
        let mut config = Config::default();
        config.seasons.start_year = 2023;
        config.seasons.end_year = 2023;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_prehistoric_season() {
        let mut config = Config::default();
        config.seasons.start_year = 1900;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("1950"));
    }

    #[test]
    fn test_validate_bad_handle() {
        for handle in ["formula-1", "/slug", "owner/", "a/b/c"] {
            let mut config = Config::default();
            config.dataset.handle = handle.to_string();
            assert!(config.validate().is_err(), "handle {handle} should fail");
        }
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.dataset.timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout_secs"));
    }

    #[test]
    fn test_validate_directory_source_requires_dir() {
        let mut config = Config::default();
        config.dataset.source = SourceKind::Directory;
        assert!(config.validate().is_err());

        config.dataset.source_dir = Some(PathBuf::from("/tmp/f1"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_http_source_requires_url() {
        let mut config = Config::default();
        config.dataset.source = SourceKind::Http;
        assert!(config.validate().is_err());

        config.dataset.mirror_url = Some("https://mirror.example/f1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_data_dirs_default_under_root() {
        let mut config = Config::default();
        config.data.root = PathBuf::from("/srv/f1");

        assert_eq!(config.raw_dir(), PathBuf::from("/srv/f1/raw"));
        assert_eq!(config.processed_dir(), PathBuf::from("/srv/f1/processed"));
    }

    #[test]
    fn test_data_dirs_overrides() {
        let mut config = Config::default();
        config.data.raw_dir = Some(PathBuf::from("/mnt/raw"));
        config.data.processed_dir = Some(PathBuf::from("/mnt/out"));

        assert_eq!(config.raw_dir(), PathBuf::from("/mnt/raw"));
        assert_eq!(config.processed_dir(), PathBuf::from("/mnt/out"));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("history.db"));
    }

    #[test]
    fn test_kaggle_cache_dir_default() {
        let path = Config::default().kaggle_cache_dir();
        assert!(path.ends_with(".cache/kagglehub"));
    }

    #[test]
    fn test_http_timeout() {
        assert_eq!(Config::default().http_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_source_kind_display() {
        assert_eq!(SourceKind::KaggleCache.to_string(), "kaggle_cache");
        assert_eq!(SourceKind::Directory.to_string(), "directory");
        assert_eq!(SourceKind::Http.to_string(), "http");
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("pitwall"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[seasons]\nstart_year = 2022\nend_year = 2024\n\n[dataset]\nsource = \"directory\"\nsource_dir = \"/tmp/f1\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.seasons.start_year, 2022);
        assert_eq!(config.seasons.end_year, 2024);
        assert_eq!(config.dataset.source, SourceKind::Directory);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[seasons]\nstart_year = 2025\nend_year = 2020\n").unwrap();

        assert!(Config::load_from(Some(path)).is_err());
    }

    #[test]
    fn test_source_kind_deserialize() {
        let kind: SourceKind = serde_json::from_str("\"kaggle_cache\"").unwrap();
        assert_eq!(kind, SourceKind::KaggleCache);
    }
}
