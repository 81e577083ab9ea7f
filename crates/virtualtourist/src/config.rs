//! Configuration management for virtualtourist.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "virtualtourist";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "VirtualTourist.sqlite";

/// Default image directory name.
const PHOTOS_DIR_NAME: &str = "VirtualTouristPhotos";

/// Default preferences file name.
const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Default photo-search endpoint.
pub const DEFAULT_FLICKR_BASE_URL: &str = "https://api.flickr.com/services/rest/";

/// Largest page size the search API accepts.
pub const MAX_PER_PAGE: u32 = 500;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `VIRTUALTOURIST_`, `__` between sections)
/// 2. TOML config file at `~/.config/virtualtourist/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Photo-search configuration.
    pub flickr: FlickrConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Map configuration.
    pub map: MapConfig,
}

/// Photo-search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlickrConfig {
    /// Flickr API key. Required for any network operation.
    pub api_key: Option<String>,
    /// REST endpoint.
    pub base_url: String,
    /// Photos requested per result page.
    pub per_page: u32,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// How many images may be downloaded at once.
    pub max_concurrent_downloads: usize,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/virtualtourist/VirtualTourist.sqlite`
    pub database_path: Option<PathBuf>,
    /// Directory downloaded images are written to.
    /// Defaults to `~/.local/share/virtualtourist/VirtualTouristPhotos`
    pub photos_dir: Option<PathBuf>,
    /// Path to the user preferences file.
    /// Defaults to `~/.local/share/virtualtourist/preferences.json`
    pub preferences_path: Option<PathBuf>,
}

/// Map-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Span in degrees used when no region has been remembered yet.
    pub default_span_degrees: f64,
}

impl Default for FlickrConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_FLICKR_BASE_URL.to_string(),
            per_page: 21,
            timeout_secs: 30,
            max_concurrent_downloads: 4,
        }
    }
}

impl FlickrConfig {
    /// Per-request HTTP timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_span_degrees: 1.0,
        }
    }
}

impl Config {
    /// Load configuration, reading `config_path` or the default file.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `VIRTUALTOURIST_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        // `__` keeps keys like `api_key` intact: VIRTUALTOURIST_FLICKR__API_KEY
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("VIRTUALTOURIST_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate one specific configuration file.
    ///
    /// Unlike [`Config::load_from`], a missing file is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be parsed, or holds
    /// invalid values.
    pub fn validate_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::invalid_config(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Self::load_from(Some(path.to_path_buf()))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.flickr.per_page == 0 || self.flickr.per_page > MAX_PER_PAGE {
            return Err(Error::invalid_config(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}, got {}",
                self.flickr.per_page
            )));
        }

        if self.flickr.timeout_secs == 0 {
            return Err(Error::invalid_config(
                "timeout_secs must be greater than 0",
            ));
        }

        if self.flickr.max_concurrent_downloads == 0 {
            return Err(Error::invalid_config(
                "max_concurrent_downloads must be greater than 0",
            ));
        }

        match reqwest::Url::parse(&self.flickr.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(Error::invalid_config(format!(
                    "base_url is not an http(s) URL: {}",
                    self.flickr.base_url
                )));
            }
        }

        let span = self.map.default_span_degrees;
        if !(span > 0.0 && span <= 180.0) {
            return Err(Error::invalid_config(format!(
                "default_span_degrees must be in (0, 180], got {span}"
            )));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the image directory, resolving defaults if not set.
    #[must_use]
    pub fn photos_dir(&self) -> PathBuf {
        self.storage
            .photos_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(PHOTOS_DIR_NAME))
    }

    /// Get the preferences file path, resolving defaults if not set.
    #[must_use]
    pub fn preferences_path(&self) -> PathBuf {
        self.storage
            .preferences_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(PREFERENCES_FILE_NAME))
    }

    /// Whether an API key is available.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.flickr
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.flickr.api_key.is_none());
        assert_eq!(config.flickr.base_url, DEFAULT_FLICKR_BASE_URL);
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn test_default_flickr_config() {
        let flickr = FlickrConfig::default();

        assert_eq!(flickr.per_page, 21);
        assert_eq!(flickr.timeout_secs, 30);
        assert_eq!(flickr.max_concurrent_downloads, 4);
    }

    #[test]
    fn test_default_map_config() {
        assert!((MapConfig::default().default_span_degrees - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_per_page_bounds() {
        let mut config = Config::default();
        config.flickr.per_page = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("per_page"));

        config.flickr.per_page = MAX_PER_PAGE + 1;
        assert!(config.validate().is_err());

        config.flickr.per_page = MAX_PER_PAGE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.flickr.timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout_secs"));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.flickr.max_concurrent_downloads = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_concurrent_downloads"));
    }

    #[test]
    fn test_validate_bad_base_url() {
        let mut config = Config::default();
        config.flickr.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.flickr.base_url = "ftp://example.com/rest".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_span() {
        let mut config = Config::default();
        config.map.default_span_degrees = 0.0;
        assert!(config.validate().is_err());

        config.map.default_span_degrees = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("VirtualTourist.sqlite"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_photos_dir_default() {
        let config = Config::default();
        assert!(config
            .photos_dir()
            .to_string_lossy()
            .contains("VirtualTouristPhotos"));
    }

    #[test]
    fn test_preferences_path_default() {
        let config = Config::default();
        assert!(config
            .preferences_path()
            .to_string_lossy()
            .contains("preferences.json"));
    }

    #[test]
    fn test_request_timeout() {
        let config = Config::default();
        assert_eq!(config.flickr.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_has_api_key() {
        let mut config = Config::default();
        assert!(!config.has_api_key());

        config.flickr.api_key = Some("   ".to_string());
        assert!(!config.has_api_key());

        config.flickr.api_key = Some("abc123".to_string());
        assert!(config.has_api_key());
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("virtualtourist"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Missing file falls back to defaults
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[flickr]\napi_key = \"abc123\"\nper_page = 30\n\n[storage]\nphotos_dir = \"/tmp/vt-photos\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.flickr.api_key.as_deref(), Some("abc123"));
        assert_eq!(config.flickr.per_page, 30);
        assert_eq!(config.photos_dir(), PathBuf::from("/tmp/vt-photos"));
        assert_eq!(config.flickr.timeout_secs, 30);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[flickr]\nper_page = 0\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_flickr_config_deserialize() {
        let json = r#"{"per_page": 50, "max_concurrent_downloads": 8}"#;
        let flickr: FlickrConfig = serde_json::from_str(json).unwrap();
        assert_eq!(flickr.per_page, 50);
        assert_eq!(flickr.max_concurrent_downloads, 8);
        assert_eq!(flickr.base_url, DEFAULT_FLICKR_BASE_URL);
    }

    #[test]
    fn test_validate_file() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[flickr]\nper_page = 30\n").unwrap();
        assert_eq!(Config::validate_file(&good).unwrap().flickr.per_page, 30);

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[flickr]\nper_page = 0\n").unwrap();
        let err = Config::validate_file(&bad).unwrap_err();
        assert!(err.to_string().contains("per_page"));

        let missing = dir.path().join("missing.toml");
        let err = Config::validate_file(&missing).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }
}
