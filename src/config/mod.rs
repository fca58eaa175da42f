//! Configuration management for ClipKeep
//!
//! This module handles loading, validating, and managing configuration
//! for the clipboard history daemon.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Validation error
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// History capture configuration
    #[serde(default)]
    pub history: HistoryConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// History capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Number of clipboard items to keep
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Whether to capture image clipboard content
    #[serde(default = "default_store_images")]
    pub store_images: bool,

    /// Cache directory for the manifest and image files
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

// Default value functions
fn default_max_size() -> usize {
    50
}

fn default_store_images() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("clipkeep"))
        .unwrap_or_else(|| PathBuf::from("~/.cache/clipkeep"))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            store_images: default_store_images(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Checks in order:
    /// 1. Path from CLIPKEEP_CONFIG environment variable
    /// 2. ~/.config/clipkeep/config.toml
    /// 3. Defaults if no config file exists
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = Self::find_config_path() {
            Self::load_from_path(&path)
        } else {
            let mut config = Self::default();
            config.expand_paths();
            Ok(config)
        }
    }

    /// Load configuration with an optional explicit path
    pub fn load_config(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            Self::load_from_path(&path)
        } else {
            Self::load()
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml_str)?;
        config.expand_paths();
        config.validate_config()?;
        Ok(config)
    }

    /// Find configuration file path
    fn find_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CLIPKEEP_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        dirs::config_dir()
            .map(|p| p.join("clipkeep").join("config.toml"))
            .filter(|p| p.exists())
    }

    /// Expand tilde in paths
    fn expand_paths(&mut self) {
        self.history.cache_dir = expand_path(&self.history.cache_dir);
    }

    /// Validate configuration values
    fn validate_config(&self) -> Result<(), ConfigError> {
        if self.history.max_size < 1 {
            return Err(ConfigError::Validation(
                "history.max_size must be at least 1".to_string(),
            ));
        }
        if self.history.max_size > 500 {
            return Err(ConfigError::Validation(
                "history.max_size must not exceed 500".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| {
                ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not find config directory",
                ))
            })?
            .join("clipkeep");

        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            ConfigError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        std::fs::write(config_path, toml_string)?;

        Ok(())
    }

    /// Validate configuration file at given path
    pub fn validate(path: &Path) -> Result<(), ConfigError> {
        Self::load_from_path(path).map(|_| ())
    }

    /// Generate example configuration file at the default location
    pub fn generate_example_config(force: bool) -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| {
                ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not find config directory",
                ))
            })?
            .join("clipkeep");

        std::fs::create_dir_all(&config_dir)?;
        let config_path = config_dir.join("config.toml");

        if !force && config_path.exists() {
            return Err(ConfigError::Validation(
                "Config file already exists. Use --force to overwrite.".to_string(),
            ));
        }

        std::fs::write(&config_path, Self::generate_example())?;
        Ok(config_path)
    }

    /// Generate example configuration content
    pub fn generate_example() -> String {
        let config = Config::default();

        format!(
            r#"# ClipKeep Configuration File
# Location: ~/.config/clipkeep/config.toml

# History settings
[history]
# Number of clipboard items to keep (1-500)
max_size = {}
# Capture image clipboard content
store_images = {}
# Where the manifest and image files live
cache_dir = "{}"

# Logging level (trace, debug, info, warn, error)
log_level = "{}"
"#,
            config.history.max_size,
            config.history.store_images,
            config.history.cache_dir.display(),
            config.log_level
        )
    }
}

/// Expand tilde in path
fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(path_str.as_ref());
    PathBuf::from(expanded.into_owned())
}
