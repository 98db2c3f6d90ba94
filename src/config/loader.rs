use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::Config;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {source}")]
    ParseError {
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseError { source: e })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file.
    ///
    /// - If the file doesn't exist, returns `Config::default()`.
    /// - If the file exists, parses it as TOML and validates.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml_str(&content)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - `router.root_path` is empty or starts (and does not end) with '/'
    /// - `router.default_path` starts with '/'
    /// - `router.max_redirects` is positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = &self.router.root_path;
        if !root.is_empty() && (!root.starts_with('/') || root.ends_with('/')) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Root path '{}' must start with '/' and must not end with '/'",
                    root
                ),
            });
        }

        if let Some(default_path) = &self.router.default_path {
            if !default_path.starts_with('/') {
                return Err(ConfigError::ValidationError {
                    message: format!("Default path '{}' must start with '/'", default_path),
                });
            }
        }

        if self.router.max_redirects == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_redirects must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
