//! Configuration management for contentbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use contentbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Resolving relative sources against: {}", config.download.base_url);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `CONTENTBOX__<section>__<key>`
//!
//! Examples:
//! - `CONTENTBOX__DOWNLOAD__BASE_URL=https://cdn.example.com/assets/`
//! - `CONTENTBOX__DOWNLOAD__MAX_BODY_BYTES=16MB`
//! - `CONTENTBOX__TELEMETRY__LOG_FILTER=contentbox=debug`
//!
//! `CONTENTBOX_AUTH_TOKEN` adds an `Authorization: Bearer` header to every
//! download.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/contentbox.toml`.
//! This can be overridden using the `CONTENTBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{Config, ContentConfig, DownloadConfig, RemapRule, TelemetryConfig};
pub use validation::{MAX_RETRIES, ValidationError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`CONTENTBOX__*`)
    /// 2. TOML file (default: `config/contentbox.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            r#"
[download]
base_url = "https://cdn.example.com/"
        "#,
        )
        .unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.download.base_url, "https://cdn.example.com/");
    }

    #[test]
    fn test_validation_catches_remap_cycle() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            r#"
[[content.remap]]
from = "a"
to = "b"

[[content.remap]]
from = "b"
to = "a"
        "#,
        )
        .unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::RemapCycle { .. })
        ));
    }

    #[test]
    fn test_validation_catches_bad_base_url() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[download]\nbase_url = \"not a url\"\n").unwrap();

        assert!(matches!(
            Config::load_from_path(config_path),
            Err(ConfigError::ValidationError(ValidationError::InvalidBaseUrl { .. }))
        ));
    }
}
