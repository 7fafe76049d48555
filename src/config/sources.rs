use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "CONTENTBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/contentbox.toml";
const ENV_PREFIX: &str = "CONTENTBOX";
const ENV_SEPARATOR: &str = "__";
const AUTH_TOKEN_ENV_VAR: &str = "CONTENTBOX_AUTH_TOKEN";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Origin credentials come from the environment only, never from TOML files
fn load_secrets(config: &mut Config) {
    if let Ok(token) = env::var(AUTH_TOKEN_ENV_VAR) {
        config
            .download
            .headers
            .insert("Authorization".to_string(), format!("Bearer {token}"));
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // CONTENTBOX__DOWNLOAD__BASE_URL -> download.base_url
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.download.base_url, "http://localhost/");
        assert!(config.download.cache_enabled);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[download]
base_url = "https://cdn.example.com/game/"
cache_enabled = false
request_timeout_ms = 5000
max_body_bytes = "10MB"

[download.headers]
accept = "*/*"

[[content.remap]]
from = "textures/old.png"
to = "textures/new.png"

[telemetry]
log_filter = "contentbox=debug"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.download.base_url, "https://cdn.example.com/game/");
        assert!(!config.download.cache_enabled);
        assert_eq!(config.download.request_timeout_ms, 5000);
        assert_eq!(config.download.max_body_bytes.as_u64(), 10 * 1024 * 1024);
        assert_eq!(config.download.headers["accept"], "*/*");
        assert_eq!(config.content.remap_table()["textures/old.png"], "textures/new.png");
        assert_eq!(config.telemetry.log_filter, "contentbox=debug");
    }

    // Environment overrides are not exercised here: env::set_var is unsafe
    // under the parallel test runner.
}
