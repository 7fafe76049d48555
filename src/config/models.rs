use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Download cache and HTTP origin settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Base that relative references are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Extra attempts after a transport failure or 5xx response; off by default
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
    /// Serve `file://` URLs from the local filesystem
    #[serde(default)]
    pub allow_file_scheme: bool,
    /// Headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            cache_enabled: true,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            user_agent: default_user_agent(),
            max_body_bytes: default_max_body_bytes(),
            allow_file_scheme: false,
            headers: BTreeMap::new(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    0
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    "contentbox/0.1.0".to_string()
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize::mib(64)
}

/// Content manager settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContentConfig {
    /// Source references that load from a different reference
    #[serde(default)]
    pub remap: Vec<RemapRule>,
}

/// Loads of `from` are served from `to`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemapRule {
    pub from: String,
    pub to: String,
}

impl ContentConfig {
    pub fn remap_table(&self) -> BTreeMap<String, String> {
        self.remap
            .iter()
            .map(|rule| (rule.from.clone(), rule.to.clone()))
            .collect()
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
