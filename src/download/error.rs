use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No fetcher registered for scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Response body exceeds {limit} bytes: {url}")]
    TooLarge { url: String, limit: u64 },

    #[error("Failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DownloadError>;
