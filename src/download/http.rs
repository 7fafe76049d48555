//! HTTP origin for the download cache

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use reqwest::{Client, Url, header::CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::{DownloadError, Result};
use super::fetcher::{FetchResponse, Fetcher, guess_mime};
use crate::config::DownloadConfig;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub user_agent: String,
    pub max_body_bytes: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from(&DownloadConfig::default())
    }
}

impl From<&DownloadConfig> for HttpConfig {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            user_agent: config.user_agent.clone(),
            max_body_bytes: config.max_body_bytes.as_u64(),
        }
    }
}

/// reqwest-backed fetcher for `http` and `https` URLs
pub struct HttpFetcher {
    client: Client,
    config: HttpConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| DownloadError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn fetch_once(&self, url: &Url, headers: &[(String, String)]) -> Result<FetchResponse> {
        debug!(url = %url, "Starting download");

        let mut request = self.client.get(url.clone());
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout
            } else {
                DownloadError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DownloadError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let limit = self.config.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(DownloadError::TooLarge {
                url: url.to_string(),
                limit,
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<Mime>().ok())
            .filter(|m| *m != mime::APPLICATION_OCTET_STREAM)
            .unwrap_or_else(|| guess_mime(final_url.path()));

        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::RequestFailed(format!("Failed to read body: {e}")))?;

        if body.len() as u64 > limit {
            return Err(DownloadError::TooLarge {
                url: url.to_string(),
                limit,
            });
        }

        debug!(url = %final_url, size = body.len(), "Download completed");

        Ok(FetchResponse {
            url: final_url,
            content_type: Some(content_type),
            body,
        })
    }
}

/// Highest backoff exponent; later attempts wait as long as this one.
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Transport failures and 5xx responses are retried; any other answer from
/// the server is final.
fn is_retryable(err: &DownloadError) -> bool {
    match err {
        DownloadError::Timeout | DownloadError::RequestFailed(_) => true,
        DownloadError::Status { status, .. } => *status >= 500,
        _ => false,
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(1 << exponent)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, headers: &[(String, String)]) -> Result<FetchResponse> {
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);

            match self.fetch_once(url, headers).await {
                Ok(response) => {
                    if attempts > 1 {
                        debug!(url = %url, attempts, "Download succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if !is_retryable(&e) || attempts > self.config.max_retries => {
                    warn!(url = %url, attempts, error = %e, "Download failed");
                    return Err(e);
                }
                Err(e) => {
                    warn!(url = %url, attempts, error = %e, "Download failed, retrying");

                    tokio::time::sleep(backoff_delay(self.config.retry_backoff, attempts)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.user_agent, "contentbox/0.1.0");
        assert_eq!(config.max_body_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&DownloadError::Timeout));
        assert!(is_retryable(&DownloadError::RequestFailed("connection reset".into())));
        assert!(is_retryable(&DownloadError::Status {
            url: "x".into(),
            status: 503
        }));
        assert!(!is_retryable(&DownloadError::NotFound("x".into())));
        for status in [400, 401, 403, 429] {
            assert!(!is_retryable(&DownloadError::Status {
                url: "x".into(),
                status
            }));
        }
        assert!(!is_retryable(&DownloadError::TooLarge {
            url: "x".into(),
            limit: 1
        }));
    }

    #[test]
    fn test_backoff_grows_then_caps() {
        let base = Duration::from_millis(10);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(10));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(40));
        assert_eq!(backoff_delay(base, 11), Duration::from_millis(10 * 1024));
        assert_eq!(backoff_delay(base, 40), Duration::from_millis(10 * 1024));
        assert_eq!(backoff_delay(base, u32::MAX), Duration::from_millis(10 * 1024));
        assert_eq!(backoff_delay(Duration::MAX, 40), Duration::MAX);
    }
}
