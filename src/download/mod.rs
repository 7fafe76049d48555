//! Download cache
//!
//! Fetches raw content by URL and keeps it keyed by the normalized, absolute
//! URL so that `a.png` and `http://origin/a.png` share one entry.
//!
//! Content is sniffed by MIME type:
//! - `image/*` and `video/*` keep only the URL ([`RawContent::Url`]); the
//!   consumer streams the payload itself
//! - JSON is parsed and kept inline ([`RawContent::Json`])
//! - text, XML and YAML are kept inline as UTF-8 ([`RawContent::Text`])
//! - anything else is kept as bytes ([`RawContent::Bytes`])
//!
//! Origins are pluggable per URL scheme through the [`Fetcher`] trait.

mod error;
mod fetcher;
mod http;
pub mod url;

pub use error::DownloadError;
pub use fetcher::{DownloadRequest, FetchResponse, Fetcher, StoreFetcher, guess_mime};
pub use http::{HttpConfig, HttpFetcher};

use bytes::Bytes;
use futures::future::try_join_all;
use mime::Mime;
use parking_lot::RwLock;
use reqwest::Url;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::DownloadConfig;
use crate::observability::Metrics;
use error::Result;

/// Content of a downloaded resource
#[derive(Debug, Clone, PartialEq)]
pub enum RawContent {
    Text(String),
    Json(serde_json::Value),
    Bytes(Bytes),
    /// Only the URL is retained (images, video).
    Url(String),
}

/// A downloaded resource: `{ url, type, content }`
#[derive(Debug, Clone, PartialEq)]
pub struct RawAsset {
    /// Normalized absolute URL, or the data URI itself.
    pub url: String,
    /// MIME essence, e.g. `application/json`.
    pub content_type: String,
    pub content: RawContent,
}

impl RawAsset {
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            RawContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.content {
            RawContent::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.content {
            RawContent::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Whether only the URL was retained.
    pub fn is_reference(&self) -> bool {
        matches!(self.content, RawContent::Url(_))
    }
}

/// Process-wide download cache, shared by every content manager that uses it.
pub struct DownloadCache {
    base: Url,
    cache_enabled: bool,
    default_headers: BTreeMap<String, String>,
    fetchers: RwLock<HashMap<String, Arc<dyn Fetcher>>>,
    entries: RwLock<HashMap<String, Arc<RawAsset>>>,
    metrics: Arc<Metrics>,
}

impl DownloadCache {
    /// Creates an empty cache resolving relative URLs against `base`.
    ///
    /// No fetchers are registered; see [`DownloadCache::register_fetcher`].
    pub fn new(base: Url) -> Self {
        Self {
            base,
            cache_enabled: true,
            default_headers: BTreeMap::new(),
            fetchers: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Builds a cache from configuration with the HTTP fetcher registered for
    /// `http`/`https` and, when allowed, the local filesystem for `file`.
    pub fn from_config(config: &DownloadConfig, metrics: Arc<Metrics>) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| DownloadError::InvalidUrl(format!("{}: {e}", config.base_url)))?;

        let http: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(HttpConfig::from(config))?);

        let cache = Self {
            cache_enabled: config.cache_enabled,
            default_headers: config.headers.clone(),
            metrics,
            ..Self::new(base)
        };
        cache.register_fetcher("http", http.clone());
        cache.register_fetcher("https", http);
        if config.allow_file_scheme {
            cache.register_fetcher("file", Arc::new(StoreFetcher::local()));
        }

        Ok(cache)
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Registers (or replaces) the fetcher for a URL scheme.
    pub fn register_fetcher(&self, scheme: &str, fetcher: Arc<dyn Fetcher>) {
        self.fetchers
            .write()
            .insert(scheme.to_ascii_lowercase(), fetcher);
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Normalizes a reference into its cache key URL.
    pub fn normalize(&self, reference: &str) -> Result<Url> {
        url::normalize(&self.base, reference)
    }

    /// Returns the cached entry for a reference without downloading.
    pub fn lookup(&self, reference: &str) -> Option<Arc<RawAsset>> {
        let key = self.normalize(reference).ok()?;
        self.entries.read().get(key.as_str()).cloned()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.lookup(reference).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Downloads a resource, serving it from the cache when present.
    ///
    /// Failed downloads are not cached. Data URIs are decoded inline and never
    /// stored.
    pub async fn download(&self, request: impl Into<DownloadRequest>) -> Result<Arc<RawAsset>> {
        let request = request.into();

        if url::is_data_uri(&request.url) {
            let (mime, body) = url::decode_data_uri(&request.url)?;
            let content = classify(&request.url, &mime, body)?;
            return Ok(Arc::new(RawAsset {
                url: request.url,
                content_type: mime.essence_str().to_string(),
                content,
            }));
        }

        let url = self.normalize(&request.url)?;
        let key = url.to_string();

        if self.cache_enabled {
            if let Some(found) = self.entries.read().get(&key).cloned() {
                self.metrics.download_cache_hit();
                debug!(url = %key, "Download cache hit");
                return Ok(found);
            }
        }

        let fetcher = self
            .fetchers
            .read()
            .get(url.scheme())
            .cloned()
            .ok_or_else(|| DownloadError::UnsupportedScheme(url.scheme().to_string()))?;

        let mut headers: BTreeMap<String, String> = self.default_headers.clone();
        headers.extend(request.headers);
        let headers: Vec<(String, String)> = headers.into_iter().collect();

        self.metrics.download_started();
        let response = fetcher.fetch(&url, &headers).await?;

        let mime = response
            .content_type
            .unwrap_or_else(|| guess_mime(response.url.path()));
        let content = classify(&key, &mime, response.body)?;

        let asset = Arc::new(RawAsset {
            url: key.clone(),
            content_type: mime.essence_str().to_string(),
            content,
        });

        if self.cache_enabled {
            self.entries.write().insert(key.clone(), asset.clone());
            // redirects are reachable under both URLs
            let final_key = response.url.to_string();
            if final_key != key {
                self.entries.write().insert(final_key, asset.clone());
            }
        }

        info!(url = %key, content_type = %asset.content_type, "Downloaded");
        Ok(asset)
    }

    /// Downloads every URL concurrently; each is cached independently.
    pub async fn download_all<I, R>(&self, requests: I) -> Result<Vec<Arc<RawAsset>>>
    where
        I: IntoIterator<Item = R>,
        R: Into<DownloadRequest>,
    {
        try_join_all(requests.into_iter().map(|r| self.download(r))).await
    }
}

/// Decides how a response body is retained.
fn classify(url: &str, mime: &Mime, body: Bytes) -> Result<RawContent> {
    let suffix = mime.suffix();
    let subtype = mime.subtype().as_str();

    if mime.type_() == mime::IMAGE || mime.type_() == mime::VIDEO {
        return Ok(RawContent::Url(url.to_string()));
    }

    if subtype == "json" || suffix == Some(mime::JSON) {
        return serde_json::from_slice(&body)
            .map(RawContent::Json)
            .map_err(|e| DownloadError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            });
    }

    let textual = mime.type_() == mime::TEXT
        || subtype == "xml"
        || suffix == Some(mime::XML)
        || matches!(subtype, "x-yaml" | "yaml" | "x-obj" | "x-mtl" | "javascript");
    if textual {
        return String::from_utf8(body.to_vec())
            .map(RawContent::Text)
            .map_err(|e| DownloadError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            });
    }

    Ok(RawContent::Bytes(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_as(mime: &str, body: &'static [u8]) -> Result<RawContent> {
        classify("http://origin/x", &mime.parse().unwrap(), Bytes::from_static(body))
    }

    #[test]
    fn test_classify_media_keeps_url() {
        let content = classify_as("image/png", b"\x89PNG").unwrap();
        assert_eq!(content, RawContent::Url("http://origin/x".into()));
        let content = classify_as("video/mp4", b"....").unwrap();
        assert!(matches!(content, RawContent::Url(_)));
    }

    #[test]
    fn test_classify_json() {
        let content = classify_as("application/json; charset=utf-8", br#"{"a":[1,2]}"#).unwrap();
        assert_eq!(content, RawContent::Json(serde_json::json!({"a": [1, 2]})));
        let content = classify_as("model/gltf+json", br#"{"asset":{}}"#).unwrap();
        assert!(matches!(content, RawContent::Json(_)));
    }

    #[test]
    fn test_classify_invalid_json_is_error() {
        let err = classify_as("application/json", b"{nope").unwrap_err();
        assert!(matches!(err, DownloadError::Decode { .. }));
    }

    #[test]
    fn test_classify_text_and_binary() {
        assert_eq!(
            classify_as("text/plain", b"hello").unwrap(),
            RawContent::Text("hello".into())
        );
        assert!(matches!(
            classify_as("application/x-yaml", b"a: 1").unwrap(),
            RawContent::Text(_)
        ));
        assert!(matches!(
            classify_as("model/gltf-binary", b"glTF").unwrap(),
            RawContent::Bytes(_)
        ));
    }

    fn memory_cache() -> (DownloadCache, StoreFetcher) {
        let cache = DownloadCache::new(Url::parse("mem:///app/").unwrap());
        let store = StoreFetcher::in_memory();
        cache.register_fetcher("mem", Arc::new(store.clone()));
        (cache, store)
    }

    #[tokio::test]
    async fn test_download_normalizes_cache_key() {
        let (cache, store) = memory_cache();
        store.put("app/a.png", &b"\x89PNG"[..]).await.unwrap();

        let first = cache.download("a.png").await.unwrap();
        let second = cache.download("mem:///app/a.png").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.url, "mem:///app/a.png");
        assert!(first.is_reference());
        assert_eq!(cache.len(), 1);

        let snapshot = cache.metrics().snapshot();
        assert_eq!(snapshot.downloads, 1);
        assert_eq!(snapshot.download_cache_hits, 1);
    }

    #[tokio::test]
    async fn test_download_failure_is_not_cached() {
        let (cache, store) = memory_cache();

        assert!(cache.download("late.txt").await.is_err());
        assert!(cache.is_empty());

        store.put("app/late.txt", "now here").await.unwrap();
        let asset = cache.download("late.txt").await.unwrap();
        assert_eq!(asset.text(), Some("now here"));
    }

    #[tokio::test]
    async fn test_download_unsupported_scheme() {
        let (cache, _) = memory_cache();
        let err = cache.download("ftp://host/a.txt").await.unwrap_err();
        assert!(matches!(err, DownloadError::UnsupportedScheme(s) if s == "ftp"));
    }

    #[tokio::test]
    async fn test_download_data_uri_is_not_cached() {
        let (cache, _) = memory_cache();
        let asset = cache.download("data:application/json,%7B%7D").await.unwrap();
        assert_eq!(asset.json(), Some(&serde_json::json!({})));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_download_all_stores_each() {
        let (cache, store) = memory_cache();
        store.put("app/a.txt", "a").await.unwrap();
        store.put("app/b.json", "[1]").await.unwrap();

        let assets = cache.download_all(["a.txt", "b.json"]).await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].text(), Some("a"));
        assert_eq!(assets[1].json(), Some(&serde_json::json!([1])));
        assert!(cache.contains("mem:///app/a.txt"));
        assert!(cache.contains("b.json"));
    }

    #[tokio::test]
    async fn test_clear() {
        let (cache, store) = memory_cache();
        store.put("app/a.txt", "a").await.unwrap();
        cache.download("a.txt").await.unwrap();
        cache.clear();
        assert!(cache.lookup("a.txt").is_none());
    }
}
