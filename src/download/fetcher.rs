//! Origins the download cache can fetch from

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use object_store::{ObjectStore, path::Path as StorePath};
use reqwest::Url;
use std::sync::Arc;

use super::error::{DownloadError, Result};

/// A download request; `headers` are merged over the cache's default headers.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl From<&str> for DownloadRequest {
    fn from(value: &str) -> Self {
        DownloadRequest::new(value)
    }
}

impl From<String> for DownloadRequest {
    fn from(value: String) -> Self {
        DownloadRequest::new(value)
    }
}

/// Raw bytes returned by a fetcher before content sniffing.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub content_type: Option<Mime>,
    pub body: Bytes,
}

/// Fetches the bytes behind an absolute URL of one scheme.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, headers: &[(String, String)]) -> Result<FetchResponse>;
}

/// Fetcher backed by an `object_store` (local filesystem or in-memory).
///
/// The URL path is used as the object key, so `file:///srv/a.json` reads
/// `srv/a.json` from the store root and `mem:///a.json` reads `a.json`.
#[derive(Clone)]
pub struct StoreFetcher {
    store: Arc<dyn ObjectStore>,
}

impl StoreFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Reads from the local filesystem rooted at `/`.
    pub fn local() -> Self {
        Self::new(Arc::new(object_store::local::LocalFileSystem::new()))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }

    /// Stores an object; used to seed in-memory origins.
    pub async fn put(&self, key: &str, data: impl Into<Bytes>) -> Result<()> {
        let path = StorePath::from(key.trim_start_matches('/'));
        let data: Bytes = data.into();
        let size = data.len();
        self.store
            .put(&path, data.into())
            .await
            .map_err(|e| DownloadError::RequestFailed(e.to_string()))?;

        tracing::debug!(key, size, "Stored object");
        Ok(())
    }
}

#[async_trait]
impl Fetcher for StoreFetcher {
    async fn fetch(&self, url: &Url, _headers: &[(String, String)]) -> Result<FetchResponse> {
        let path = StorePath::from_url_path(url.path())
            .map_err(|e| DownloadError::InvalidUrl(format!("{url}: {e}")))?;

        let result = self.store.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => DownloadError::NotFound(url.to_string()),
            other => DownloadError::RequestFailed(other.to_string()),
        })?;

        let body = result
            .bytes()
            .await
            .map_err(|e| DownloadError::RequestFailed(format!("Failed to read body: {e}")))?;

        tracing::debug!(url = %url, size = body.len(), "Read from store");

        Ok(FetchResponse {
            url: url.clone(),
            content_type: Some(guess_mime(url.path())),
            body,
        })
    }
}

/// Guesses a MIME type from the extension of `path`.
pub fn guess_mime(path: &str) -> Mime {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let essence = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "tga" => "image/x-tga",
        "ktx" => "image/ktx",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogv" => "video/ogg",
        "json" => "application/json",
        "gltf" => "model/gltf+json",
        "glb" => "model/gltf-binary",
        "stl" => "model/stl",
        "obj" => "application/x-obj",
        "mtl" => "application/x-mtl",
        "yml" | "yaml" => "application/x-yaml",
        "xml" | "dae" => "application/xml",
        "txt" | "md5mesh" | "md5anim" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "glsl" | "vert" | "frag" => "text/plain",
        _ => "application/octet-stream",
    };

    essence.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("/a/b.PNG").essence_str(), "image/png");
        assert_eq!(guess_mime("scene.gltf").essence_str(), "model/gltf+json");
        assert_eq!(guess_mime("noext"), mime::APPLICATION_OCTET_STREAM);
        assert_eq!(guess_mime("dir.d/noext"), mime::APPLICATION_OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_store_fetcher_reads_object() {
        let fetcher = StoreFetcher::in_memory();
        fetcher.put("/models/a.json", r#"{"a":1}"#).await.unwrap();

        let url = Url::parse("mem:///models/a.json").unwrap();
        let response = fetcher.fetch(&url, &[]).await.unwrap();

        assert_eq!(&response.body[..], br#"{"a":1}"#);
        assert_eq!(response.content_type.unwrap().essence_str(), "application/json");
    }

    #[tokio::test]
    async fn test_store_fetcher_not_found() {
        let fetcher = StoreFetcher::in_memory();
        let url = Url::parse("mem:///missing.txt").unwrap();
        let err = fetcher.fetch(&url, &[]).await.unwrap_err();
        assert!(matches!(err, DownloadError::NotFound(_)));
    }
}
