//! Content manager: artifact cache with load coalescing
//!
//! Every load is keyed by `"<target type>:<source>"`. A key is either
//! *loaded* (the resolved [`Asset`]) or *loading* (one shared pending task).
//! Both maps live behind one mutex so that a second caller for a key always
//! observes the first caller's pending task, and the task's completion moves
//! the key from `loading` to `loaded` atomically.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, try_join_all};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::download::{DownloadCache, DownloadRequest, RawAsset};
use crate::error::{ContentError, Result};
use crate::observability::Metrics;
use crate::pipeline::{Asset, LoaderRegistry, Pipeline, PipelineContext, TypeTag};

/// Artifact cache key; displays as `"<target>:<source>"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub target: TypeTag,
    pub source: String,
}

impl CacheKey {
    pub fn new(target: TypeTag, source: impl Into<String>) -> Self {
        Self {
            target,
            source: source.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target, self.source)
    }
}

type PendingLoad = Shared<BoxFuture<'static, Result<Asset>>>;

#[derive(Default)]
struct Artifacts {
    loaded: HashMap<CacheKey, Asset>,
    loading: HashMap<CacheKey, PendingLoad>,
    /// Bumped by `unload`; chains started before it do not populate `loaded`.
    generation: u64,
}

struct Inner {
    pipeline: Pipeline,
    downloads: Arc<DownloadCache>,
    remap: RwLock<BTreeMap<String, String>>,
    metrics: Arc<Metrics>,
    artifacts: Mutex<Artifacts>,
}

/// Public entry point for loading typed content.
///
/// Cloning is cheap; clones share the artifact cache. Separate managers may
/// share a [`LoaderRegistry`] and a [`DownloadCache`] but never artifacts.
#[derive(Clone)]
pub struct ContentManager {
    inner: Arc<Inner>,
}

impl ContentManager {
    pub fn new(registry: Arc<LoaderRegistry>, downloads: Arc<DownloadCache>) -> Self {
        let metrics = downloads.metrics().clone();
        Self {
            inner: Arc::new(Inner {
                pipeline: Pipeline::new(registry, metrics.clone()),
                downloads,
                remap: RwLock::new(BTreeMap::new()),
                metrics,
                artifacts: Mutex::new(Artifacts::default()),
            }),
        }
    }

    /// Builds a manager with its own download cache and the configured remap
    /// rules. Expects a validated configuration.
    pub fn from_config(config: &Config, registry: Arc<LoaderRegistry>) -> Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let downloads = DownloadCache::from_config(&config.download, metrics)?;
        let manager = Self::new(registry, Arc::new(downloads));
        for rule in &config.content.remap {
            manager.remap(rule.from.clone(), rule.to.clone());
        }
        Ok(manager)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    pub fn registry(&self) -> &Arc<LoaderRegistry> {
        self.inner.pipeline.registry()
    }

    pub fn downloads(&self) -> &Arc<DownloadCache> {
        &self.inner.downloads
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Serves loads of `from` from `to` instead.
    pub fn remap(&self, from: impl Into<String>, to: impl Into<String>) {
        self.inner.remap.write().insert(from.into(), to.into());
    }

    /// Follows remap rules from `source`; stops on a cycle.
    pub fn remapped(&self, source: &str) -> String {
        let table = self.inner.remap.read();
        let mut current = source;
        for _ in 0..table.len() {
            match table.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.to_string()
    }

    pub fn cache_key(&self, source: &str, target: &TypeTag) -> CacheKey {
        CacheKey::new(target.clone(), self.remapped(source))
    }

    pub async fn load(&self, source: &str, target: impl Into<TypeTag>) -> Result<Asset> {
        self.load_with(source, target, Value::Null).await
    }

    /// Loads `source` as `target`.
    ///
    /// A resolved key is returned from the cache; a key that is being loaded
    /// returns the pending load; otherwise a new chain starts. `options` are
    /// only seen by the chain that actually runs and do not affect the key.
    pub async fn load_with(
        &self,
        source: &str,
        target: impl Into<TypeTag>,
        options: Value,
    ) -> Result<Asset> {
        let key = self.cache_key(source, &target.into());
        self.inner.metrics.load_requested();

        let pending = {
            let mut artifacts = self.inner.artifacts.lock();
            if let Some(asset) = artifacts.loaded.get(&key) {
                self.inner.metrics.cache_hit();
                debug!(key = %key, "Artifact cache hit");
                return Ok(asset.clone());
            }

            match artifacts.loading.get(&key) {
                Some(pending) => {
                    self.inner.metrics.load_coalesced();
                    debug!(key = %key, "Joining pending load");
                    pending.clone()
                }
                None => {
                    let pending = self.start(key.clone(), options, artifacts.generation);
                    artifacts.loading.insert(key, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Loads and downcasts, failing with `TypeMismatch` for another type.
    pub async fn load_as<T: Any + Send + Sync>(
        &self,
        source: &str,
        target: impl Into<TypeTag>,
    ) -> Result<Arc<T>> {
        let target = target.into();
        let asset = self.load(source, target.clone()).await?;
        asset.downcast::<T>().ok_or_else(|| ContentError::TypeMismatch {
            key: self.cache_key(source, &target).to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Loads every request concurrently; results keep request order.
    pub async fn load_all<I, S, T>(&self, requests: I) -> Result<Vec<Asset>>
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<TypeTag>,
    {
        let requests: Vec<(String, TypeTag)> = requests
            .into_iter()
            .map(|(source, target)| (source.into(), target.into()))
            .collect();

        try_join_all(
            requests
                .iter()
                .map(|(source, target)| self.load(source, target.clone())),
        )
        .await
    }

    /// Converts an in-memory value; nothing is cached.
    pub async fn convert(&self, from: TypeTag, to: TypeTag, value: Asset) -> Result<Asset> {
        self.inner
            .pipeline
            .run_value(self, from, to, value, None)
            .await
    }

    pub async fn download(&self, request: impl Into<DownloadRequest>) -> Result<Arc<RawAsset>> {
        Ok(self.inner.downloads.download(request).await?)
    }

    /// Whether a chain from `source` to `target` is registered.
    ///
    /// Sources without an extension are typed by their response at load
    /// time, so this is only answered for the wildcard handlers.
    pub fn can_load(&self, source: &str, target: impl Into<TypeTag>) -> bool {
        let source_type = TypeTag::of_source(&self.remapped(source));
        self.inner.pipeline.can_load(&source_type, &target.into())
    }

    /// The resolved asset for a key, without loading.
    pub fn get(&self, source: &str, target: impl Into<TypeTag>) -> Option<Asset> {
        let key = self.cache_key(source, &target.into());
        self.inner.artifacts.lock().loaded.get(&key).cloned()
    }

    pub fn is_loading(&self, source: &str, target: impl Into<TypeTag>) -> bool {
        let key = self.cache_key(source, &target.into());
        self.inner.artifacts.lock().loading.contains_key(&key)
    }

    /// Keys of resolved artifacts, sorted.
    pub fn cached_keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.inner.artifacts.lock().loaded.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drops every artifact, running disposal hooks.
    ///
    /// A failing hook is logged and does not stop the sweep. Loads still in
    /// flight complete for their callers but are not cached. Returns the
    /// number of artifacts removed.
    pub fn unload(&self) -> usize {
        let removed: Vec<(CacheKey, Asset)> = {
            let mut artifacts = self.inner.artifacts.lock();
            artifacts.generation += 1;
            artifacts.loading.clear();
            artifacts.loaded.drain().collect()
        };

        for (key, asset) in &removed {
            self.dispose(key, asset);
        }
        info!(count = removed.len(), "Unloaded artifacts");
        removed.len()
    }

    /// Drops one resolved artifact, running its disposal hook.
    pub fn unload_asset(&self, source: &str, target: impl Into<TypeTag>) -> bool {
        let key = self.cache_key(source, &target.into());
        let removed = self.inner.artifacts.lock().loaded.remove(&key);
        match removed {
            Some(asset) => {
                self.dispose(&key, &asset);
                true
            }
            None => false,
        }
    }

    fn start(&self, key: CacheKey, options: Value, generation: u64) -> PendingLoad {
        let manager = self.clone();
        let task = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(manager.resolve(&key, options))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(ContentError::Aborted(format!("loader panicked on {key}"))));
            manager.settle(&key, generation, &outcome);
            outcome
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(ContentError::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }

    async fn resolve(&self, key: &CacheKey, options: Value) -> Result<Asset> {
        debug!(key = %key, "Resolving");
        let mut ctx =
            PipelineContext::for_source(self.clone(), key.source.clone(), key.target.clone(), options);

        match self.inner.pipeline.run(&mut ctx).await {
            Ok(asset) => {
                info!(key = %key, asset = asset.type_name(), "Loaded");
                Ok(asset)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Load failed");
                Err(e)
            }
        }
    }

    fn settle(&self, key: &CacheKey, generation: u64, outcome: &Result<Asset>) {
        let mut artifacts = self.inner.artifacts.lock();
        if artifacts.generation != generation {
            debug!(key = %key, "Discarding load that finished after unload");
            return;
        }

        artifacts.loading.remove(key);
        match outcome {
            Ok(asset) => {
                artifacts.loaded.insert(key.clone(), asset.clone());
            }
            Err(_) => self.inner.metrics.load_failed(),
        }
    }

    fn dispose(&self, key: &CacheKey, asset: &Asset) {
        if !asset.is_disposable() {
            return;
        }
        match asset.dispose() {
            Ok(()) => self.inner.metrics.disposed(),
            Err(e) => {
                self.inner.metrics.disposal_failed();
                warn!(key = %key, error = %e, "Disposal failed");
            }
        }
    }
}

impl fmt::Debug for ContentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let artifacts = self.inner.artifacts.lock();
        f.debug_struct("ContentManager")
            .field("loaded", &artifacts.loaded.len())
            .field("loading", &artifacts.loading.len())
            .field("base", &self.inner.downloads.base().as_str())
            .finish()
    }
}
