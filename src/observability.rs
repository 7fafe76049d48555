//! Counters for loads, downloads and disposal

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle shared by a content manager and its download cache
#[derive(Debug, Default)]
pub struct Metrics {
    loads_requested: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
    resolutions: AtomicU64,
    handler_invocations: AtomicU64,
    downloads: AtomicU64,
    download_cache_hits: AtomicU64,
    failures: AtomicU64,
    disposals: AtomicU64,
    disposal_failures: AtomicU64,
}

macro_rules! counter {
    ($method:ident, $field:ident) => {
        pub fn $method(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(counter = stringify!($field), "Metric incremented");
        }
    };
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(load_requested, loads_requested);
    counter!(cache_hit, cache_hits);
    counter!(load_coalesced, coalesced);
    counter!(resolution_started, resolutions);
    counter!(handler_invoked, handler_invocations);
    counter!(download_started, downloads);
    counter!(download_cache_hit, download_cache_hits);
    counter!(load_failed, failures);
    counter!(disposed, disposals);
    counter!(disposal_failed, disposal_failures);

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            loads_requested: self.loads_requested.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            handler_invocations: self.handler_invocations.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            download_cache_hits: self.download_cache_hits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            disposals: self.disposals.load(Ordering::Relaxed),
            disposal_failures: self.disposal_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub loads_requested: u64,
    pub cache_hits: u64,
    pub coalesced: u64,
    pub resolutions: u64,
    pub handler_invocations: u64,
    pub downloads: u64,
    pub download_cache_hits: u64,
    pub failures: u64,
    pub disposals: u64,
    pub disposal_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.load_requested();
        metrics.load_requested();
        metrics.download_started();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.loads_requested, 2);
        assert_eq!(snapshot.downloads, 1);
        assert_eq!(snapshot.failures, 0);
    }
}
