//! Fingerprint-keyed response cache with TTL, LRU eviction and
//! single-flight computation (§4.6).
//!
//! Grounded on the teacher's `service.rs` `INSTANCES: Lazy<BlockingLruCache<PathBuf,
//! Arc<RetrievalService>>>` pattern — an LRU cache of `Arc<T>` guarded for
//! concurrent access — generalized from "service instance cache keyed by
//! workdir" to "response cache keyed by fingerprint", with TTL and
//! single-flight added per the spec contract. Single-flight is built on
//! `tokio::sync::OnceCell`: concurrent callers for the same fingerprint
//! share one `Arc<OnceCell<_>>` slot, so only the first caller's future
//! ever runs the underlying computation — the idiomatic async replacement
//! for a promise-based in-flight map (§9 "global mutable singletons").

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use lru::LruCache;
use tokio::sync::OnceCell;

use crate::error::CoreError;
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use crate::types::Fingerprint;

/// Which logical kind of data an entry represents, for `clear(scope, ..)`
/// (§4.6 "Invalidations"). This core only ever produces `Results` entries
/// (full pipeline responses); the other variants exist so the scope enum
/// matches the spec's contract and so a future cache producer (search-only
/// or embeddings-only entries) has somewhere to plug in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntryKind {
    Search,
    Embeddings,
    Results,
}

/// Scope argument to [`ResponseCache::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Search,
    Embeddings,
    Results,
}

/// A cached payload plus the tags needed to answer `clear(scope, pattern)`
/// without re-deriving them from the opaque fingerprint hash.
struct Entry<T> {
    payload: Arc<T>,
    kind: CacheEntryKind,
    tags: Vec<String>,
    expires_at: Instant,
}

enum Slot<T> {
    Ready(Entry<T>),
    Pending(Arc<OnceCell<Arc<T>>>),
}

struct Inner<T> {
    slots: LruCache<Fingerprint, Slot<T>>,
}

/// Snapshot of cache occupancy, for diagnostics (`cacheStats()`, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
}

/// Fingerprint-keyed cache of pipeline responses.
///
/// `T` is the cached payload type (the pipeline's response struct). The
/// cache never inspects `T`; it only clones the `Arc` and tracks TTL/tags.
pub struct ResponseCache<T> {
    inner: Mutex<Inner<T>>,
    ttl: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl<T: Send + Sync + 'static> ResponseCache<T> {
    pub fn new(max_entries: usize, ttl: Duration, metrics: Arc<PipelineMetrics>) -> Self {
        let capacity = std::num::NonZeroUsize::new(max_entries.max(1)).expect("capacity > 0");
        Self {
            inner: Mutex::new(Inner { slots: LruCache::new(capacity) }),
            ttl,
            metrics,
        }
    }

    /// Look up `fingerprint`. Returns `None` on a miss or an expired entry
    /// (expired entries are evicted lazily, right here, per §4.6).
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<T>> {
        let mut inner = self.inner.lock().ok()?;
        match inner.slots.get(fingerprint) {
            Some(Slot::Ready(entry)) if entry.expires_at > Instant::now() => {
                let payload = Arc::clone(&entry.payload);
                self.metrics.record_cache_hit();
                Some(payload)
            }
            Some(Slot::Ready(_)) => {
                inner.slots.pop(fingerprint);
                self.metrics.record_cache_miss();
                None
            }
            _ => {
                self.metrics.record_cache_miss();
                None
            }
        }
    }

    /// Fetch-or-compute with single-flight semantics: at most one
    /// concurrent computation runs per fingerprint (§4.6, §8 invariant 4).
    /// `compute` is only ever invoked by the caller that wins the race to
    /// populate the slot; followers await that same computation.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        kind: CacheEntryKind,
        tags: Vec<String>,
        compute: F,
    ) -> Result<(Arc<T>, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get(&fingerprint) {
            return Ok((hit, true));
        }

        let cell = {
            let mut inner = self.inner.lock().map_err(|_| CoreError::internal("cache mutex poisoned"))?;
            match inner.slots.get(&fingerprint) {
                Some(Slot::Pending(cell)) => Arc::clone(cell),
                Some(Slot::Ready(entry)) if entry.expires_at > Instant::now() => {
                    let payload = Arc::clone(&entry.payload);
                    drop(inner);
                    self.metrics.record_cache_hit();
                    return Ok((payload, true));
                }
                _ => {
                    let cell = Arc::new(OnceCell::new());
                    inner.slots.put(fingerprint, Slot::Pending(Arc::clone(&cell)));
                    cell
                }
            }
        };

        let result = cell
            .get_or_try_init(|| async { compute().await.map(Arc::new) })
            .await;

        match result {
            Ok(payload) => {
                let mut inner = self.inner.lock().map_err(|_| CoreError::internal("cache mutex poisoned"))?;
                inner.slots.put(
                    fingerprint,
                    Slot::Ready(Entry {
                        payload: Arc::clone(payload),
                        kind,
                        tags,
                        expires_at: Instant::now() + self.ttl,
                    }),
                );
                drop(inner);
                self.metrics.record_cache_miss();
                Ok((Arc::clone(payload), false))
            }
            Err(e) => {
                // Leave no pending slot behind on failure so the next
                // caller gets to retry rather than waiting on a cell that
                // will never resolve (OnceCell::get_or_try_init already
                // leaves the cell empty on error; drop our reference too).
                if let Ok(mut inner) = self.inner.lock() {
                    if let Some(Slot::Pending(existing)) = inner.slots.peek(&fingerprint) {
                        if Arc::ptr_eq(existing, &cell) {
                            inner.slots.pop(&fingerprint);
                        }
                    }
                }
                Err(clone_error(e))
            }
        }
    }

    /// Remove entries per §4.6's invalidation contract. `All` clears
    /// everything; the other scopes remove only entries of the matching
    /// `kind`, additionally filtered by `pattern` (a substring match
    /// against the entry's tags) when supplied.
    pub fn clear(&self, scope: ClearScope, pattern: Option<&str>) {
        let Ok(mut inner) = self.inner.lock() else { return };
        if scope == ClearScope::All && pattern.is_none() {
            inner.slots.clear();
            return;
        }

        let keys: Vec<Fingerprint> = inner
            .slots
            .iter()
            .filter(|(_, slot)| matches_scope(slot, scope, pattern))
            .map(|(k, _)| *k)
            .collect();
        for key in keys {
            inner.slots.pop(&key);
        }
    }

    /// Lazily sweep TTL-expired entries. Intended to be called from a
    /// periodic background task (§4.6 "actively by a periodic sweeper");
    /// also safe to call inline from a test.
    pub fn sweep_expired(&self) -> usize {
        let Ok(mut inner) = self.inner.lock() else { return 0 };
        let now = Instant::now();
        let expired: Vec<Fingerprint> = inner
            .slots
            .iter()
            .filter_map(|(k, slot)| match slot {
                Slot::Ready(entry) if entry.expires_at <= now => Some(*k),
                _ => None,
            })
            .collect();
        let count = expired.len();
        for key in expired {
            inner.slots.pop(&key);
        }
        count
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().ok();
        let (entries, capacity) = inner
            .map(|i| (i.slots.len(), i.slots.cap().get()))
            .unwrap_or((0, 0));
        CacheStats { entries, capacity }
    }
}

fn matches_scope<T>(slot: &Slot<T>, scope: ClearScope, pattern: Option<&str>) -> bool {
    let Slot::Ready(entry) = slot else { return scope == ClearScope::All };
    let kind_matches = match scope {
        ClearScope::All => true,
        ClearScope::Search => entry.kind == CacheEntryKind::Search,
        ClearScope::Embeddings => entry.kind == CacheEntryKind::Embeddings,
        ClearScope::Results => entry.kind == CacheEntryKind::Results,
    };
    if !kind_matches {
        return false;
    }
    match pattern {
        None => true,
        Some(p) => entry.tags.iter().any(|tag| tag.contains(p)),
    }
}

/// `CoreError` is not `Clone`; single-flight followers and the leader each
/// need their own copy of a failure. Since every variant is built from
/// owned strings/primitives, reconstruct rather than derive `Clone` on the
/// whole error enum (which would force every transport error through it).
fn clone_error(e: &CoreError) -> CoreError {
    match e {
        CoreError::ConfigError { message } => CoreError::ConfigError { message: message.clone() },
        CoreError::BackendTransientError { status, method, path, attempt } => CoreError::BackendTransientError {
            status: *status,
            method: method.clone(),
            path: path.clone(),
            attempt: *attempt,
        },
        CoreError::BackendPermanentError { status, method, path } => CoreError::BackendPermanentError {
            status: *status,
            method: method.clone(),
            path: path.clone(),
        },
        CoreError::ValidationError { reason } => CoreError::ValidationError { reason: reason.clone() },
        CoreError::Cancelled { reason } => CoreError::Cancelled { reason: reason.clone() },
        CoreError::EmbeddingFailed { cause } => CoreError::EmbeddingFailed { cause: cause.clone() },
        CoreError::Internal { cause } => CoreError::Internal { cause: cause.clone() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Query;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    fn fp(text: &str) -> Fingerprint {
        Fingerprint::compute(&Query::new(text))
    }

    #[tokio::test]
    async fn miss_then_hit_after_compute() {
        let cache: ResponseCache<i32> = ResponseCache::new(10, Duration::from_secs(60), Arc::new(PipelineMetrics::new()));
        let key = fp("find the bug");

        let (value, hit) = cache
            .get_or_compute(key, CacheEntryKind::Results, vec![], || async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(*value, 42);
        assert!(!hit);

        let (value2, hit2) = cache
            .get_or_compute(key, CacheEntryKind::Results, vec![], || async { Ok(99) })
            .await
            .unwrap();
        assert_eq!(*value2, 42);
        assert!(hit2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_single_computation() {
        let cache: Arc<ResponseCache<i32>> =
            Arc::new(ResponseCache::new(10, Duration::from_secs(60), Arc::new(PipelineMetrics::new())));
        let key = fp("find the bug");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(key, CacheEntryKind::Results, vec![], || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(7)
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|(value, _)| **value == 7));
    }

    #[tokio::test]
    async fn failed_computation_does_not_poison_the_slot() {
        let cache: ResponseCache<i32> = ResponseCache::new(10, Duration::from_secs(60), Arc::new(PipelineMetrics::new()));
        let key = fp("find the bug");

        let err = cache
            .get_or_compute(key, CacheEntryKind::Results, vec![], || async {
                Err(CoreError::internal("boom"))
            })
            .await;
        assert!(err.is_err());

        let (value, hit) = cache
            .get_or_compute(key, CacheEntryKind::Results, vec![], || async { Ok(5) })
            .await
            .unwrap();
        assert_eq!(*value, 5);
        assert!(!hit);
    }

    #[tokio::test]
    async fn expired_entries_are_treated_as_absent() {
        let cache: ResponseCache<i32> = ResponseCache::new(10, Duration::from_millis(10), Arc::new(PipelineMetrics::new()));
        let key = fp("find the bug");
        cache
            .get_or_compute(key, CacheEntryKind::Results, vec![], || async { Ok(1) })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test]
    async fn clear_all_empties_the_cache() {
        let cache: ResponseCache<i32> = ResponseCache::new(10, Duration::from_secs(60), Arc::new(PipelineMetrics::new()));
        let key = fp("find the bug");
        cache
            .get_or_compute(key, CacheEntryKind::Results, vec![], || async { Ok(1) })
            .await
            .unwrap();

        cache.clear(ClearScope::All, None);
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test]
    async fn clear_by_pattern_only_removes_matching_tags() {
        let cache: ResponseCache<i32> = ResponseCache::new(10, Duration::from_secs(60), Arc::new(PipelineMetrics::new()));
        let rust_key = fp("find the bug in rust");
        let python_key = fp("find the bug in python");
        cache
            .get_or_compute(rust_key, CacheEntryKind::Results, vec!["lang:rust".to_string()], || async { Ok(1) })
            .await
            .unwrap();
        cache
            .get_or_compute(python_key, CacheEntryKind::Results, vec!["lang:python".to_string()], || async { Ok(2) })
            .await
            .unwrap();

        cache.clear(ClearScope::Results, Some("rust"));
        assert!(cache.get(&rust_key).is_none());
        assert!(cache.get(&python_key).is_some());
    }

    #[tokio::test]
    async fn sweep_expired_evicts_only_stale_entries() {
        let cache: ResponseCache<i32> = ResponseCache::new(10, Duration::from_millis(10), Arc::new(PipelineMetrics::new()));
        let key = fp("find the bug");
        cache
            .get_or_compute(key, CacheEntryKind::Results, vec![], || async { Ok(1) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.sweep_expired(), 1);
    }
}
