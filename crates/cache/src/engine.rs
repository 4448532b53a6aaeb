use confluence_core::{MarketError, MarketResult, Timestamp};
use confluence_ports::Clock;
use dashmap::{DashMap, DashSet};
use futures_util::FutureExt;
use regex::Regex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::{debug, warn};

use crate::entry::{BoxError, CacheEntry, RefreshFn};
use crate::options::{CacheConfig, CacheOptions, CachePriority};
use crate::stats::{CacheStatistics, Counters};

type Weigher<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

/// Get-or-compute cache with tag invalidation and background refresh
///
/// Lookups and writes lock only the shard holding the key. Misses are
/// single-flight per key: concurrent callers for the same missing key wait
/// for one factory call and share its result. Hits past the refresh
/// threshold re-run the stored factory on a detached task while the current
/// value keeps being served.
///
/// Cloning is cheap and every clone shares the same entries.
pub struct CacheEngine<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for CacheEngine<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<V> {
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    entries: DashMap<String, CacheEntry<V>>,
    /// tag -> keys carrying it
    tags: DashMap<String, HashSet<String>>,
    /// Per-key single-flight locks for the miss path
    flights: DashMap<String, Arc<AsyncMutex<()>>>,
    /// Keys with a background refresh in flight
    refreshing: DashSet<String>,
    refresh_slots: Arc<Semaphore>,
    counters: Counters,
    weigher: Weigher<V>,
}

/// Releases a key's refresh guard when the refresh task ends, however it ends
struct RefreshGuard<V> {
    inner: Arc<Inner<V>>,
    key: String,
}

impl<V> Drop for RefreshGuard<V> {
    fn drop(&mut self) {
        self.inner.refreshing.remove(&self.key);
    }
}

enum Lookup<V> {
    Hit(V, Option<RefreshFn<V>>),
    Miss,
}

impl<V> CacheEngine<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an engine that weighs every entry as `size_of::<V>()`
    pub fn new(clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self::with_weigher(clock, config, |_: &V| std::mem::size_of::<V>())
    }

    /// Create an engine with a custom size estimate for `approx_size`
    pub fn with_weigher(
        clock: Arc<dyn Clock>,
        config: CacheConfig,
        weigher: impl Fn(&V) -> usize + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                config,
                entries: DashMap::new(),
                tags: DashMap::new(),
                flights: DashMap::new(),
                refreshing: DashSet::new(),
                refresh_slots: Arc::new(Semaphore::new(config.max_concurrent_refreshes.max(1))),
                counters: Counters::default(),
                weigher: Arc::new(weigher),
            }),
        }
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    ///
    /// Factory errors propagate to the caller and nothing is cached. With
    /// background refresh enabled the factory is kept and re-run off the
    /// request path; errors there are logged and the cached value stays.
    /// Invalid `options` fail before the cache is consulted.
    pub async fn get_or_set<F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        options: &CacheOptions,
    ) -> Result<V, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: std::error::Error + From<MarketError> + Send + Sync + 'static,
    {
        options.validate()?;
        if let Lookup::Hit(value, refresh) = self.inner.lookup(key) {
            if let Some(refresh) = refresh {
                self.inner.spawn_refresh(key, refresh);
            }
            return Ok(value);
        }

        let flight = self
            .inner
            .flights
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let result = {
            let _in_flight = flight.lock().await;
            // Another caller may have filled the key while we waited
            match self.inner.lookup(key) {
                Lookup::Hit(value, _) => Ok(value),
                Lookup::Miss => {
                    Counters::bump(&self.inner.counters.misses);
                    debug!(key, "Cache miss, computing");
                    let factory = Arc::new(factory);
                    match factory().await {
                        Ok(value) => {
                            let refresh = options
                                .enable_background_refresh
                                .then(|| boxed_refresh(Arc::clone(&factory)));
                            self.inner.insert(key, value.clone(), options, refresh);
                            Ok(value)
                        }
                        Err(e) => Err(e),
                    }
                }
            }
        };
        drop(flight);
        self.inner
            .flights
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Store `value` without a factory, replacing any existing entry
    pub fn warm_up(&self, key: &str, value: V, options: &CacheOptions) -> MarketResult<()> {
        options.validate()?;
        debug!(key, "Cache warm-up");
        self.inner.insert(key, value, options, None);
        Ok(())
    }

    /// Whether `key` holds an unexpired value; does not count as a hit
    pub fn contains(&self, key: &str) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.remove(key)
    }

    /// Remove every entry tagged `tag`; returns how many were removed
    pub fn remove_by_tag(&self, tag: &str) -> usize {
        let Some((_, keys)) = self.inner.tags.remove(tag) else {
            return 0;
        };
        let removed = keys.iter().filter(|k| self.inner.remove(k)).count();
        debug!(tag, removed, "Removed cache entries by tag");
        removed
    }

    /// Remove every key matching `pattern`; an invalid pattern fails `InvalidParameter`
    pub fn remove_by_pattern(&self, pattern: &str) -> MarketResult<usize> {
        let regex = Regex::new(pattern)
            .map_err(|e| MarketError::invalid(format!("invalid cache key pattern: {}", e)))?;
        let keys: Vec<String> = self
            .inner
            .entries
            .iter()
            .filter(|e| regex.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect();
        let removed = keys.iter().filter(|k| self.inner.remove(k)).count();
        debug!(pattern, removed, "Removed cache entries by pattern");
        Ok(removed)
    }

    /// Drop expired entries; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    pub fn clear(&self) {
        self.inner.entries.clear();
        self.inner.tags.clear();
    }

    pub fn statistics(&self) -> CacheStatistics {
        let size = self.inner.entries.iter().map(|e| e.weight).sum();
        self.inner
            .counters
            .snapshot(self.inner.entries.len(), size)
    }
}

fn boxed_refresh<V, F, Fut, E>(factory: Arc<F>) -> RefreshFn<V>
where
    V: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(move || {
        let fut = factory();
        async move { fut.await.map_err(|e| Box::new(e) as BoxError) }.boxed()
    })
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn lookup(&self, key: &str) -> Lookup<V> {
        let now = self.clock.now();
        match self.entries.get_mut(key) {
            None => return Lookup::Miss,
            Some(mut entry) if !entry.is_expired(now) => {
                entry.touch(now);
                Counters::bump(&self.counters.hits);
                debug!(key, "Cache hit");
                return Lookup::Hit(entry.value.clone(), entry.refresh_due(now));
            }
            Some(_) => {}
        }
        // Removes only if still expired under the shard lock
        if let Some((_, entry)) = self.entries.remove_if(key, |_, e| e.is_expired(now)) {
            debug!(key, "Cache entry expired");
            self.untag(key, &entry.tags);
        }
        Lookup::Miss
    }

    fn insert(
        &self,
        key: &str,
        value: V,
        options: &CacheOptions,
        refresh: Option<RefreshFn<V>>,
    ) {
        let now = self.clock.now();
        let weight = (self.weigher)(&value);
        let entry = CacheEntry::new(value, now, options, refresh, weight);
        let tags = entry.tags.clone();

        if let Some(previous) = self.entries.insert(key.to_string(), entry) {
            self.untag(key, &previous.tags);
        }
        for tag in tags {
            self.tags.entry(tag).or_default().insert(key.to_string());
        }

        if self.entries.len() > self.config.max_entries {
            self.enforce_capacity();
        }
    }

    fn remove(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.untag(key, &entry.tags);
                true
            }
            None => false,
        }
    }

    fn untag(&self, key: &str, tags: &[String]) {
        for tag in tags {
            self.tags.remove_if_mut(tag, |_, keys| {
                keys.remove(key);
                keys.is_empty()
            });
        }
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        expired.iter().filter(|k| self.remove(k)).count()
    }

    /// Purge expired entries, then evict the lowest-priority,
    /// least-recently-used entries until back under `max_entries`
    fn enforce_capacity(&self) {
        self.purge_expired();
        let excess = self.entries.len().saturating_sub(self.config.max_entries);
        if excess == 0 {
            return;
        }

        let mut candidates: Vec<(CachePriority, Timestamp, String)> = self
            .entries
            .iter()
            .filter(|e| e.priority != CachePriority::NeverRemove)
            .map(|e| (e.priority, e.last_access, e.key().clone()))
            .collect();
        candidates.sort();

        let evicted = candidates
            .into_iter()
            .take(excess)
            .filter(|(_, _, key)| self.remove(key))
            .count();
        Counters::add(&self.counters.evictions, evicted as u64);
        debug!(evicted, "Evicted cache entries over capacity");
    }

    /// Refresh `key` on a detached task unless one is already running
    fn spawn_refresh(self: &Arc<Self>, key: &str, refresh: RefreshFn<V>) {
        if !self.refreshing.insert(key.to_string()) {
            return;
        }
        let guard = RefreshGuard {
            inner: Arc::clone(self),
            key: key.to_string(),
        };
        let Ok(permit) = Arc::clone(&self.refresh_slots).try_acquire_owned() else {
            debug!(key, "Refresh slots busy, skipping background refresh");
            return;
        };

        tokio::spawn(async move {
            let _permit = permit;
            let inner = Arc::clone(&guard.inner);
            match refresh().await {
                Ok(value) => {
                    let now = inner.clock.now();
                    let weight = (inner.weigher)(&value);
                    // Only the entry this refresh was started for
                    let current = inner.entries.get_mut(&guard.key).filter(|entry| {
                        entry
                            .refresh
                            .as_ref()
                            .is_some_and(|stored| Arc::ptr_eq(stored, &refresh))
                    });
                    match current {
                        Some(mut entry) => {
                            entry.replace(value, now, weight);
                            Counters::bump(&inner.counters.refreshes);
                            debug!(key = %guard.key, "Background refresh stored");
                        }
                        None => debug!(key = %guard.key, "Entry replaced, refresh discarded"),
                    }
                }
                Err(e) => {
                    Counters::bump(&inner.counters.refresh_failures);
                    warn!(
                        key = %guard.key,
                        error = %e,
                        "Background refresh failed, keeping cached value"
                    );
                }
            }
            drop(guard);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confluence_clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("factory failed: {0}")]
    struct FactoryError(&'static str);

    impl From<MarketError> for FactoryError {
        fn from(_: MarketError) -> Self {
            FactoryError("rejected options")
        }
    }

    fn engine(clock: &Arc<ManualClock>) -> CacheEngine<u32> {
        CacheEngine::new(clock.clone(), CacheConfig::default())
    }

    /// Factory returning 1, 2, 3... and counting its calls
    fn counting(
        calls: &Arc<AtomicU32>,
    ) -> impl Fn() -> futures_util::future::Ready<Result<u32, FactoryError>> + Send + Sync + 'static
    {
        let calls = Arc::clone(calls);
        move || futures_util::future::ready(Ok(calls.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_factory_runs_once_within_ttl() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let options = CacheOptions::new(Duration::from_secs(60));

        assert_eq!(cache.get_or_set("k", counting(&calls), &options).await.unwrap(), 1);
        clock.advance(Duration::from_secs(30));
        assert_eq!(cache.get_or_set("k", counting(&calls), &options).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(31));
        assert_eq!(cache.get_or_set("k", counting(&calls), &options).await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stats = cache.statistics();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.approx_count, 1);
        assert_eq!(stats.approx_size, std::mem::size_of::<u32>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_are_single_flight() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let options = CacheOptions::new(Duration::from_secs(60));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            let options = options.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set(
                        "slow",
                        move || {
                            let calls = Arc::clone(&calls);
                            async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(50)).await;
                                Ok::<_, FactoryError>(99)
                            }
                        },
                        &options,
                    )
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 99);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.statistics().misses, 1);
    }

    #[tokio::test]
    async fn test_factory_error_propagates_and_is_not_cached() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let options = CacheOptions::new(Duration::from_secs(60));

        let err = cache
            .get_or_set("k", || async { Err(FactoryError("upstream down")) }, &options)
            .await
            .unwrap_err();
        assert_eq!(err.0, "upstream down");
        assert!(!cache.contains("k"));

        let calls = Arc::new(AtomicU32::new(0));
        assert_eq!(cache.get_or_set("k", counting(&calls), &options).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sliding_expiration_renews_on_access() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let options = CacheOptions::new(Duration::from_secs(100))
            .with_sliding_expiration(Duration::from_secs(10));

        cache.get_or_set("k", counting(&calls), &options).await.unwrap();
        for _ in 0..5 {
            clock.advance(Duration::from_secs(8));
            cache.get_or_set("k", counting(&calls), &options).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(11));
        assert!(!cache.contains("k"));
        cache.get_or_set("k", counting(&calls), &options).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_background_refresh_replaces_value() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let options = CacheOptions::new(Duration::from_secs(100)).with_background_refresh(0.5);

        assert_eq!(cache.get_or_set("k", counting(&calls), &options).await.unwrap(), 1);
        clock.advance(Duration::from_secs(60));
        // Stale-while-revalidate: this hit still returns the old value
        assert_eq!(cache.get_or_set("k", counting(&calls), &options).await.unwrap(), 1);
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get_or_set("k", counting(&calls), &options).await.unwrap(), 2);
        assert_eq!(cache.statistics().refreshes, 1);

        // The refresh restarted the lifetime
        clock.advance(Duration::from_secs(90));
        assert!(cache.contains("k"));
    }

    #[tokio::test]
    async fn test_background_refresh_failure_keeps_value() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let options = CacheOptions::new(Duration::from_secs(100)).with_background_refresh(0.5);

        let factory = {
            let calls = Arc::clone(&calls);
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(10)
                    } else {
                        Err(FactoryError("refresh broke"))
                    }
                }
            }
        };
        assert_eq!(cache.get_or_set("k", factory, &options).await.unwrap(), 10);
        clock.advance(Duration::from_secs(70));

        let untouched = || async { Err::<u32, _>(FactoryError("not called")) };
        assert_eq!(cache.get_or_set("k", untouched, &options).await.unwrap(), 10);
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.statistics().refresh_failures, 1);
        assert_eq!(cache.get_or_set("k", untouched, &options).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_refresh_is_single_flight_per_key() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let gate = Arc::new(tokio::sync::Notify::new());
        let options = CacheOptions::new(Duration::from_secs(100)).with_background_refresh(0.5);

        let factory = {
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let gate = Arc::clone(&gate);
                async move {
                    if n > 0 {
                        gate.notified().await;
                    }
                    Ok::<_, FactoryError>(n)
                }
            }
        };
        cache.get_or_set("k", factory, &options).await.unwrap();
        clock.advance(Duration::from_secs(80));

        for _ in 0..5 {
            let unused = || async { Ok::<u32, FactoryError>(1000) };
            cache.get_or_set("k", unused, &options).await.unwrap();
            settle().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        gate.notify_one();
        settle().await;
        assert_eq!(cache.statistics().refreshes, 1);
    }

    #[tokio::test]
    async fn test_tag_and_pattern_invalidation() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let btc = CacheOptions::new(Duration::from_secs(60)).with_tag("BTCUSDT");
        let eth = CacheOptions::new(Duration::from_secs(60)).with_tag("ETHUSDT");

        cache.warm_up("price:BTCUSDT", 1, &btc).unwrap();
        cache.warm_up("candles:BTCUSDT:0:1", 2, &btc).unwrap();
        cache.warm_up("price:ETHUSDT", 3, &eth).unwrap();
        cache.warm_up("candles:ETHUSDT:0:1", 4, &eth).unwrap();

        assert_eq!(cache.remove_by_tag("BTCUSDT"), 2);
        assert!(!cache.contains("price:BTCUSDT"));
        assert!(cache.contains("price:ETHUSDT"));
        assert_eq!(cache.remove_by_tag("BTCUSDT"), 0);

        assert_eq!(cache.remove_by_pattern(r"^candles:").unwrap(), 1);
        assert!(cache.contains("price:ETHUSDT"));
        assert!(matches!(
            cache.remove_by_pattern("(unclosed"),
            Err(MarketError::InvalidParameter(_))
        ));

        assert!(cache.remove("price:ETHUSDT"));
        assert!(!cache.remove("price:ETHUSDT"));
        // Tag index dropped the key along with the entry
        assert_eq!(cache.remove_by_tag("ETHUSDT"), 0);
    }

    #[tokio::test]
    async fn test_reinsert_moves_tags() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        cache.warm_up("k", 1, &CacheOptions::new(Duration::from_secs(60)).with_tag("old")).unwrap();
        cache.warm_up("k", 2, &CacheOptions::new(Duration::from_secs(60)).with_tag("new")).unwrap();
        assert_eq!(cache.remove_by_tag("old"), 0);
        assert_eq!(cache.remove_by_tag("new"), 1);
    }

    #[tokio::test]
    async fn test_capacity_eviction_order() {
        let clock = ManualClock::new();
        let cache: CacheEngine<u32> = CacheEngine::new(
            clock.clone(),
            CacheConfig {
                max_entries: 3,
                max_concurrent_refreshes: 1,
            },
        );
        let ttl = Duration::from_secs(600);
        let pinned = CacheOptions::new(ttl).with_priority(CachePriority::NeverRemove);
        cache.warm_up("pinned", 0, &pinned).unwrap();
        clock.advance(Duration::from_secs(1));
        cache.warm_up("low", 1, &CacheOptions::new(ttl).with_priority(CachePriority::Low)).unwrap();
        clock.advance(Duration::from_secs(1));
        cache.warm_up("normal-old", 2, &CacheOptions::new(ttl)).unwrap();
        clock.advance(Duration::from_secs(1));
        cache.warm_up("normal-new", 3, &CacheOptions::new(ttl)).unwrap();
        assert!(!cache.contains("low"));
        clock.advance(Duration::from_secs(1));
        let high = CacheOptions::new(ttl).with_priority(CachePriority::High);
        cache.warm_up("high", 4, &high).unwrap();

        assert!(cache.contains("pinned"));
        assert!(!cache.contains("normal-old"));
        assert!(cache.contains("normal-new"));
        assert!(cache.contains("high"));
        assert_eq!(cache.statistics().evictions, 2);
    }

    #[tokio::test]
    async fn test_capacity_prefers_expired_entries() {
        let clock = ManualClock::new();
        let cache: CacheEngine<u32> = CacheEngine::new(
            clock.clone(),
            CacheConfig {
                max_entries: 2,
                max_concurrent_refreshes: 1,
            },
        );
        let short = CacheOptions::new(Duration::from_secs(5)).with_priority(CachePriority::High);
        let long = CacheOptions::new(Duration::from_secs(600)).with_priority(CachePriority::Low);
        cache.warm_up("short", 1, &short).unwrap();
        cache.warm_up("long", 2, &long).unwrap();
        clock.advance(Duration::from_secs(10));
        cache.warm_up("third", 3, &CacheOptions::new(Duration::from_secs(600))).unwrap();

        assert!(cache.contains("long"));
        assert!(cache.contains("third"));
        assert_eq!(cache.statistics().evictions, 0);
        assert_eq!(cache.statistics().approx_count, 2);
    }

    #[tokio::test]
    async fn test_custom_weigher_and_clear() {
        let clock = ManualClock::new();
        let cache: CacheEngine<Vec<u8>> =
            CacheEngine::with_weigher(clock.clone(), CacheConfig::default(), |v: &Vec<u8>| v.len());
        let options = CacheOptions::new(Duration::from_secs(60));
        cache.warm_up("a", vec![0; 100], &options).unwrap();
        cache.warm_up("b", vec![0; 28], &options).unwrap();
        assert_eq!(cache.statistics().approx_size, 128);

        cache.clear();
        let stats = cache.statistics();
        assert_eq!(stats.approx_count, 0);
        assert_eq!(stats.approx_size, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        cache.warm_up("a", 1, &CacheOptions::new(Duration::from_secs(5))).unwrap();
        cache.warm_up("b", 2, &CacheOptions::new(Duration::from_secs(50))).unwrap();
        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.statistics().approx_count, 1);
    }

    #[tokio::test]
    async fn test_invalid_options_are_rejected() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let zero_ttl = CacheOptions::new(Duration::ZERO);

        let err = cache
            .get_or_set("k", counting(&calls), &zero_ttl)
            .await
            .unwrap_err();
        assert_eq!(err.0, "rejected options");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            cache.warm_up("k", 1, &zero_ttl),
            Err(MarketError::InvalidParameter(_))
        ));
        assert!(!cache.contains("k"));
    }

    #[tokio::test]
    async fn test_expired_lookup_leaves_fresh_entry() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let options = CacheOptions::new(Duration::from_secs(10)).with_tag("t");

        cache.get_or_set("k", counting(&calls), &options).await.unwrap();
        clock.advance(Duration::from_secs(11));
        cache.warm_up("k", 7, &options).unwrap();

        assert_eq!(cache.get_or_set("k", counting(&calls), &options).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.remove_by_tag("t"), 1);
    }

    #[tokio::test]
    async fn test_refresh_does_not_overwrite_newer_entry() {
        let clock = ManualClock::new();
        let cache = engine(&clock);
        let gate = Arc::new(tokio::sync::Notify::new());
        let options = CacheOptions::new(Duration::from_secs(100)).with_background_refresh(0.5);

        let factory = {
            let calls = Arc::new(AtomicU32::new(0));
            let gate = Arc::clone(&gate);
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let gate = Arc::clone(&gate);
                async move {
                    if n > 0 {
                        gate.notified().await;
                    }
                    Ok::<_, FactoryError>(n + 1)
                }
            }
        };
        assert_eq!(cache.get_or_set("k", factory, &options).await.unwrap(), 1);
        clock.advance(Duration::from_secs(60));

        let unused = || async { Ok::<u32, FactoryError>(1000) };
        assert_eq!(cache.get_or_set("k", unused, &options).await.unwrap(), 1);
        settle().await;

        // Re-set while the refresh is still running
        cache.warm_up("k", 42, &CacheOptions::new(Duration::from_secs(100))).unwrap();
        gate.notify_one();
        settle().await;

        assert_eq!(cache.get_or_set("k", unused, &options).await.unwrap(), 42);
        assert_eq!(cache.statistics().refreshes, 0);
    }
}
