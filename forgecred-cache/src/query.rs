//! Keyed query cache with freshness and deduplication contracts.
//!
//! Reads route through a per-key entry that tracks freshness (stale
//! time), eviction (gc time), and a generation counter. Overlapping
//! reads of the same absent key share one fetch; a write, invalidation,
//! or cancellation issued while a fetch is in flight bumps the
//! generation so the fetch's eventual result is discarded instead of
//! clobbering newer state.
//!
//! The cache lock is never held across an await: all map mutation is
//! synchronous, and suspension happens only while awaiting the remote
//! fetch or a deduplication wakeup.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use forgecred_core::{SourceError, SourceResult};

use crate::entry::{CacheEntry, CacheSnapshot, EntryState, SnapshotData};
use crate::key::CacheKey;
use crate::retry::RetryPolicy;

/// Marker for types that can be stored in the cache.
///
/// Values are serialized into the cache after boundary validation and
/// deserialized on read, so heterogeneous resources share one keyed map.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Errors surfaced by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The remote data source failed (after any retries).
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A cached value failed to encode or decode.
    #[error("cache codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Configuration for the query cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Data younger than this is served without a background refresh.
    pub stale_time: Duration,
    /// An unobserved entry is evicted after this interval of inactivity.
    pub gc_time: Duration,
    /// Default retry policy for fetches.
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(60),
            gc_time: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stale time.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Set the gc time.
    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Per-read options; unset fields fall back to [`CacheConfig`].
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// When false the read is a no-op: no fetch, returns absent. Used to
    /// gate reads on missing required parameters.
    pub enabled: bool,
    /// Override for the config stale time.
    pub stale_time: Option<Duration>,
    /// Override for the config gc time.
    pub gc_time: Option<Duration>,
    /// Override for the config retry policy.
    pub retry: Option<RetryPolicy>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: None,
            gc_time: None,
            retry: None,
        }
    }
}

impl ReadOptions {
    /// Gate the read on a required parameter being present.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Override the stale time for this read.
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// Override the gc time for this read's entry.
    pub fn gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = Some(gc_time);
        self
    }

    /// Override the retry policy for this read.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Result of a cache read, carrying freshness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    fetched_at: Option<DateTime<Utc>>,
    was_cache_hit: bool,
    was_stale: bool,
}

impl<T> CacheRead<T> {
    fn from_cache(value: T, fetched_at: Option<DateTime<Utc>>, was_stale: bool) -> Self {
        Self {
            value,
            fetched_at,
            was_cache_hit: true,
            was_stale,
        }
    }

    fn from_fetch(value: T) -> Self {
        Self {
            value,
            fetched_at: Some(Utc::now()),
            was_cache_hit: false,
            was_stale: false,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Whether the value came from the cache (vs. a fetch this read ran).
    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    /// Whether this read triggered the fetch that produced the value.
    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Whether the served value was past its stale time.
    pub fn was_stale(&self) -> bool {
        self.was_stale
    }

    /// When the value was fetched from the source, if it ever was.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from cached data.
    pub hits: u64,
    /// Reads that ran a fetch.
    pub misses: u64,
    /// Entries evicted by gc.
    pub evictions: u64,
    /// Fetch results discarded because newer state superseded them.
    pub discarded_fetches: u64,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    // One sender per key with a fetch in flight; waiters subscribe.
    inflight: HashMap<CacheKey, watch::Sender<()>>,
    stats: CacheStats,
}

impl CacheInner {
    fn sweep(&mut self, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.stats.evictions += (before - self.entries.len()) as u64;
    }
}

enum Plan {
    Hit {
        value: Value,
        fetched_at: Option<DateTime<Utc>>,
    },
    StaleHit {
        value: Value,
        fetched_at: Option<DateTime<Utc>>,
        // Generation to revalidate against, when this read won the
        // right to refresh in the background.
        revalidate: Option<u64>,
    },
    Wait(watch::Receiver<()>),
    Surface(SourceError),
    Fetch(u64),
}

/// Process-wide keyed cache with explicit construction and teardown.
///
/// Construct with [`QueryCache::new`] (or [`QueryCache::with_config`]);
/// each instance is isolated, so tests get their own cache rather than
/// sharing hidden module state.
pub struct QueryCache {
    inner: Mutex<CacheInner>,
    config: CacheConfig,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    /// Create a cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache with the given configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            config,
        }
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // Entries are plain data; a panic mid-operation cannot leave
        // them in a torn state worth poisoning over.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Read `key`, fetching via `fetcher` on miss or invalidation.
    ///
    /// Cached data within its stale time is returned as-is. Stale data
    /// is returned immediately while a background revalidation runs.
    /// Absent or invalidated entries block on a fetch, deduplicated so
    /// overlapping reads of one key share a single fetch. With
    /// `options.enabled == false` the read is a no-op returning `None`.
    ///
    /// A fetch failure (after retries per the policy) surfaces as an
    /// error without clearing previously cached data.
    pub async fn read<T, F, Fut>(
        self: &Arc<Self>,
        key: &CacheKey,
        fetcher: F,
        options: ReadOptions,
    ) -> CacheResult<Option<CacheRead<T>>>
    where
        T: CacheValue,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SourceResult<T>> + Send + 'static,
    {
        if !options.enabled {
            return Ok(None);
        }
        let stale_time = options.stale_time.unwrap_or(self.config.stale_time);
        let gc_time = options.gc_time.unwrap_or(self.config.gc_time);
        let retry = options.retry.unwrap_or_else(|| self.config.retry.clone());
        let fetcher = Arc::new(fetcher);
        let mut waited = false;

        loop {
            let plan = {
                let mut guard = self.lock();
                let now = Utc::now();
                guard.sweep(now);
                let inner = &mut *guard;
                let entry = inner
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| CacheEntry::new(now, gc_time));
                entry.last_observed = now;
                entry.gc_time = gc_time;

                if entry.is_servable() {
                    let value = entry.data.clone().unwrap_or(Value::Null);
                    inner.stats.hits += 1;
                    if entry.is_fresh(now, stale_time) {
                        Plan::Hit {
                            value,
                            fetched_at: entry.fetched_at,
                        }
                    } else {
                        let revalidate = if inner.inflight.contains_key(key) {
                            None
                        } else {
                            let (tx, _rx) = watch::channel(());
                            inner.inflight.insert(key.clone(), tx);
                            entry.state = EntryState::Fetching;
                            Some(entry.generation)
                        };
                        Plan::StaleHit {
                            value,
                            fetched_at: entry.fetched_at,
                            revalidate,
                        }
                    }
                } else if let Some(tx) = inner.inflight.get(key) {
                    Plan::Wait(tx.subscribe())
                } else if waited && entry.state == EntryState::Error && entry.data.is_none() {
                    // This read was parked behind a deduplicated fetch
                    // that failed; surface that failure instead of
                    // piling on a retry of our own.
                    Plan::Surface(
                        entry
                            .last_error
                            .clone()
                            .unwrap_or_else(|| SourceError::network("deduplicated fetch failed")),
                    )
                } else {
                    let (tx, _rx) = watch::channel(());
                    inner.inflight.insert(key.clone(), tx);
                    entry.state = EntryState::Fetching;
                    inner.stats.misses += 1;
                    Plan::Fetch(entry.generation)
                }
            };

            match plan {
                Plan::Hit { value, fetched_at } => {
                    trace!(%key, "cache hit");
                    return Ok(Some(CacheRead::from_cache(
                        serde_json::from_value(value)?,
                        fetched_at,
                        false,
                    )));
                }
                Plan::StaleHit {
                    value,
                    fetched_at,
                    revalidate,
                } => {
                    if let Some(generation) = revalidate {
                        debug!(%key, "serving stale data, revalidating in background");
                        let cache = Arc::clone(self);
                        let key = key.clone();
                        let fetcher = Arc::clone(&fetcher);
                        let retry = retry.clone();
                        tokio::spawn(async move {
                            let outcome = run_fetch(&*fetcher, &retry).await;
                            if let Err(error) = &outcome {
                                warn!(%key, %error, "background revalidation failed");
                            }
                            cache.settle_fetch(&key, generation, outcome);
                        });
                    }
                    return Ok(Some(CacheRead::from_cache(
                        serde_json::from_value(value)?,
                        fetched_at,
                        true,
                    )));
                }
                Plan::Wait(mut rx) => {
                    trace!(%key, "awaiting in-flight fetch");
                    let _ = rx.changed().await;
                    waited = true;
                }
                Plan::Surface(error) => return Err(error.into()),
                Plan::Fetch(generation) => {
                    debug!(%key, "fetching from remote source");
                    let result = fetch_with_retry(&*fetcher, &retry).await;
                    return match result {
                        Ok(value) => {
                            match serde_json::to_value(&value) {
                                Ok(encoded) => {
                                    self.settle_fetch(key, generation, Ok(encoded));
                                    Ok(Some(CacheRead::from_fetch(value)))
                                }
                                Err(codec) => {
                                    self.settle_fetch(
                                        key,
                                        generation,
                                        Err(SourceError::validation(format!(
                                            "failed to encode fetched value: {codec}"
                                        ))),
                                    );
                                    Err(CacheError::Codec(codec))
                                }
                            }
                        }
                        Err(error) => {
                            self.settle_fetch(key, generation, Err(error.clone()));
                            Err(error.into())
                        }
                    };
                }
            }
        }
    }

    /// Read cached data for `key` without fetching.
    ///
    /// Serves whatever is present, stale or invalidated included;
    /// returns `None` for absent keys.
    pub fn peek<T: CacheValue>(&self, key: &CacheKey) -> CacheResult<Option<CacheRead<T>>> {
        let mut guard = self.lock();
        let now = Utc::now();
        guard.sweep(now);
        let stale_time = self.config.stale_time;
        let Some(entry) = guard.entries.get_mut(key) else {
            return Ok(None);
        };
        entry.last_observed = now;
        match &entry.data {
            Some(value) => {
                let was_stale = !entry.is_fresh(now, stale_time);
                Ok(Some(CacheRead::from_cache(
                    serde_json::from_value(value.clone())?,
                    entry.fetched_at,
                    was_stale,
                )))
            }
            None => Ok(None),
        }
    }

    /// Synchronously replace the cached value at `key`.
    ///
    /// Marks the entry populated without granting fetch freshness, and
    /// bumps the generation so any in-flight fetch result for the key
    /// is discarded rather than clobbering this value.
    pub fn write<T: CacheValue>(&self, key: &CacheKey, value: &T) -> CacheResult<()> {
        let encoded = serde_json::to_value(value)?;
        self.write_raw(key, encoded);
        Ok(())
    }

    /// Transform the cached value at `key`, creating the entry if absent.
    ///
    /// The transform runs synchronously under the cache lock; it must be
    /// pure cache-state computation, never I/O.
    pub fn write_with<T, F>(&self, key: &CacheKey, transform: F) -> CacheResult<()>
    where
        T: CacheValue,
        F: FnOnce(Option<T>) -> T,
    {
        let mut guard = self.lock();
        let now = Utc::now();
        guard.sweep(now);
        let inner = &mut *guard;
        let entry = inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(now, self.config.gc_time));
        let current = match &entry.data {
            Some(value) => Some(serde_json::from_value(value.clone())?),
            None => None,
        };
        let next = transform(current);
        entry.data = Some(serde_json::to_value(&next)?);
        entry.state = EntryState::Fresh;
        entry.generation += 1;
        entry.last_observed = now;
        entry.last_error = None;
        if let Some(tx) = inner.inflight.get(key) {
            let _ = tx.send(());
        }
        trace!(%key, "wrote cache entry");
        Ok(())
    }

    /// Transform the cached value at `key` only if present and populated.
    ///
    /// Returns whether a value was transformed.
    pub fn update_if_present<T, F>(&self, key: &CacheKey, transform: F) -> CacheResult<bool>
    where
        T: CacheValue,
        F: FnOnce(T) -> T,
    {
        let mut guard = self.lock();
        let now = Utc::now();
        guard.sweep(now);
        let inner = &mut *guard;
        let Some(entry) = inner.entries.get_mut(key) else {
            return Ok(false);
        };
        let Some(value) = &entry.data else {
            return Ok(false);
        };
        let current: T = serde_json::from_value(value.clone())?;
        entry.data = Some(serde_json::to_value(transform(current))?);
        entry.state = EntryState::Fresh;
        entry.generation += 1;
        entry.last_observed = now;
        entry.last_error = None;
        if let Some(tx) = inner.inflight.get(key) {
            let _ = tx.send(());
        }
        Ok(true)
    }

    /// Mark every entry under `prefix` as invalidated.
    ///
    /// Invalidated entries are logically stale regardless of age: the
    /// next read refetches before serving. Returns how many entries
    /// matched.
    pub fn invalidate(&self, prefix: &CacheKey) -> usize {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let mut count = 0;
        for (key, entry) in inner.entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.state = EntryState::Invalidated;
                entry.generation += 1;
                count += 1;
                if let Some(tx) = inner.inflight.get(key) {
                    let _ = tx.send(());
                }
            }
        }
        debug!(%prefix, count, "invalidated cache entries");
        count
    }

    /// Delete every entry under `prefix` outright (no refetch).
    pub fn remove(&self, prefix: &CacheKey) -> usize {
        let mut guard = self.lock();
        let before = guard.entries.len();
        guard.entries.retain(|key, _| !key.starts_with(prefix));
        let count = before - guard.entries.len();
        debug!(%prefix, count, "removed cache entries");
        count
    }

    /// Suppress application of any in-flight fetch result for `key`.
    ///
    /// The fetch itself is not interrupted; its result settles against a
    /// stale generation and is discarded. Returns whether an entry
    /// existed.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        let mut guard = self.lock();
        match guard.entries.get_mut(key) {
            Some(entry) => {
                entry.generation += 1;
                trace!(%key, "cancelled in-flight fetch");
                true
            }
            None => false,
        }
    }

    /// Remove all entries and forget in-flight fetches.
    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.entries.clear();
        guard.inflight.clear();
        debug!("cleared cache");
    }

    /// Evict entries past their gc time now, without waiting for the
    /// next operation to sweep.
    pub fn purge_expired(&self) -> u64 {
        let mut guard = self.lock();
        let before = guard.stats.evictions;
        guard.sweep(Utc::now());
        guard.stats.evictions - before
    }

    /// Capture the exact cached state of `key` for later rollback.
    pub fn snapshot(&self, key: &CacheKey) -> CacheSnapshot {
        let guard = self.lock();
        CacheSnapshot {
            key: key.clone(),
            captured: guard.entries.get(key).map(|entry| SnapshotData {
                data: entry.data.clone(),
                fetched_at: entry.fetched_at,
            }),
        }
    }

    /// Restore a snapshot verbatim to its key.
    ///
    /// Unconditional: the current state at the key, whatever interleaved
    /// operations produced it, is replaced (or removed, if the key was
    /// absent at capture time). Never merges.
    pub fn restore(&self, snapshot: CacheSnapshot) {
        let mut guard = self.lock();
        let now = Utc::now();
        let inner = &mut *guard;
        match snapshot.captured {
            None => {
                inner.entries.remove(&snapshot.key);
            }
            Some(captured) => {
                let entry = inner
                    .entries
                    .entry(snapshot.key.clone())
                    .or_insert_with(|| CacheEntry::new(now, self.config.gc_time));
                let has_data = captured.data.is_some();
                entry.data = captured.data;
                entry.fetched_at = captured.fetched_at;
                entry.state = if has_data {
                    EntryState::Stale
                } else {
                    EntryState::Invalidated
                };
                entry.generation += 1;
                entry.last_observed = now;
                entry.last_error = None;
            }
        }
        if let Some(tx) = inner.inflight.get(&snapshot.key) {
            let _ = tx.send(());
        }
        debug!(key = %snapshot.key, "restored cache snapshot");
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entry exists for `key` (populated or not).
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Usage statistics.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Apply a settled fetch outcome, unless superseded.
    fn settle_fetch(&self, key: &CacheKey, generation: u64, outcome: SourceResult<Value>) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if let Some(tx) = inner.inflight.remove(key) {
            let _ = tx.send(());
        }
        let Some(entry) = inner.entries.get_mut(key) else {
            inner.stats.discarded_fetches += 1;
            trace!(%key, "fetch settled after entry removal; discarded");
            return;
        };
        if entry.generation != generation {
            inner.stats.discarded_fetches += 1;
            if entry.state == EntryState::Fetching {
                entry.state = if entry.data.is_some() {
                    EntryState::Stale
                } else {
                    EntryState::Invalidated
                };
            }
            debug!(%key, "fetch result superseded; discarded");
            return;
        }
        match outcome {
            Ok(value) => {
                entry.data = Some(value);
                entry.fetched_at = Some(Utc::now());
                entry.state = EntryState::Fresh;
                entry.last_error = None;
                trace!(%key, "fetch settled successfully");
            }
            Err(error) => {
                // Prior data stays servable until a later fetch succeeds.
                entry.state = EntryState::Error;
                entry.last_error = Some(error);
            }
        }
    }

    fn write_raw(&self, key: &CacheKey, value: Value) {
        let mut guard = self.lock();
        let now = Utc::now();
        guard.sweep(now);
        let inner = &mut *guard;
        let entry = inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(now, self.config.gc_time));
        entry.data = Some(value);
        entry.state = EntryState::Fresh;
        entry.generation += 1;
        entry.last_observed = now;
        entry.last_error = None;
        if let Some(tx) = inner.inflight.get(key) {
            let _ = tx.send(());
        }
        trace!(%key, "wrote cache entry");
    }
}

async fn fetch_with_retry<T, F, Fut>(fetcher: &F, policy: &RetryPolicy) -> SourceResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = SourceResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                debug!(attempt, ?delay, %error, "retrying fetch after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Fetch and encode, for settlement paths that store raw values.
async fn run_fetch<T, F, Fut>(fetcher: &F, policy: &RetryPolicy) -> SourceResult<Value>
where
    T: CacheValue,
    F: Fn() -> Fut,
    Fut: Future<Output = SourceResult<T>>,
{
    let value = fetch_with_retry(fetcher, policy).await?;
    serde_json::to_value(&value)
        .map_err(|e| SourceError::validation(format!("failed to encode fetched value: {e}")))
}
