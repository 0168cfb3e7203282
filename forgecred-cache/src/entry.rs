//! Cache entry representation.
//!
//! Values are stored as validated `serde_json::Value`, decoupling the
//! cache map from the concrete types read through it. Each entry carries
//! a generation counter: any write, invalidation, cancellation, or
//! restore bumps it, and a fetch settling against an older generation is
//! discarded instead of clobbering the newer state.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

use forgecred_core::SourceError;

use crate::key::CacheKey;

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Populated and within its stale time when last observed.
    Fresh,
    /// Populated but past its stale time; servable while revalidating.
    Stale,
    /// Logically stale regardless of age; must refetch before serving
    /// without a refresh scheduled.
    Invalidated,
    /// A fetch for this key is in flight (at most one at any time).
    Fetching,
    /// The last fetch failed. Prior data, if any, remains servable.
    Error,
}

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    /// Cached value, absent until first successful population.
    pub data: Option<Value>,
    /// Set only on successful fetch population.
    pub fetched_at: Option<DateTime<Utc>>,
    pub state: EntryState,
    /// Bumped by write/invalidate/cancel/restore; stale fetch results
    /// settle against an older generation and are discarded.
    pub generation: u64,
    /// Last time an observer touched this entry; drives gc eviction.
    pub last_observed: DateTime<Utc>,
    /// Eviction interval for this entry.
    pub gc_time: Duration,
    /// Error from the last failed fetch, handed to deduplicated waiters.
    pub last_error: Option<SourceError>,
}

impl CacheEntry {
    pub fn new(now: DateTime<Utc>, gc_time: Duration) -> Self {
        Self {
            data: None,
            fetched_at: None,
            state: EntryState::Fetching,
            generation: 0,
            last_observed: now,
            gc_time,
            last_error: None,
        }
    }

    /// Whether the entry holds data that may be served (possibly stale).
    pub fn is_servable(&self) -> bool {
        self.data.is_some() && self.state != EntryState::Invalidated
    }

    /// Age of the cached data relative to `now`, if ever fetched.
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.fetched_at
            .map(|at| now.signed_duration_since(at).to_std().unwrap_or(Duration::ZERO))
    }

    /// Whether the data is within `stale_time` as of `now`.
    ///
    /// Data populated by `write` (no `fetched_at`) is never considered
    /// fresh, so it revalidates on its next observation.
    pub fn is_fresh(&self, now: DateTime<Utc>, stale_time: Duration) -> bool {
        match self.age(now) {
            Some(age) => age <= stale_time,
            None => false,
        }
    }

    /// Whether the entry is eligible for gc eviction as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.state == EntryState::Fetching {
            return false;
        }
        now.signed_duration_since(self.last_observed)
            .to_std()
            .map(|idle| idle > self.gc_time)
            .unwrap_or(false)
    }
}

/// Verbatim capture of one key's cached state, for rollback.
///
/// Restoring a snapshot reproduces the captured state exactly: a key
/// that was absent is removed again, a present value is written back
/// with its original `fetched_at`. Snapshots never merge with
/// interleaved state.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub(crate) key: CacheKey,
    pub(crate) captured: Option<SnapshotData>,
}

#[derive(Debug, Clone)]
pub(crate) struct SnapshotData {
    pub data: Option<Value>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    /// The key this snapshot captured.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Whether the key held an entry when captured.
    pub fn was_present(&self) -> bool {
        self.captured.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entries_are_not_servable() {
        let entry = CacheEntry::new(Utc::now(), Duration::from_secs(300));
        assert!(!entry.is_servable());
        assert!(!entry.is_fresh(Utc::now(), Duration::from_secs(60)));
    }

    #[test]
    fn written_data_without_fetched_at_is_never_fresh() {
        let mut entry = CacheEntry::new(Utc::now(), Duration::from_secs(300));
        entry.data = Some(serde_json::json!(1));
        entry.state = EntryState::Fresh;
        assert!(entry.is_servable());
        assert!(!entry.is_fresh(Utc::now(), Duration::from_secs(60)));
    }

    #[test]
    fn invalidated_data_is_not_servable() {
        let mut entry = CacheEntry::new(Utc::now(), Duration::from_secs(300));
        entry.data = Some(serde_json::json!(1));
        entry.state = EntryState::Invalidated;
        assert!(!entry.is_servable());
    }

    #[test]
    fn fetching_entries_never_expire() {
        let past = Utc::now() - chrono::Duration::seconds(600);
        let mut entry = CacheEntry::new(past, Duration::from_secs(1));
        assert!(!entry.is_expired(Utc::now()));
        entry.state = EntryState::Error;
        assert!(entry.is_expired(Utc::now()));
    }
}
