//! In-memory result cache with per-entry TTL.
//!
//! Expired entries are treated as absent the moment their TTL passes, removed
//! lazily when looked up and proactively by [`TtlCache::sweep`]. The cache is an
//! optimization only; losing it changes latency, never correctness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::config::DEFAULT_CACHE_MAX_ENTRIES;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    stored_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

/// Key → value map whose entries expire after their TTL.
///
/// Bounded by `max_entries`: inserting a new key into a full cache first drops
/// expired entries, then evicts the entry stored longest ago.
#[derive(Debug)]
pub struct TtlCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    max_entries: AtomicUsize,
}

impl<T: Clone> TtlCache<T> {
    /// Creates an empty cache holding at most `max_entries` results.
    pub fn new(max_entries: usize) -> Self {
        TtlCache {
            entries: RwLock::new(HashMap::new()),
            max_entries: AtomicUsize::new(max_entries.max(1)),
        }
    }

    /// Returns the live value for `key`, removing it if it has expired.
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a fresh insert may have raced us
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
            log::debug!("Cache entry '{}' expired", key);
        }
        None
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub async fn insert(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let max_entries = self.max_entries.load(Ordering::Relaxed);
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= max_entries {
            entries.retain(|_, e| !e.is_expired(now));
            while entries.len() >= max_entries {
                let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.stored_at)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                entries.remove(&oldest);
                log::debug!("Cache full ({} entries), evicted '{}'", max_entries, oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
                ttl,
            },
        );
    }

    /// Removes every expired entry, returning how many were dropped.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    /// Removes `key`; returns whether an entry (live or expired) was present.
    pub async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Drops every entry, returning how many were held.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let n = entries.len();
        entries.clear();
        n
    }

    /// Number of live (non-expired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether there are no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Changes the capacity. Takes effect on the next insert.
    pub fn set_max_entries(&self, max_entries: usize) {
        self.max_entries.store(max_entries.max(1), Ordering::Relaxed);
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_MAX_ENTRIES)
    }
}
