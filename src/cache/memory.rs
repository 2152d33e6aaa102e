//! In-process LRU result cache with lazy TTL expiry.

use super::{CachedRecommendation, RecommendationCache};
use crate::models::{Algorithm, UserId};
use crate::{Error, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default number of cached `(user, algorithm)` entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedRecommendation,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        self.created_at.elapsed() < self.ttl
    }
}

/// LRU-bounded in-memory cache.
///
/// # How it works
///
/// 1. Entries are keyed by `(user, algorithm)` and carry their own TTL
/// 2. A hit marks the entry most recently used; expired entries read as
///    absent and are evicted on the spot
/// 3. `invalidate` pops the key of every algorithm tag for the user
///
/// There is no background sweeper; LRU eviction bounds memory.
pub struct InMemoryCache {
    entries: RwLock<LruCache<(UserId, Algorithm), CacheEntry>>,
}

impl InMemoryCache {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Creates a cache with [`DEFAULT_CACHE_CAPACITY`].
    #[must_use]
    pub fn default_settings() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned(operation: &str) -> Error {
        Error::OperationFailed {
            operation: operation.to_string(),
            cause: "Lock poisoned".to_string(),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::default_settings()
    }
}

impl RecommendationCache for InMemoryCache {
    fn get(&self, user_id: UserId, algorithm: Algorithm) -> Result<Option<CachedRecommendation>> {
        let key = (user_id, algorithm);
        // A hit reorders the LRU list, so reads need the write lock.
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Self::poisoned("cache_get"))?;
        match entries.get(&key) {
            Some(entry) if entry.is_live() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.pop(&key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    fn set(
        &self,
        user_id: UserId,
        algorithm: Algorithm,
        value: &CachedRecommendation,
        ttl: Duration,
    ) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Self::poisoned("cache_set"))?;
        entries.put(
            (user_id, algorithm),
            CacheEntry {
                value: value.clone(),
                created_at: Instant::now(),
                ttl,
            },
        );
        metrics::gauge!("cache_entries", "backend" => "memory").set(entries.len() as f64);
        Ok(())
    }

    fn invalidate(&self, user_id: UserId) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Self::poisoned("cache_invalidate"))?;
        for algorithm in Algorithm::all() {
            entries.pop(&(user_id, *algorithm));
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Self::poisoned("cache_clear"))?;
        entries.clear();
        metrics::gauge!("cache_entries", "backend" => "memory").set(0.0);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
