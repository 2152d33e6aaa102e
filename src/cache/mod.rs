//! Recommendation result cache.
//!
//! The cache maps `(user, algorithm)` to the last computed result for that
//! pair. It is never a source of truth: the engine invalidates a user's
//! entries on every mutation that can change their recommendations, and
//! every backend failure is downgraded to a miss by [`ResilientCache`].
//!
//! # Available Backends
//!
//! | Backend | Use Case | Notes |
//! |---------|----------|-------|
//! | [`InMemoryCache`] | Default | LRU-bounded, lazy TTL expiry |
//! | `RedisCache` | Shared across processes | Requires the `redis` feature |
//! | [`NoopCache`] | Caching disabled | Always misses |

mod memory;
mod redis;
mod resilience;

pub use self::redis::RedisCache;
pub use memory::InMemoryCache;
pub use resilience::{CacheResilienceConfig, CircuitBreaker, ResilientCache};

use crate::config::{CacheBackendKind, CacheSettings};
use crate::models::{Algorithm, RecommendedItem, Tier, UserId};
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Default time-to-live for cached results (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// A cached recommendation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRecommendation {
    /// Fingerprint of the request parameters that produced this value.
    pub fingerprint: String,
    /// Tier that produced the items.
    pub tier: Tier,
    /// Hydrated items, best first.
    pub items: Vec<RecommendedItem>,
}

impl CachedRecommendation {
    /// Hashes request parameters that change the result for a fixed user and algorithm.
    ///
    /// A cached value is only served to requests with the same fingerprint.
    #[must_use]
    pub fn fingerprint(parts: &[&dyn std::fmt::Debug]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(format!("{part:?}|").as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }
}

/// Trait for result cache backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` so backends can be shared behind `Arc`
/// - Expired entries must read as absent
/// - `invalidate` removes the entries of every [`Algorithm`] for the user
/// - `clear` empties the cache after a bulk reload of the graph
/// - Errors are reported, not swallowed; [`ResilientCache`] decides how to degrade
pub trait RecommendationCache: Send + Sync {
    /// Returns the live entry for `(user_id, algorithm)`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, user_id: UserId, algorithm: Algorithm) -> Result<Option<CachedRecommendation>>;

    /// Stores an entry that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(
        &self,
        user_id: UserId,
        algorithm: Algorithm,
        value: &CachedRecommendation,
        ttl: Duration,
    ) -> Result<()>;

    /// Removes every entry for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn invalidate(&self, user_id: UserId) -> Result<()>;

    /// Removes every entry of every user.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn clear(&self) -> Result<()>;

    /// Short backend name for logs and metrics.
    fn backend_name(&self) -> &'static str;
}

/// Cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl RecommendationCache for NoopCache {
    fn get(&self, _user_id: UserId, _algorithm: Algorithm) -> Result<Option<CachedRecommendation>> {
        Ok(None)
    }

    fn set(
        &self,
        _user_id: UserId,
        _algorithm: Algorithm,
        _value: &CachedRecommendation,
        _ttl: Duration,
    ) -> Result<()> {
        Ok(())
    }

    fn invalidate(&self, _user_id: UserId) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "none"
    }
}

/// Builds the configured backend wrapped in a [`ResilientCache`].
///
/// A Redis backend that cannot be constructed falls back to the in-memory
/// backend with a warning; the engine must keep serving either way.
#[must_use]
pub fn build_cache(settings: &CacheSettings) -> ResilientCache {
    let resilience = settings.resilience.clone();
    let inner: Box<dyn RecommendationCache> = match settings.backend {
        CacheBackendKind::None => Box::new(NoopCache),
        CacheBackendKind::Memory => Box::new(InMemoryCache::new(settings.capacity)),
        CacheBackendKind::Redis => match RedisCache::new(&settings.redis_url) {
            Ok(cache) => Box::new(cache),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Redis cache unavailable, using in-memory cache"
                );
                Box::new(InMemoryCache::new(settings.capacity))
            },
        },
    };
    tracing::debug!(backend = inner.backend_name(), "Result cache initialized");
    ResilientCache::new(inner, resilience)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = CachedRecommendation::fingerprint(&[&5usize, &vec![1u64, 2]]);
        let b = CachedRecommendation::fingerprint(&[&5usize, &vec![1u64, 2]]);
        let c = CachedRecommendation::fingerprint(&[&6usize, &vec![1u64, 2]]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_noop_cache_always_misses() {
        let cache = NoopCache;
        let value = CachedRecommendation {
            fingerprint: "f".to_string(),
            tier: Tier::Catalog,
            items: Vec::new(),
        };
        cache.set(1, Algorithm::Bfs, &value, DEFAULT_CACHE_TTL).unwrap();
        assert!(cache.get(1, Algorithm::Bfs).unwrap().is_none());
    }

    #[test]
    fn test_build_cache_defaults_to_memory() {
        let cache = build_cache(&CacheSettings::default());
        assert_eq!(cache.backend_name(), "memory");
    }

    #[test]
    fn test_build_cache_disabled() {
        let settings = CacheSettings {
            backend: CacheBackendKind::None,
            ..CacheSettings::default()
        };
        assert_eq!(build_cache(&settings).backend_name(), "none");
    }
}
