//! Redis-backed result cache.
//!
//! Entries are JSON-encoded [`CachedRecommendation`] values stored under
//! `recs:user:{id}:{algo}` with `SETEX`, so expiry is enforced by Redis.
//!
//! [`CachedRecommendation`]: super::CachedRecommendation

use crate::models::{Algorithm, UserId};

/// Matches every key written by this cache.
pub const KEY_PATTERN: &str = "recs:user:*";

/// Builds the Redis key for a `(user, algorithm)` pair.
#[must_use]
pub fn cache_key(user_id: UserId, algorithm: Algorithm) -> String {
    format!("recs:user:{user_id}:{}", algorithm.as_str())
}

#[cfg(feature = "redis")]
mod implementation {
    use super::{KEY_PATTERN, cache_key};
    use crate::cache::{CachedRecommendation, RecommendationCache};
    use crate::models::{Algorithm, UserId};
    use crate::{Error, Result};
    use redis::{Client, Commands, Connection};
    use std::time::Duration;

    const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

    /// Redis result cache.
    pub struct RedisCache {
        client: Client,
    }

    impl RedisCache {
        /// Creates a cache for the server at `connection_url`.
        ///
        /// The URL is validated here; connections are opened per call.
        ///
        /// # Errors
        ///
        /// Returns an error if the URL is invalid.
        pub fn new(connection_url: &str) -> Result<Self> {
            let client =
                Client::open(connection_url).map_err(|e| Error::operation("redis_connect", e))?;
            Ok(Self { client })
        }

        fn connection(&self) -> Result<Connection> {
            self.client
                .get_connection_with_timeout(CONNECT_TIMEOUT)
                .map_err(|e| Error::operation("redis_get_connection", e))
        }
    }

    impl RecommendationCache for RedisCache {
        fn get(
            &self,
            user_id: UserId,
            algorithm: Algorithm,
        ) -> Result<Option<CachedRecommendation>> {
            let mut conn = self.connection()?;
            let raw: Option<String> = conn
                .get(cache_key(user_id, algorithm))
                .map_err(|e| Error::operation("redis_get", e))?;
            raw.map(|json| {
                serde_json::from_str(&json).map_err(|e| Error::operation("redis_decode", e))
            })
            .transpose()
        }

        fn set(
            &self,
            user_id: UserId,
            algorithm: Algorithm,
            value: &CachedRecommendation,
            ttl: Duration,
        ) -> Result<()> {
            let json =
                serde_json::to_string(value).map_err(|e| Error::operation("redis_encode", e))?;
            let mut conn = self.connection()?;
            let () = conn
                .set_ex(cache_key(user_id, algorithm), json, ttl.as_secs().max(1))
                .map_err(|e| Error::operation("redis_set", e))?;
            Ok(())
        }

        fn invalidate(&self, user_id: UserId) -> Result<()> {
            let keys: Vec<String> = Algorithm::all()
                .iter()
                .map(|algorithm| cache_key(user_id, *algorithm))
                .collect();
            let mut conn = self.connection()?;
            let _: i64 = conn
                .del(keys)
                .map_err(|e| Error::operation("redis_del", e))?;
            Ok(())
        }

        fn clear(&self) -> Result<()> {
            let mut conn = self.connection()?;
            let keys: Vec<String> = conn
                .keys(KEY_PATTERN)
                .map_err(|e| Error::operation("redis_keys", e))?;
            if keys.is_empty() {
                return Ok(());
            }
            let _: i64 = conn
                .del(keys)
                .map_err(|e| Error::operation("redis_del", e))?;
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "redis"
        }
    }
}

#[cfg(feature = "redis")]
pub use implementation::RedisCache;

#[cfg(not(feature = "redis"))]
mod stub {
    use crate::cache::{CachedRecommendation, RecommendationCache};
    use crate::models::{Algorithm, UserId};
    use crate::{Error, Result};
    use std::time::Duration;

    /// Stub Redis cache when the feature is not enabled.
    pub struct RedisCache;

    fn disabled() -> Error {
        Error::operation("redis_cache", "Redis feature not enabled")
    }

    impl RedisCache {
        /// Creates a new Redis cache (stub).
        ///
        /// # Errors
        ///
        /// Always returns an error because the feature is not enabled.
        pub fn new(_connection_url: &str) -> Result<Self> {
            Err(disabled())
        }
    }

    impl RecommendationCache for RedisCache {
        fn get(
            &self,
            _user_id: UserId,
            _algorithm: Algorithm,
        ) -> Result<Option<CachedRecommendation>> {
            Err(disabled())
        }

        fn set(
            &self,
            _user_id: UserId,
            _algorithm: Algorithm,
            _value: &CachedRecommendation,
            _ttl: Duration,
        ) -> Result<()> {
            Err(disabled())
        }

        fn invalidate(&self, _user_id: UserId) -> Result<()> {
            Err(disabled())
        }

        fn clear(&self) -> Result<()> {
            Err(disabled())
        }

        fn backend_name(&self) -> &'static str {
            "redis"
        }
    }
}

#[cfg(not(feature = "redis"))]
pub use stub::RedisCache;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_layout() {
        assert_eq!(cache_key(999, Algorithm::Bfs), "recs:user:999:bfs");
        assert_eq!(cache_key(1, Algorithm::Ppr), "recs:user:1:ppr");
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn test_stub_refuses_construction() {
        assert!(RedisCache::new("redis://localhost:6379").is_err());
    }
}
