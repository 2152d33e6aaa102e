//! Circuit breaking for result cache backends.
//!
//! The cache must never fail a recommendation. [`ResilientCache`] wraps any
//! backend, converts every error into a logged miss or no-op, and stops
//! calling a backend that keeps failing.
//!
//! # Circuit Breaker States
//!
//! ```text
//! +--------+     failures >= threshold     +------+
//! | Closed | --------------------------->  | Open |
//! +--------+                               +------+
//!     ^                                        |
//!     |  success                               | timeout elapsed
//!     |                                        v
//!     +--------------------------------  +-----------+
//!                                        | Half-Open |
//!                                        +-----------+
//! ```

use super::{CachedRecommendation, RecommendationCache};
use crate::models::{Algorithm, UserId};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker settings for a cache backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheResilienceConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long to keep the circuit open before half-open.
    pub reset_timeout_ms: u64,
    /// Maximum trial calls while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CacheResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            half_open_max_calls: 1,
        }
    }
}

impl CacheResilienceConfig {
    /// Sets the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the reset timeout in milliseconds.
    #[must_use]
    pub const fn with_reset_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.reset_timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug)]
enum BreakerState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { attempts: u32 },
}

/// Circuit breaker state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_max_calls: u32,
    backend_name: &'static str,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(config: &CacheResilienceConfig, backend_name: &'static str) -> Self {
        Self {
            state: BreakerState::Closed { failures: 0 },
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            half_open_max_calls: config.half_open_max_calls.max(1),
            backend_name,
        }
    }

    /// Returns `true` if a call may proceed.
    pub fn allow(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.reset_timeout {
                    tracing::info!(
                        backend = self.backend_name,
                        "Cache circuit breaker half-open"
                    );
                    self.state = BreakerState::HalfOpen { attempts: 1 };
                    true
                } else {
                    false
                }
            },
            BreakerState::HalfOpen { ref mut attempts } => {
                if *attempts >= self.half_open_max_calls {
                    false
                } else {
                    *attempts += 1;
                    true
                }
            },
        }
    }

    /// Records a success and closes the circuit.
    pub fn on_success(&mut self) {
        if !matches!(self.state, BreakerState::Closed { failures: 0 }) {
            tracing::info!(backend = self.backend_name, "Cache circuit breaker closed");
        }
        self.state = BreakerState::Closed { failures: 0 };
    }

    /// Records a failure. Returns `true` if the circuit just opened.
    pub fn on_failure(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { ref mut failures } => {
                *failures += 1;
                if *failures < self.failure_threshold {
                    return false;
                }
                tracing::warn!(
                    backend = self.backend_name,
                    failures = *failures,
                    "Cache circuit breaker opened"
                );
            },
            BreakerState::HalfOpen { .. } => {
                tracing::warn!(
                    backend = self.backend_name,
                    "Cache circuit breaker re-opened after trial failure"
                );
            },
            BreakerState::Open { .. } => return false,
        }
        self.state = BreakerState::Open {
            opened_at: Instant::now(),
        };
        true
    }

    /// Returns `true` while calls are being short-circuited.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, BreakerState::Open { .. })
    }

    /// 0 closed, 1 open, 2 half-open.
    #[must_use]
    pub const fn state_value(&self) -> u8 {
        match self.state {
            BreakerState::Closed { .. } => 0,
            BreakerState::Open { .. } => 1,
            BreakerState::HalfOpen { .. } => 2,
        }
    }
}

/// Cache wrapper that never fails.
///
/// Every method has an infallible signature: errors are logged with
/// `tracing::warn!`, counted in `cache_errors_total`, and reported to the
/// caller as a miss (for reads) or silently dropped (for writes).
pub struct ResilientCache {
    inner: Box<dyn RecommendationCache>,
    breaker: Mutex<CircuitBreaker>,
    backend_name: &'static str,
}

impl ResilientCache {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Box<dyn RecommendationCache>, config: CacheResilienceConfig) -> Self {
        let backend_name = inner.backend_name();
        Self {
            inner,
            breaker: Mutex::new(CircuitBreaker::new(&config, backend_name)),
            backend_name,
        }
    }

    /// Wraps `inner` with default breaker settings.
    #[must_use]
    pub fn with_defaults(inner: impl RecommendationCache + 'static) -> Self {
        Self::new(Box::new(inner), CacheResilienceConfig::default())
    }

    /// Name of the wrapped backend.
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Looks up a cached value; errors read as a miss.
    pub fn get(&self, user_id: UserId, algorithm: Algorithm) -> Option<CachedRecommendation> {
        self.execute("get", Some(user_id), || self.inner.get(user_id, algorithm))
            .flatten()
    }

    /// Stores a value; errors are logged and dropped.
    pub fn set(
        &self,
        user_id: UserId,
        algorithm: Algorithm,
        value: &CachedRecommendation,
        ttl: Duration,
    ) {
        self.execute("set", Some(user_id), || {
            self.inner.set(user_id, algorithm, value, ttl)
        });
    }

    /// Removes every entry for `user_id`; errors are logged and dropped.
    ///
    /// A failed invalidation leaves a possibly stale entry behind until its
    /// TTL expires.
    pub fn invalidate(&self, user_id: UserId) {
        self.execute("invalidate", Some(user_id), || self.inner.invalidate(user_id));
    }

    /// Removes every entry; errors are logged and dropped.
    pub fn clear(&self) {
        self.execute("clear", None, || self.inner.clear());
    }

    fn execute<T, F>(&self, operation: &'static str, user_id: Option<UserId>, call: F) -> Option<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut breaker = self
            .breaker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !breaker.allow() {
            let state = breaker.state_value();
            drop(breaker);
            self.record_metrics(operation, "circuit_open", state);
            return None;
        }
        drop(breaker);

        let result = call();

        let mut breaker = self
            .breaker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match result {
            Ok(value) => {
                breaker.on_success();
                let state = breaker.state_value();
                drop(breaker);
                self.record_metrics(operation, "success", state);
                Some(value)
            },
            Err(e) => {
                let tripped = breaker.on_failure();
                let state = breaker.state_value();
                drop(breaker);
                tracing::warn!(
                    backend = self.backend_name,
                    operation,
                    user_id = ?user_id,
                    error = %e,
                    "Cache operation failed, continuing without cache"
                );
                metrics::counter!(
                    "cache_errors_total",
                    "backend" => self.backend_name,
                    "operation" => operation
                )
                .increment(1);
                self.record_metrics(operation, "error", state);
                if tripped {
                    metrics::counter!(
                        "cache_circuit_breaker_trips_total",
                        "backend" => self.backend_name
                    )
                    .increment(1);
                }
                None
            },
        }
    }

    fn record_metrics(&self, operation: &'static str, status: &'static str, state: u8) {
        metrics::counter!(
            "cache_requests_total",
            "backend" => self.backend_name,
            "operation" => operation,
            "status" => status
        )
        .increment(1);
        metrics::gauge!("cache_circuit_breaker_state", "backend" => self.backend_name)
            .set(f64::from(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::models::Tier;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FailingCache {
        calls: Arc<AtomicU32>,
    }

    impl RecommendationCache for FailingCache {
        fn get(&self, _: UserId, _: Algorithm) -> Result<Option<CachedRecommendation>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::operation("get", "connection refused"))
        }

        fn set(&self, _: UserId, _: Algorithm, _: &CachedRecommendation, _: Duration) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::operation("set", "connection refused"))
        }

        fn invalidate(&self, _: UserId) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::operation("invalidate", "connection refused"))
        }

        fn clear(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::operation("clear", "connection refused"))
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    fn value() -> CachedRecommendation {
        CachedRecommendation {
            fingerprint: "fp".to_string(),
            tier: Tier::Popularity,
            items: Vec::new(),
        }
    }

    #[test]
    fn test_breaker_opens_after_threshold() {
        let config = CacheResilienceConfig::default().with_failure_threshold(2);
        let mut breaker = CircuitBreaker::new(&config, "test");
        assert!(breaker.allow());
        assert!(!breaker.on_failure());
        assert!(breaker.on_failure());
        assert!(breaker.is_open());
        assert!(!breaker.allow());
    }

    #[test]
    fn test_breaker_half_open_then_closes() {
        let config = CacheResilienceConfig::default()
            .with_failure_threshold(1)
            .with_reset_timeout_ms(0);
        let mut breaker = CircuitBreaker::new(&config, "test");
        assert!(breaker.on_failure());
        assert!(breaker.allow());
        assert_eq!(breaker.state_value(), 2);
        assert!(!breaker.allow());
        breaker.on_success();
        assert_eq!(breaker.state_value(), 0);
    }

    #[test]
    fn test_errors_become_misses() {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = ResilientCache::with_defaults(FailingCache {
            calls: Arc::clone(&calls),
        });
        assert!(cache.get(1, Algorithm::Bfs).is_none());
        cache.set(1, Algorithm::Bfs, &value(), Duration::from_secs(1));
        cache.invalidate(1);
        cache.clear();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_open_circuit_skips_backend() {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = ResilientCache::new(
            Box::new(FailingCache {
                calls: Arc::clone(&calls),
            }),
            CacheResilienceConfig::default().with_failure_threshold(2),
        );
        for _ in 0..5 {
            assert!(cache.get(7, Algorithm::Ppr).is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_healthy_backend_passes_through() {
        let cache = ResilientCache::with_defaults(InMemoryCache::default());
        cache.set(1, Algorithm::Bfs, &value(), Duration::from_secs(60));
        assert_eq!(cache.get(1, Algorithm::Bfs), Some(value()));
        cache.invalidate(1);
        assert!(cache.get(1, Algorithm::Bfs).is_none());
        assert_eq!(cache.backend_name(), "memory");
    }
}
