//! Configuration management.
//!
//! Configuration is layered:
//!
//! 1. Built-in defaults
//! 2. A TOML file (explicit path, or the platform config dir)
//! 3. `GRAPHREC_*` environment variables
//!
//! ```toml
//! [paths]
//! data_dir = "/var/lib/graphrec"
//!
//! [ranking]
//! genre_boost = 2
//! ppr_walks = 10000
//! ppr_depth = 2
//!
//! [cache]
//! backend = "memory"
//! ttl_secs = 300
//! ```

use crate::cache::CacheResilienceConfig;
use crate::rank::{DEFAULT_GENRE_BOOST, DEFAULT_PPR_DEPTH, DEFAULT_PPR_WALKS};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for graphrec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphrecConfig {
    /// File locations.
    pub paths: PathsConfig,
    /// Ranking parameters and request limits.
    pub ranking: RankingConfig,
    /// Fallback tuning.
    pub fallback: FallbackConfig,
    /// Result cache.
    pub cache: CacheSettings,
    /// Log output.
    pub logging: LoggingConfig,
    /// Prometheus exporter.
    pub metrics: MetricsConfig,
}

/// File locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base directory for the database and snapshot.
    pub data_dir: PathBuf,
    /// `SQLite` database; defaults to `<data_dir>/graphrec.db`.
    pub database_path: Option<PathBuf>,
    /// Snapshot file; defaults to `<data_dir>/graph.snap`.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = directories::BaseDirs::new().map_or_else(
            || PathBuf::from(".graphrec"),
            |dirs| dirs.data_local_dir().join("graphrec"),
        );
        Self {
            data_dir,
            database_path: None,
            snapshot_path: None,
        }
    }
}

impl PathsConfig {
    /// Resolved database path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("graphrec.db"))
    }

    /// Resolved snapshot path.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("graph.snap"))
    }
}

/// Ranking parameters and the limits requests are validated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Additive BFS score bonus for preferred genres.
    pub genre_boost: u64,
    /// Default PPR walk count.
    pub ppr_walks: usize,
    /// Default PPR depth.
    pub ppr_depth: usize,
    /// Fixed PPR seed; entropy when unset.
    pub ppr_seed: Option<u64>,
    /// Largest accepted `k`.
    pub max_k: usize,
    /// Largest accepted walk count.
    pub max_walks: usize,
    /// Largest accepted depth.
    pub max_depth: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            genre_boost: DEFAULT_GENRE_BOOST,
            ppr_walks: DEFAULT_PPR_WALKS,
            ppr_depth: DEFAULT_PPR_DEPTH,
            ppr_seed: None,
            max_k: 100,
            max_walks: 100_000,
            max_depth: 10,
        }
    }
}

/// Fallback tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Extra items fetched beyond `k + |seen|` in the popularity and catalog tiers.
    pub popularity_margin: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            popularity_margin: 5,
        }
    }
}

/// Which cache backend to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// In-process LRU.
    #[default]
    Memory,
    /// Redis server (requires the `redis` feature).
    Redis,
    /// Caching disabled.
    None,
}

impl CacheBackendKind {
    /// Parses a backend name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "redis" => Some(Self::Redis),
            "none" | "off" | "disabled" => Some(Self::None),
            _ => None,
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Backend to use.
    pub backend: CacheBackendKind,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Maximum entries for the in-memory backend.
    pub capacity: usize,
    /// Redis connection URL.
    pub redis_url: String,
    /// Circuit breaker settings.
    #[serde(rename = "breaker")]
    pub resilience: CacheResilienceConfig,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            ttl_secs: 300,
            capacity: 10_000,
            redis_url: "redis://localhost:6379".to_string(),
            resilience: CacheResilienceConfig::default(),
        }
    }
}

impl CacheSettings {
    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Default filter when neither `GRAPHREC_LOG` nor `RUST_LOG` is set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to serve `/metrics`.
    pub enabled: bool,
    /// Listen port.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl GraphrecConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::operation("read_config_file", e))?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::operation("parse_config_file", e))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `<config_dir>/graphrec/config.toml`, then
    /// `~/.config/graphrec/config.toml`. Returns defaults if neither exists
    /// or parses.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("graphrec").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("graphrec")
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Loads from `path` if given, else the default location, then applies
    /// process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path cannot be loaded or an
    /// environment override is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default(),
        };
        config.with_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies `GRAPHREC_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a value that does not parse.
    pub fn with_env_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GRAPHREC_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("GRAPHREC_DATABASE_PATH") {
            self.paths.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("GRAPHREC_SNAPSHOT_PATH") {
            self.paths.snapshot_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("GRAPHREC_GENRE_BOOST") {
            self.ranking.genre_boost = parse_env("GRAPHREC_GENRE_BOOST", &v)?;
        }
        if let Some(v) = get("GRAPHREC_PPR_WALKS") {
            self.ranking.ppr_walks = parse_env("GRAPHREC_PPR_WALKS", &v)?;
        }
        if let Some(v) = get("GRAPHREC_PPR_DEPTH") {
            self.ranking.ppr_depth = parse_env("GRAPHREC_PPR_DEPTH", &v)?;
        }
        if let Some(v) = get("GRAPHREC_PPR_SEED") {
            self.ranking.ppr_seed = Some(parse_env("GRAPHREC_PPR_SEED", &v)?);
        }
        if let Some(v) = get("GRAPHREC_MAX_K") {
            self.ranking.max_k = parse_env("GRAPHREC_MAX_K", &v)?;
        }
        if let Some(v) = get("GRAPHREC_CACHE_BACKEND") {
            self.cache.backend = CacheBackendKind::parse(&v).ok_or_else(|| {
                Error::InvalidInput(format!("GRAPHREC_CACHE_BACKEND: unknown backend '{v}'"))
            })?;
        }
        if let Some(v) = get("GRAPHREC_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_env("GRAPHREC_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = get("GRAPHREC_CACHE_CAPACITY") {
            self.cache.capacity = parse_env("GRAPHREC_CACHE_CAPACITY", &v)?;
        }
        if let Some(v) = get("GRAPHREC_REDIS_URL") {
            self.cache.redis_url = v;
        }
        if let Some(v) = get("GRAPHREC_LOG_FORMAT") {
            self.logging.format = match v.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            };
        }
        if let Some(v) = get("GRAPHREC_METRICS_ENABLED") {
            self.metrics.enabled = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = get("GRAPHREC_METRICS_PORT") {
            self.metrics.port = parse_env("GRAPHREC_METRICS_PORT", &v)?;
        }

        Ok(self)
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.data_dir = path.into();
        self
    }

    /// Sets the cache backend.
    #[must_use]
    pub const fn with_cache_backend(mut self, backend: CacheBackendKind) -> Self {
        self.cache.backend = backend;
        self
    }

    /// Fixes the PPR seed.
    #[must_use]
    pub const fn with_ppr_seed(mut self, seed: u64) -> Self {
        self.ranking.ppr_seed = Some(seed);
        self
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{key}: cannot parse '{value}'")))
}
