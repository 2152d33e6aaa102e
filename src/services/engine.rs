//! Recommendation engine facade.
//!
//! Wires the graph store, the ranking algorithms, the fallback orchestrator,
//! the result cache and catalog metadata behind one type.
//!
//! # Request flow
//!
//! ```text
//! validate ─► cache hit? ──yes──► cached result
//!                 │ no
//!                 ▼
//!        rank under one read guard ─► fallback tiers ─► hydrate ─► cache set
//! ```
//!
//! Mutations update the graph (and the row store, when attached) and then
//! invalidate the affected user's cache entries before returning.

use crate::cache::{CachedRecommendation, InMemoryCache, ResilientCache, build_cache};
use crate::config::{GraphrecConfig, RankingConfig};
use crate::graph::{GraphCounts, GraphStore, snapshot};
use crate::models::{
    Algorithm, Genre, GenreId, InteractionRow, ItemId, ItemMeta, RecommendRequest,
    Recommendation, RecommendedItem, Tier, UserId,
};
use crate::rank::{self, BfsParams, PprParams};
use crate::services::{FallbackOrchestrator, bootstrap};
use crate::storage::{RowSource, SqliteRowStore};
use crate::{Error, Result};
use parking_lot::RwLock;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::instrument;

/// The recommendation engine.
pub struct RecommendationEngine {
    graph: Arc<GraphStore>,
    cache: ResilientCache,
    cache_ttl: Duration,
    catalog: RwLock<HashMap<ItemId, ItemMeta>>,
    orchestrator: FallbackOrchestrator,
    ranking: RankingConfig,
    rows: Option<Arc<SqliteRowStore>>,
    /// Bumped after every graph mutation; results computed across a bump are not cached.
    epoch: AtomicU64,
    /// Readers hold it across the epoch check and cache write, mutators across
    /// the epoch bump and invalidation.
    coherence: RwLock<()>,
}

impl RecommendationEngine {
    /// Creates an engine over `graph` with an explicit cache.
    #[must_use]
    pub fn new(graph: Arc<GraphStore>, cache: ResilientCache, config: &GraphrecConfig) -> Self {
        Self {
            graph,
            cache,
            cache_ttl: config.cache.ttl(),
            catalog: RwLock::new(HashMap::new()),
            orchestrator: FallbackOrchestrator::new(config.fallback.popularity_margin),
            ranking: config.ranking.clone(),
            rows: None,
            epoch: AtomicU64::new(0),
            coherence: RwLock::new(()),
        }
    }

    /// Creates an engine with the cache backend named in `config`.
    #[must_use]
    pub fn from_config(graph: Arc<GraphStore>, config: &GraphrecConfig) -> Self {
        Self::new(graph, build_cache(&config.cache), config)
    }

    /// Creates an engine with default settings and an in-memory cache.
    #[must_use]
    pub fn with_defaults(graph: Arc<GraphStore>) -> Self {
        Self::new(
            graph,
            ResilientCache::with_defaults(InMemoryCache::default()),
            &GraphrecConfig::default(),
        )
    }

    /// Writes every mutation through to `rows` before applying it to the graph.
    #[must_use]
    pub fn with_row_store(mut self, rows: Arc<SqliteRowStore>) -> Self {
        self.rows = Some(rows);
        self
    }

    /// The underlying graph.
    #[must_use]
    pub const fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    /// Name of the active cache backend.
    #[must_use]
    pub const fn cache_backend(&self) -> &'static str {
        self.cache.backend_name()
    }

    /// Replaces catalog metadata used for hydration.
    ///
    /// Genres are not touched; they travel with the graph.
    pub fn load_catalog(&self, items: impl IntoIterator<Item = ItemMeta>) -> usize {
        let mut catalog = self.catalog.write();
        catalog.clear();
        catalog.extend(items.into_iter().map(|meta| (meta.id, meta)));
        catalog.len()
    }

    /// Returns catalog metadata for an item, placeholder if unknown.
    #[must_use]
    pub fn item(&self, item_id: ItemId) -> ItemMeta {
        self.catalog
            .read()
            .get(&item_id)
            .cloned()
            .unwrap_or_else(|| ItemMeta::unknown(item_id))
    }

    /// Returns recommendations for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `k`, the walk count or the depth
    /// exceed the configured limits. Cache failures never surface.
    #[instrument(
        name = "graphrec.recommend",
        skip(self, request),
        fields(
            user_id = request.user_id,
            k = request.k,
            algorithm = %request.algorithm,
            tier = tracing::field::Empty,
            cached = tracing::field::Empty
        )
    )]
    pub fn recommend(&self, request: &RecommendRequest) -> Result<Recommendation> {
        let start = Instant::now();
        self.validate(request)?;

        let walks = request.walks.unwrap_or(self.ranking.ppr_walks);
        let depth = request.depth.unwrap_or(self.ranking.ppr_depth);
        let fingerprint = CachedRecommendation::fingerprint(&[
            &request.k,
            &request.seen,
            &request.preferred_genres,
            &walks,
            &depth,
        ]);
        let algorithm = request.algorithm;

        if let Some(hit) = self
            .cache
            .get(request.user_id, algorithm)
            .filter(|hit| hit.fingerprint == fingerprint)
        {
            metrics::counter!("cache_hits_total", "algorithm" => algorithm.as_str()).increment(1);
            return Ok(Self::finish(request, hit.tier, hit.items, true, start));
        }
        metrics::counter!("cache_misses_total", "algorithm" => algorithm.as_str()).increment(1);

        let epoch = self.epoch.load(Ordering::SeqCst);
        let (ids, tier) = self.rank(request, walks, depth);

        let items: Vec<RecommendedItem> = {
            let catalog = self.catalog.read();
            ids.into_iter()
                .map(|id| {
                    let meta = catalog.get(&id).cloned().unwrap_or_else(|| ItemMeta::unknown(id));
                    RecommendedItem::from_meta(meta, tier)
                })
                .collect()
        };

        {
            let _guard = self.coherence.read();
            if self.epoch.load(Ordering::SeqCst) == epoch {
                let value = CachedRecommendation {
                    fingerprint,
                    tier,
                    items: items.clone(),
                };
                self.cache
                    .set(request.user_id, algorithm, &value, self.cache_ttl);
            } else {
                tracing::debug!("Graph changed during ranking, result not cached");
            }
        }

        Ok(Self::finish(request, tier, items, false, start))
    }

    /// Runs ranking and fallback under a single read guard.
    fn rank(&self, request: &RecommendRequest, walks: usize, depth: usize) -> (Vec<ItemId>, Tier) {
        let state = self.graph.read();
        let user_id = request.user_id;

        // Over-rank so filtering caller-seen items can still fill k.
        let rank_k = request.k.saturating_add(request.seen.len());
        let ranked = match request.algorithm {
            Algorithm::Bfs => {
                let preferred = request
                    .preferred_genres
                    .as_ref()
                    .or_else(|| state.preferences_of(user_id));
                let params = BfsParams {
                    genre_boost: self.ranking.genre_boost,
                };
                rank::bfs::recommend(&state, user_id, rank_k, preferred, params)
            },
            Algorithm::Ppr => {
                let mut rng = self
                    .ranking
                    .ppr_seed
                    .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
                let params = PprParams::new(walks, depth);
                rank::ppr::recommend(&state, user_id, rank_k, params, &mut rng)
            },
        };
        let personalized = rank::item_ids(&ranked);

        let mut seen = request.seen.clone();
        if let Some(history) = state.user_neighbors(user_id) {
            seen.extend(history.ids());
        }

        self.orchestrator
            .resolve(&state, request.k, &seen, &personalized)
    }

    fn finish(
        request: &RecommendRequest,
        tier: Tier,
        items: Vec<RecommendedItem>,
        cached: bool,
        start: Instant,
    ) -> Recommendation {
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let algorithm = request.algorithm.as_str();
        metrics::counter!(
            "recommendations_total",
            "algorithm" => algorithm,
            "tier" => tier.as_str()
        )
        .increment(1);
        metrics::histogram!("recommendation_duration_ms", "algorithm" => algorithm)
            .record(latency_ms);

        let span = tracing::Span::current();
        span.record("tier", tier.as_str());
        span.record("cached", cached);
        tracing::debug!(items = items.len(), latency_ms, "Recommendation served");

        Recommendation {
            user_id: request.user_id,
            algorithm: request.algorithm,
            tier,
            items,
            cached,
            latency_ms,
        }
    }

    fn validate(&self, request: &RecommendRequest) -> Result<()> {
        let limits = &self.ranking;
        if request.k > limits.max_k {
            return Err(Error::InvalidInput(format!(
                "k must be at most {}, got {}",
                limits.max_k, request.k
            )));
        }
        if let Some(walks) = request.walks.filter(|w| *w > limits.max_walks) {
            return Err(Error::InvalidInput(format!(
                "walks must be at most {}, got {walks}",
                limits.max_walks
            )));
        }
        if let Some(depth) = request.depth.filter(|d| *d > limits.max_depth) {
            return Err(Error::InvalidInput(format!(
                "depth must be at most {}, got {depth}",
                limits.max_depth
            )));
        }
        Ok(())
    }

    /// Publishes a graph change to the cache.
    ///
    /// `None` bumps the epoch only, `Some(user)` also drops that user's
    /// entries.
    fn mutated(&self, user_id: Option<UserId>) {
        let _guard = self.coherence.write();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(user_id) = user_id {
            self.cache.invalidate(user_id);
        }
    }

    /// Reloads the graph and catalog from `rows` and empties the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read; the graph, catalog and
    /// cache are unchanged in that case.
    #[instrument(skip_all, fields(operation = "reload_from_rows"))]
    pub fn reload_from_rows(&self, rows: &dyn RowSource) -> Result<GraphCounts> {
        let catalog = rows.catalog()?;
        let counts = bootstrap::refresh_from_rows(&self.graph, rows)?;
        self.load_catalog(catalog);

        let _guard = self.coherence.write();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
        Ok(counts)
    }

    /// Records a like. Returns the stored timestamp (the original one for duplicates).
    ///
    /// # Errors
    ///
    /// Returns an error if the attached row store rejects the write; the
    /// graph is left untouched in that case.
    #[instrument(skip(self), fields(operation = "record_edge"))]
    pub fn record_edge(&self, user_id: UserId, item_id: ItemId, timestamp: u64) -> Result<u64> {
        if let Some(rows) = &self.rows {
            rows.insert_interaction(InteractionRow::new(user_id, item_id, timestamp))?;
        }
        let stored = self.graph.add_edge(user_id, item_id, timestamp);
        self.mutated(Some(user_id));
        Ok(stored)
    }

    /// Removes a like. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the attached row store rejects the delete.
    #[instrument(skip(self), fields(operation = "remove_edge"))]
    pub fn remove_edge(&self, user_id: UserId, item_id: ItemId) -> Result<bool> {
        if let Some(rows) = &self.rows {
            rows.delete_interaction(user_id, item_id)?;
        }
        let removed = self.graph.remove_edge(user_id, item_id);
        self.mutated(Some(user_id));
        Ok(removed)
    }

    /// Tags an item with a genre.
    ///
    /// Cached results are not invalidated; their TTL bounds the staleness.
    ///
    /// # Errors
    ///
    /// Returns an error if the attached row store rejects the write.
    #[instrument(skip(self), fields(operation = "set_genre"))]
    pub fn set_genre(&self, item_id: ItemId, genre: Genre) -> Result<()> {
        if let Some(rows) = &self.rows {
            rows.set_item_category(item_id, genre.as_str())?;
        }
        self.graph.set_item_genre(item_id, genre.id());
        self.catalog
            .write()
            .entry(item_id)
            .or_insert_with(|| ItemMeta::unknown(item_id))
            .category = genre.as_str().to_string();
        self.mutated(None);
        Ok(())
    }

    /// Replaces a user's preferred genres. Returns `true` if they changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the attached row store rejects the write.
    #[instrument(skip(self, genres), fields(operation = "set_preferences"))]
    pub fn set_preferences(
        &self,
        user_id: UserId,
        genres: impl IntoIterator<Item = GenreId>,
    ) -> Result<bool> {
        let genres: BTreeSet<GenreId> = genres.into_iter().collect();
        if let Some(rows) = &self.rows {
            rows.set_preferences(user_id, &genres)?;
        }
        let changed = self.graph.set_user_preferences(user_id, genres);
        self.mutated(Some(user_id));
        Ok(changed)
    }

    /// Current graph counts.
    #[must_use]
    pub fn stats(&self) -> GraphCounts {
        self.graph.counts()
    }

    /// Encodes the current graph as a snapshot blob.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        snapshot::encode_store(&self.graph)
    }
}
