//! Recommendation requests and results.

use super::catalog::ItemMeta;
use super::genre::GenreId;
use super::{ItemId, UserId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Ranking algorithm used for the personalized tier.
///
/// The tag is part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Weighted breadth-first collaborative filtering.
    #[default]
    Bfs,
    /// Personalized PageRank estimated with random walks.
    Ppr,
}

impl Algorithm {
    /// Returns all algorithm tags.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Bfs, Self::Ppr]
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bfs => "bfs",
            Self::Ppr => "ppr",
        }
    }

    /// Parses an algorithm tag (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bfs" | "cf" | "graph" => Some(Self::Bfs),
            "ppr" | "pagerank" => Some(Self::Ppr),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fallback stage that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Output of a ranking algorithm.
    Personalized,
    /// Globally most-liked items.
    Popularity,
    /// Stable catalog order.
    Catalog,
}

impl Tier {
    /// Returns the reason tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Personalized => "personalized",
            Self::Popularity => "popularity",
            Self::Catalog => "catalog",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts a raw signed value from an outer layer into an unsigned one.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `value` is negative.
pub fn non_negative(name: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::InvalidInput(format!("{name} must be non-negative, got {value}")))
}

/// A recommendation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendRequest {
    /// Target user.
    pub user_id: UserId,
    /// Maximum number of items to return.
    pub k: usize,
    /// Ranking algorithm for the personalized tier.
    pub algorithm: Algorithm,
    /// Preferred genres; `None` means use the user's stored preferences.
    pub preferred_genres: Option<BTreeSet<GenreId>>,
    /// Items the caller has already shown or the user already owns.
    pub seen: BTreeSet<ItemId>,
    /// Walk count override for [`Algorithm::Ppr`].
    pub walks: Option<usize>,
    /// Walk depth override for [`Algorithm::Ppr`].
    pub depth: Option<usize>,
}

impl RecommendRequest {
    /// Creates a BFS request for the top `k` items.
    #[must_use]
    pub const fn new(user_id: UserId, k: usize) -> Self {
        Self {
            user_id,
            k,
            algorithm: Algorithm::Bfs,
            preferred_genres: None,
            seen: BTreeSet::new(),
            walks: None,
            depth: None,
        }
    }

    /// Builds a request from signed values supplied by an outer layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if either value is negative.
    pub fn from_raw(user_id: i64, k: i64) -> Result<Self> {
        let user_id = non_negative("user_id", user_id)?;
        let k = usize::try_from(non_negative("k", k)?)
            .map_err(|_| Error::InvalidInput(format!("k out of range: {k}")))?;
        Ok(Self::new(user_id, k))
    }

    /// Sets the ranking algorithm.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets explicit preferred genres.
    #[must_use]
    pub fn with_preferred_genres(mut self, genres: impl IntoIterator<Item = GenreId>) -> Self {
        self.preferred_genres = Some(genres.into_iter().collect());
        self
    }

    /// Sets the seen set.
    #[must_use]
    pub fn with_seen(mut self, seen: impl IntoIterator<Item = ItemId>) -> Self {
        self.seen = seen.into_iter().collect();
        self
    }

    /// Overrides the PPR walk count.
    #[must_use]
    pub const fn with_walks(mut self, walks: usize) -> Self {
        self.walks = Some(walks);
        self
    }

    /// Overrides the PPR walk depth.
    #[must_use]
    pub const fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// A recommended item with hydrated catalog metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedItem {
    /// Item identifier.
    pub id: ItemId,
    /// Display title.
    pub title: String,
    /// Category string.
    pub category: String,
    /// Tier that produced this item.
    pub reason: Tier,
}

impl RecommendedItem {
    /// Hydrates a result item from catalog metadata.
    #[must_use]
    pub fn from_meta(meta: ItemMeta, reason: Tier) -> Self {
        Self {
            id: meta.id,
            title: meta.title,
            category: meta.category,
            reason,
        }
    }
}

/// The answer to a [`RecommendRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Target user.
    pub user_id: UserId,
    /// Algorithm used for the personalized tier.
    pub algorithm: Algorithm,
    /// Tier that satisfied the request.
    pub tier: Tier,
    /// Ranked items, best first.
    pub items: Vec<RecommendedItem>,
    /// Whether the result was served from the cache.
    pub cached: bool,
    /// Wall-clock time spent answering.
    pub latency_ms: f64,
}

impl Recommendation {
    /// Returns the ranked item ids.
    #[must_use]
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id).collect()
    }

    /// Returns the reason tag.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        self.tier.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(Algorithm::parse("BFS"), Some(Algorithm::Bfs));
        assert_eq!(Algorithm::parse("pagerank"), Some(Algorithm::Ppr));
        assert_eq!(Algorithm::parse("ann"), None);
        for algo in Algorithm::all() {
            assert_eq!(Algorithm::parse(algo.as_str()), Some(*algo));
        }
    }

    #[test]
    fn test_tier_serializes_as_reason_tag() {
        let json = serde_json::to_string(&Tier::Popularity).unwrap();
        assert_eq!(json, "\"popularity\"");
    }

    #[test]
    fn test_from_raw_rejects_negative_k() {
        let err = RecommendRequest::from_raw(1, -5);
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_from_raw_rejects_negative_user() {
        assert!(RecommendRequest::from_raw(-1, 5).is_err());
    }

    #[test]
    fn test_from_raw_accepts_valid_values() {
        let request = RecommendRequest::from_raw(999, 5).unwrap();
        assert_eq!(request.user_id, 999);
        assert_eq!(request.k, 5);
        assert_eq!(request.algorithm, Algorithm::Bfs);
    }

    #[test]
    fn test_builder() {
        let request = RecommendRequest::new(1, 3)
            .with_algorithm(Algorithm::Ppr)
            .with_preferred_genres([7, 1])
            .with_seen([10, 20])
            .with_walks(500)
            .with_depth(3);
        assert_eq!(request.algorithm, Algorithm::Ppr);
        assert_eq!(request.preferred_genres, Some(BTreeSet::from([1, 7])));
        assert!(request.seen.contains(&20));
        assert_eq!(request.walks, Some(500));
        assert_eq!(request.depth, Some(3));
    }
}
