//! Ranking algorithms over a consistent graph read view.
//!
//! Both algorithms are pure functions of a [`GraphState`](crate::graph::GraphState)
//! borrowed from [`GraphStore::read`](crate::graph::GraphStore::read) and
//! return candidates ordered by score descending, then item id ascending.
//! Items the target user already likes are never returned.

pub mod bfs;
pub mod ppr;

pub use bfs::{BfsParams, DEFAULT_GENRE_BOOST};
pub use ppr::{DEFAULT_PPR_DEPTH, DEFAULT_PPR_WALKS, PprParams};

use crate::models::ItemId;
use std::collections::HashMap;

/// A ranked candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredItem {
    /// Candidate item.
    pub item_id: ItemId,
    /// Algorithm-specific score (paths or visits, plus any boost).
    pub score: u64,
}

/// Sorts scores by (score desc, id asc) and keeps the first `k`.
#[must_use]
pub fn top_k(scores: HashMap<ItemId, u64>, k: usize) -> Vec<ScoredItem> {
    let mut ranked: Vec<ScoredItem> = scores
        .into_iter()
        .map(|(item_id, score)| ScoredItem { item_id, score })
        .collect();
    ranked.sort_unstable_by(|a, b| b.score.cmp(&a.score).then_with(|| a.item_id.cmp(&b.item_id)));
    ranked.truncate(k);
    ranked
}

/// Extracts item ids from ranked candidates.
#[must_use]
pub fn item_ids(ranked: &[ScoredItem]) -> Vec<ItemId> {
    ranked.iter().map(|candidate| candidate.item_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_orders_by_score_then_id() {
        let scores = HashMap::from([(5, 1), (3, 4), (9, 4), (1, 1)]);
        let ranked = top_k(scores, 3);
        assert_eq!(item_ids(&ranked), vec![3, 9, 1]);
        assert_eq!(ranked[0].score, 4);
    }

    #[test]
    fn test_top_k_zero() {
        let scores = HashMap::from([(1, 1)]);
        assert!(top_k(scores, 0).is_empty());
    }
}
