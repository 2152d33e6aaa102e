//! Personalized PageRank estimated with Monte Carlo random walks.
//!
//! Each walk starts at the target user and alternates user→item and
//! item→user hops, choosing uniformly among neighbors. `depth` counts
//! user→item hops; only the item reached on the final hop is tallied, and
//! only if the target does not already like it. A walk that reaches a node
//! without neighbors ends without a tally.
//!
//! Estimates are only statistically stable for walk counts in the thousands.
//! The random source is injected so tests can use a seeded generator.

use super::{ScoredItem, top_k};
use crate::graph::GraphState;
use crate::models::{ItemId, UserId};
use rand::Rng;
use std::collections::HashMap;

/// Default number of walks per request.
pub const DEFAULT_PPR_WALKS: usize = 10_000;

/// Default number of user→item hops per walk.
pub const DEFAULT_PPR_DEPTH: usize = 2;

/// Walk parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PprParams {
    /// Number of independent walks.
    pub walks: usize,
    /// User→item hops per walk.
    pub depth: usize,
}

impl PprParams {
    /// Creates walk parameters.
    #[must_use]
    pub const fn new(walks: usize, depth: usize) -> Self {
        Self { walks, depth }
    }
}

impl Default for PprParams {
    fn default() -> Self {
        Self::new(DEFAULT_PPR_WALKS, DEFAULT_PPR_DEPTH)
    }
}

/// Ranks candidates for `user_id` by walk landing frequency.
#[must_use]
pub fn recommend<R: Rng + ?Sized>(
    state: &GraphState,
    user_id: UserId,
    k: usize,
    params: PprParams,
    rng: &mut R,
) -> Vec<ScoredItem> {
    let Some(history) = state.user_neighbors(user_id) else {
        return Vec::new();
    };
    if k == 0 || params.walks == 0 || params.depth == 0 {
        return Vec::new();
    }

    let mut visits: HashMap<ItemId, u64> = HashMap::new();
    for _ in 0..params.walks {
        if let Some(item_id) = walk(state, user_id, params.depth, rng) {
            if !history.contains(item_id) {
                *visits.entry(item_id).or_insert(0) += 1;
            }
        }
    }

    tracing::trace!(
        user_id,
        walks = params.walks,
        depth = params.depth,
        distinct = visits.len(),
        "PPR walks finished"
    );
    top_k(visits, k)
}

/// Runs one walk; returns the item reached on the last hop.
fn walk<R: Rng + ?Sized>(
    state: &GraphState,
    start: UserId,
    depth: usize,
    rng: &mut R,
) -> Option<ItemId> {
    let mut user_id = start;
    for step in 0..depth {
        let items = state.user_neighbors(user_id).filter(|l| !l.is_empty())?;
        let item_id = items.id_at(rng.gen_range(0..items.len()))?;
        if step + 1 == depth {
            return Some(item_id);
        }
        let users = state.item_neighbors(item_id).filter(|l| !l.is_empty())?;
        user_id = users.id_at(rng.gen_range(0..users.len()))?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::item_ids;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn bridge_graph() -> GraphState {
        let mut state = GraphState::new();
        state.add_edge(999, 101, 1);
        state.add_edge(888, 101, 1);
        state.add_edge(888, 104, 1);
        state
    }

    #[test]
    fn test_zero_walks_is_empty() {
        let state = bridge_graph();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(recommend(&state, 999, 5, PprParams::new(0, 2), &mut rng).is_empty());
    }

    #[test]
    fn test_zero_depth_is_empty() {
        let state = bridge_graph();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(recommend(&state, 999, 5, PprParams::new(100, 0), &mut rng).is_empty());
    }

    #[test]
    fn test_unknown_user_is_empty() {
        let state = bridge_graph();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(recommend(&state, 1, 5, PprParams::new(100, 2), &mut rng).is_empty());
    }

    #[test]
    fn test_bridge_item_is_found() {
        let state = bridge_graph();
        let mut rng = StdRng::seed_from_u64(42);
        let ranked = recommend(&state, 999, 5, PprParams::new(1_000, 2), &mut rng);
        assert_eq!(item_ids(&ranked), vec![104]);
        // Half the walks pick co-liker 888, half of those land on 104.
        assert!(ranked[0].score > 100 && ranked[0].score < 400);
    }

    #[test]
    fn test_depth_one_only_reaches_history() {
        let state = bridge_graph();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(recommend(&state, 999, 5, PprParams::new(50, 1), &mut rng).is_empty());
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let mut state = GraphState::new();
        for (user, item) in [(1, 10), (2, 10), (2, 20), (3, 10), (3, 30), (3, 40), (4, 20), (4, 50)] {
            state.add_edge(user, item, 0);
        }
        let params = PprParams::new(500, 3);
        let first = recommend(&state, 1, 5, params, &mut StdRng::seed_from_u64(9));
        let second = recommend(&state, 1, 5, params, &mut StdRng::seed_from_u64(9));
        assert_eq!(first, second);
        assert!(!first.iter().any(|c| c.item_id == 10));
    }

    #[test]
    fn test_popular_neighbor_item_ranks_first() {
        let mut state = GraphState::new();
        state.add_edge(1, 10, 0);
        // Every co-liker likes 20; only one likes 30.
        for user in 2..=6 {
            state.add_edge(user, 10, 0);
            state.add_edge(user, 20, 0);
        }
        state.add_edge(6, 30, 0);
        let mut rng = StdRng::seed_from_u64(3);
        let ranked = recommend(&state, 1, 5, PprParams::new(5_000, 2), &mut rng);
        assert_eq!(ranked.first().map(|c| c.item_id), Some(20));
    }
}
