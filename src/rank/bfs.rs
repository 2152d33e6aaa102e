//! Weighted breadth-first collaborative filtering.
//!
//! Starting from the target user's liked items, the traversal visits every
//! co-liker (depth 1) and then every item those co-likers like (depth 2).
//! A candidate's raw score is the number of distinct paths that reach it.
//! Preferred-genre candidates get an additive boost afterwards.

use super::{ScoredItem, top_k};
use crate::graph::GraphState;
use crate::models::{GenreId, ItemId, UserId};
use std::collections::{BTreeSet, HashMap};

/// Additive bonus for candidates in a preferred genre.
pub const DEFAULT_GENRE_BOOST: u64 = 2;

/// Tuning knobs for the BFS ranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BfsParams {
    /// Additive bonus for candidates whose genre is preferred.
    pub genre_boost: u64,
}

impl Default for BfsParams {
    fn default() -> Self {
        Self {
            genre_boost: DEFAULT_GENRE_BOOST,
        }
    }
}

/// Ranks candidates for `user_id` by co-occurrence.
///
/// Returns an empty list for users without history (cold start).
#[must_use]
pub fn recommend(
    state: &GraphState,
    user_id: UserId,
    k: usize,
    preferred_genres: Option<&BTreeSet<GenreId>>,
    params: BfsParams,
) -> Vec<ScoredItem> {
    let Some(history) = state.user_neighbors(user_id) else {
        return Vec::new();
    };
    if k == 0 {
        return Vec::new();
    }

    let mut scores: HashMap<ItemId, u64> = HashMap::new();
    for liked in history.ids() {
        let Some(co_likers) = state.item_neighbors(liked) else {
            continue;
        };
        for co_liker in co_likers.ids().filter(|id| *id != user_id) {
            let Some(their_items) = state.user_neighbors(co_liker) else {
                continue;
            };
            for candidate in their_items.ids().filter(|id| !history.contains(*id)) {
                *scores.entry(candidate).or_insert(0) += 1;
            }
        }
    }

    if let Some(preferred) = preferred_genres.filter(|set| !set.is_empty()) {
        for (item_id, score) in &mut scores {
            if preferred.contains(&state.genre_of(*item_id)) {
                *score += params.genre_boost;
            }
        }
    }

    top_k(scores, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::item_ids;

    fn bridge_graph() -> GraphState {
        let mut state = GraphState::new();
        state.add_edge(999, 101, 1);
        state.add_edge(888, 101, 1);
        state.add_edge(888, 104, 1);
        state
    }

    #[test]
    fn test_co_liker_bridges_to_new_item() {
        let state = bridge_graph();
        let ranked = recommend(&state, 999, 5, None, BfsParams::default());
        assert_eq!(item_ids(&ranked), vec![104]);
        assert_eq!(ranked[0].score, 1);
    }

    #[test]
    fn test_cold_start_user_is_empty() {
        let state = bridge_graph();
        assert!(recommend(&state, 1, 5, None, BfsParams::default()).is_empty());
    }

    #[test]
    fn test_history_is_excluded() {
        let mut state = GraphState::new();
        for (user, item) in [(1, 100), (1, 200), (2, 100), (2, 200), (2, 300)] {
            state.add_edge(user, item, 0);
        }
        let ids = item_ids(&recommend(&state, 1, 5, None, BfsParams::default()));
        assert_eq!(ids, vec![300]);
    }

    #[test]
    fn test_paths_accumulate() {
        let mut state = GraphState::new();
        // User 1 shares two items with user 2 and one with user 3.
        for (user, item) in [(1, 10), (1, 11), (2, 10), (2, 11), (2, 50), (3, 10), (3, 60)] {
            state.add_edge(user, item, 0);
        }
        let ranked = recommend(&state, 1, 5, None, BfsParams::default());
        assert_eq!(item_ids(&ranked), vec![50, 60]);
        assert_eq!(ranked[0].score, 2);
        assert_eq!(ranked[1].score, 1);
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let mut state = GraphState::new();
        for (user, item) in [(1, 10), (2, 10), (2, 30), (2, 20)] {
            state.add_edge(user, item, 0);
        }
        let ids = item_ids(&recommend(&state, 1, 5, None, BfsParams::default()));
        assert_eq!(ids, vec![20, 30]);
    }

    #[test]
    fn test_genre_boost_lifts_tied_candidate() {
        let mut state = GraphState::new();
        for (user, item) in [(1, 10), (2, 10), (2, 20), (2, 30)] {
            state.add_edge(user, item, 0);
        }
        state.set_item_genre(30, 7);
        let preferred = BTreeSet::from([7]);
        let ranked = recommend(&state, 1, 5, Some(&preferred), BfsParams::default());
        assert_eq!(item_ids(&ranked), vec![30, 20]);
        assert_eq!(ranked[0].score, 1 + DEFAULT_GENRE_BOOST);
    }

    #[test]
    fn test_boost_is_bounded_by_margin() {
        let mut state = GraphState::new();
        // Item 50 reached by 4 paths, boosted item 60 by 1 path.
        for user in 2..=5 {
            state.add_edge(user, 10, 0);
            state.add_edge(user, 50, 0);
        }
        state.add_edge(1, 10, 0);
        state.add_edge(6, 10, 0);
        state.add_edge(6, 60, 0);
        state.set_item_genre(60, 1);
        let preferred = BTreeSet::from([1]);
        let ranked = recommend(&state, 1, 5, Some(&preferred), BfsParams::default());
        assert_eq!(item_ids(&ranked), vec![50, 60]);
    }

    #[test]
    fn test_k_truncates() {
        let mut state = GraphState::new();
        state.add_edge(1, 10, 0);
        for item in 20..30 {
            state.add_edge(2, 10, 0);
            state.add_edge(2, item, 0);
        }
        assert_eq!(recommend(&state, 1, 3, None, BfsParams::default()).len(), 3);
        assert!(recommend(&state, 1, 0, None, BfsParams::default()).is_empty());
    }
}
