//! Tiered fallback for recommendation results.
//!
//! Tiers are tried in order and the first non-empty one wins:
//!
//! | Tier | Source | Order |
//! |------|--------|-------|
//! | `personalized` | Ranking algorithm output | Algorithm score |
//! | `popularity` | Item degree | Degree desc, id asc |
//! | `catalog` | Every known item | Id asc |
//!
//! Every tier drops seen items and duplicates before truncating to `k`.
//! Popularity and catalog over-fetch `k + |seen| + margin` candidates so
//! filtering cannot starve them.

use crate::graph::GraphState;
use crate::models::{ItemId, Tier};
use std::collections::{BTreeSet, HashSet};

/// Default extra candidates fetched by the popularity and catalog tiers.
pub const DEFAULT_POPULARITY_MARGIN: usize = 5;

/// Picks the first tier with something to offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackOrchestrator {
    popularity_margin: usize,
}

impl Default for FallbackOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_POPULARITY_MARGIN)
    }
}

impl FallbackOrchestrator {
    /// Creates an orchestrator with the given over-fetch margin.
    #[must_use]
    pub const fn new(popularity_margin: usize) -> Self {
        Self { popularity_margin }
    }

    /// Resolves the final item list and the tier that produced it.
    ///
    /// `personalized` is the primary ranking output, best first. An empty
    /// graph yields `([], Catalog)`; this never fails.
    #[must_use]
    pub fn resolve(
        &self,
        state: &GraphState,
        k: usize,
        seen: &BTreeSet<ItemId>,
        personalized: &[ItemId],
    ) -> (Vec<ItemId>, Tier) {
        if k == 0 {
            return (Vec::new(), Tier::Catalog);
        }

        let items = take_unseen(personalized.iter().copied(), seen, k);
        if !items.is_empty() {
            return (items, Tier::Personalized);
        }

        let fetch = k
            .saturating_add(seen.len())
            .saturating_add(self.popularity_margin);

        let popular = state.popular_items(fetch);
        let items = take_unseen(popular.into_iter().map(|(id, _)| id), seen, k);
        if !items.is_empty() {
            tracing::debug!(k, "Falling back to popularity tier");
            return (items, Tier::Popularity);
        }

        tracing::debug!(k, "Falling back to catalog tier");
        let items = take_unseen(state.catalog_items(fetch).into_iter(), seen, k);
        (items, Tier::Catalog)
    }
}

/// First `k` distinct ids not in `seen`, order preserved.
fn take_unseen(
    ids: impl Iterator<Item = ItemId>,
    seen: &BTreeSet<ItemId>,
    k: usize,
) -> Vec<ItemId> {
    let mut emitted = HashSet::with_capacity(k);
    ids.filter(|id| !seen.contains(id) && emitted.insert(*id))
        .take(k)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn popular_graph() -> GraphState {
        let mut state = GraphState::new();
        // Item 30 has three likers, 20 two, 10 one.
        for (user, item) in [(1, 30), (2, 30), (3, 30), (1, 20), (2, 20), (1, 10)] {
            state.add_edge(user, item, 0);
        }
        state
    }

    #[test]
    fn test_k_zero_is_empty_catalog() {
        let orchestrator = FallbackOrchestrator::default();
        let result = orchestrator.resolve(&popular_graph(), 0, &BTreeSet::new(), &[30]);
        assert_eq!(result, (Vec::new(), Tier::Catalog));
    }

    #[test]
    fn test_personalized_wins_when_non_empty() {
        let orchestrator = FallbackOrchestrator::default();
        let (items, tier) = orchestrator.resolve(&popular_graph(), 5, &BTreeSet::new(), &[10, 30]);
        assert_eq!(items, vec![10, 30]);
        assert_eq!(tier, Tier::Personalized);
    }

    #[test]
    fn test_personalized_is_deduplicated_and_filtered() {
        let orchestrator = FallbackOrchestrator::default();
        let seen = BTreeSet::from([20]);
        let (items, tier) =
            orchestrator.resolve(&popular_graph(), 2, &seen, &[30, 20, 30, 10, 40]);
        assert_eq!(items, vec![30, 10]);
        assert_eq!(tier, Tier::Personalized);
    }

    #[test]
    fn test_all_personalized_seen_falls_to_popularity() {
        let orchestrator = FallbackOrchestrator::default();
        let seen = BTreeSet::from([30]);
        let (items, tier) = orchestrator.resolve(&popular_graph(), 5, &seen, &[30]);
        assert_eq!(items, vec![20, 10]);
        assert_eq!(tier, Tier::Popularity);
    }

    #[test]
    fn test_popularity_survives_large_seen_set() {
        let mut state = GraphState::new();
        for item in 0..20 {
            for user in 0..=item {
                state.add_edge(user, item, 0);
            }
        }
        let orchestrator = FallbackOrchestrator::new(0);
        // The ten most popular items are seen; popularity must still fill k.
        let seen: BTreeSet<ItemId> = (10..20).collect();
        let (items, tier) = orchestrator.resolve(&state, 3, &seen, &[]);
        assert_eq!(items, vec![9, 8, 7]);
        assert_eq!(tier, Tier::Popularity);
    }

    #[test]
    fn test_catalog_when_no_edges() {
        let mut state = GraphState::new();
        state.set_item_genre(7, 1);
        state.set_item_genre(3, 2);
        let orchestrator = FallbackOrchestrator::default();
        let (items, tier) = orchestrator.resolve(&state, 5, &BTreeSet::new(), &[]);
        assert_eq!(items, vec![3, 7]);
        assert_eq!(tier, Tier::Catalog);
    }

    #[test]
    fn test_empty_graph_is_empty_catalog() {
        let orchestrator = FallbackOrchestrator::default();
        let result = orchestrator.resolve(&GraphState::new(), 5, &BTreeSet::new(), &[]);
        assert_eq!(result, (Vec::new(), Tier::Catalog));
    }

    #[test]
    fn test_everything_seen_is_empty_catalog() {
        let orchestrator = FallbackOrchestrator::default();
        let seen = BTreeSet::from([10, 20, 30]);
        let result = orchestrator.resolve(&popular_graph(), 5, &seen, &[]);
        assert_eq!(result, (Vec::new(), Tier::Catalog));
    }
}
