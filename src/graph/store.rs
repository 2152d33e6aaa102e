//! Graph state and its locked store.

use super::neighbors::NeighborList;
use crate::models::{GenreId, InteractionRow, ItemId, UserId};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::instrument;

/// Node and edge counts, maintained incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphCounts {
    /// Users with at least one edge.
    pub users: usize,
    /// Items with at least one edge or an explicit genre assignment.
    pub items: usize,
    /// Distinct (user, item) edges.
    pub edges: usize,
}

/// Unlocked graph state.
///
/// Every mutation keeps both adjacency directions consistent and updates the
/// counters, so [`GraphState::counts`] never has to walk the maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphState {
    user_items: HashMap<UserId, NeighborList>,
    item_users: HashMap<ItemId, NeighborList>,
    genres: HashMap<ItemId, GenreId>,
    preferences: HashMap<UserId, BTreeSet<GenreId>>,
    item_count: usize,
    edge_count: usize,
}

impl GraphState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_known_item(&self, item_id: ItemId) -> bool {
        self.item_users.contains_key(&item_id) || self.genres.contains_key(&item_id)
    }

    /// Adds an edge; returns the stored timestamp.
    ///
    /// If the edge already exists nothing changes and the original timestamp
    /// is returned.
    pub fn add_edge(&mut self, user_id: UserId, item_id: ItemId, timestamp: u64) -> u64 {
        if let Some(existing) = self
            .user_items
            .get(&user_id)
            .and_then(|items| items.timestamp(item_id))
        {
            return existing;
        }

        if !self.is_known_item(item_id) {
            self.item_count += 1;
        }
        self.user_items
            .entry(user_id)
            .or_default()
            .insert(item_id, timestamp);
        self.item_users
            .entry(item_id)
            .or_default()
            .insert(user_id, timestamp);
        self.edge_count += 1;
        timestamp
    }

    /// Removes an edge; returns `true` if it existed.
    ///
    /// Nodes left without neighbors are dropped from the adjacency maps. An
    /// item with an explicit genre stays known to the catalog.
    pub fn remove_edge(&mut self, user_id: UserId, item_id: ItemId) -> bool {
        let Some(items) = self.user_items.get_mut(&user_id) else {
            return false;
        };
        if items.remove(item_id).is_none() {
            return false;
        }
        if items.is_empty() {
            self.user_items.remove(&user_id);
        }

        if let Some(users) = self.item_users.get_mut(&item_id) {
            users.remove(user_id);
            if users.is_empty() {
                self.item_users.remove(&item_id);
                if !self.genres.contains_key(&item_id) {
                    self.item_count -= 1;
                }
            }
        }
        self.edge_count -= 1;
        true
    }

    /// Upserts an item's genre tag.
    pub fn set_item_genre(&mut self, item_id: ItemId, genre_id: GenreId) {
        if !self.is_known_item(item_id) {
            self.item_count += 1;
        }
        self.genres.insert(item_id, genre_id);
    }

    /// Replaces a user's preferred genres; an empty set clears them.
    ///
    /// Returns `true` if the stored preferences changed.
    pub fn set_user_preferences(&mut self, user_id: UserId, genres: BTreeSet<GenreId>) -> bool {
        if genres.is_empty() {
            return self.preferences.remove(&user_id).is_some();
        }
        self.preferences.insert(user_id, genres.clone()) != Some(genres)
    }

    /// Genre tag of an item (0 when never set).
    #[must_use]
    pub fn genre_of(&self, item_id: ItemId) -> GenreId {
        self.genres.get(&item_id).copied().unwrap_or_default()
    }

    /// Stored genre preferences of a user.
    #[must_use]
    pub fn preferences_of(&self, user_id: UserId) -> Option<&BTreeSet<GenreId>> {
        self.preferences.get(&user_id)
    }

    /// Items liked by a user.
    #[must_use]
    pub fn user_neighbors(&self, user_id: UserId) -> Option<&NeighborList> {
        self.user_items.get(&user_id)
    }

    /// Users who liked an item.
    #[must_use]
    pub fn item_neighbors(&self, item_id: ItemId) -> Option<&NeighborList> {
        self.item_users.get(&item_id)
    }

    /// Timestamp of an edge, if present.
    #[must_use]
    pub fn edge_timestamp(&self, user_id: UserId, item_id: ItemId) -> Option<u64> {
        self.user_items
            .get(&user_id)
            .and_then(|items| items.timestamp(item_id))
    }

    /// Current counts.
    #[must_use]
    pub fn counts(&self) -> GraphCounts {
        GraphCounts {
            users: self.user_items.len(),
            items: self.item_count,
            edges: self.edge_count,
        }
    }

    /// Most-liked items as `(item, degree)`, by degree desc then id asc.
    #[must_use]
    pub fn popular_items(&self, limit: usize) -> Vec<(ItemId, usize)> {
        let mut ranked: Vec<(ItemId, usize)> = self
            .item_users
            .iter()
            .map(|(item_id, users)| (*item_id, users.len()))
            .collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    /// Known items in ascending id order.
    #[must_use]
    pub fn catalog_items(&self, limit: usize) -> Vec<ItemId> {
        let known: BTreeSet<ItemId> = self
            .item_users
            .keys()
            .chain(self.genres.keys())
            .copied()
            .collect();
        known.into_iter().take(limit).collect()
    }

    /// Iterates users with their liked items in ascending user id order.
    pub fn users_sorted(&self) -> Vec<(UserId, &NeighborList)> {
        let mut users: Vec<(UserId, &NeighborList)> =
            self.user_items.iter().map(|(id, list)| (*id, list)).collect();
        users.sort_unstable_by_key(|(id, _)| *id);
        users
    }

    /// Explicit genre assignments in ascending item id order.
    #[must_use]
    pub fn genres_sorted(&self) -> Vec<(ItemId, GenreId)> {
        let mut genres: Vec<(ItemId, GenreId)> =
            self.genres.iter().map(|(id, genre)| (*id, *genre)).collect();
        genres.sort_unstable_by_key(|(id, _)| *id);
        genres
    }

    /// Stored preferences in ascending user id order.
    pub fn preferences_sorted(&self) -> Vec<(UserId, &BTreeSet<GenreId>)> {
        let mut prefs: Vec<(UserId, &BTreeSet<GenreId>)> =
            self.preferences.iter().map(|(id, set)| (*id, set)).collect();
        prefs.sort_unstable_by_key(|(id, _)| *id);
        prefs
    }

    /// Number of explicit genre assignments.
    #[must_use]
    pub fn genre_entries(&self) -> usize {
        self.genres.len()
    }

    /// Number of users with stored preferences.
    #[must_use]
    pub fn preference_entries(&self) -> usize {
        self.preferences.len()
    }

    /// Bulk-loads interaction rows.
    ///
    /// Rows are stably sorted by `(user, item)` first so every neighbor list
    /// grows by appending. Duplicate pairs keep the timestamp of the first
    /// row, as with [`GraphState::add_edge`].
    pub fn load_interactions(&mut self, mut rows: Vec<InteractionRow>) {
        rows.sort_by_key(|row| (row.user_id, row.item_id));
        for row in rows {
            self.add_edge(row.user_id, row.item_id, row.timestamp);
        }
    }
}

/// Shared, lock-protected graph store.
///
/// Constructed explicitly and shared via `Arc`; there is no process-global
/// instance.
///
/// # Example
///
/// ```rust
/// use graphrec::GraphStore;
///
/// let store = GraphStore::new();
/// store.add_edge(1, 10, 1_700_000_000);
/// assert_eq!(store.counts().edges, 1);
/// assert!(store.neighbors_of_item(10).contains(&1));
/// ```
#[derive(Debug, Default)]
pub struct GraphStore {
    state: RwLock<GraphState>,
}

impl GraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing state.
    #[must_use]
    pub fn from_state(state: GraphState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Takes a shared read guard for a multi-step traversal.
    ///
    /// Hold the guard only for in-memory work; never across I/O.
    pub fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read()
    }

    /// Adds an edge in both directions; idempotent.
    ///
    /// Returns the stored timestamp, which is the original one for duplicates.
    #[instrument(skip(self), fields(operation = "add_edge"))]
    pub fn add_edge(&self, user_id: UserId, item_id: ItemId, timestamp: u64) -> u64 {
        let stored = self.state.write().add_edge(user_id, item_id, timestamp);
        metrics::counter!("graph_mutations_total", "op" => "add_edge").increment(1);
        stored
    }

    /// Removes an edge from both directions; idempotent.
    #[instrument(skip(self), fields(operation = "remove_edge"))]
    pub fn remove_edge(&self, user_id: UserId, item_id: ItemId) -> bool {
        let removed = self.state.write().remove_edge(user_id, item_id);
        metrics::counter!("graph_mutations_total", "op" => "remove_edge").increment(1);
        removed
    }

    /// Upserts an item's genre tag.
    pub fn set_item_genre(&self, item_id: ItemId, genre_id: GenreId) {
        self.state.write().set_item_genre(item_id, genre_id);
        metrics::counter!("graph_mutations_total", "op" => "set_item_genre").increment(1);
    }

    /// Replaces a user's preferred genres.
    pub fn set_user_preferences(
        &self,
        user_id: UserId,
        genres: impl IntoIterator<Item = GenreId>,
    ) -> bool {
        let genres: BTreeSet<GenreId> = genres.into_iter().collect();
        let changed = self.state.write().set_user_preferences(user_id, genres);
        metrics::counter!("graph_mutations_total", "op" => "set_preferences").increment(1);
        changed
    }

    /// Items liked by a user; empty for unknown users.
    #[must_use]
    pub fn neighbors_of_user(&self, user_id: UserId) -> BTreeSet<ItemId> {
        self.state
            .read()
            .user_neighbors(user_id)
            .map(|items| items.ids().collect())
            .unwrap_or_default()
    }

    /// Users who liked an item; empty for unknown items.
    #[must_use]
    pub fn neighbors_of_item(&self, item_id: ItemId) -> BTreeSet<UserId> {
        self.state
            .read()
            .item_neighbors(item_id)
            .map(|users| users.ids().collect())
            .unwrap_or_default()
    }

    /// Genre tag of an item (0 when never set).
    #[must_use]
    pub fn genre_of(&self, item_id: ItemId) -> GenreId {
        self.state.read().genre_of(item_id)
    }

    /// Stored genre preferences of a user; empty when none.
    #[must_use]
    pub fn preferences_of(&self, user_id: UserId) -> BTreeSet<GenreId> {
        self.state
            .read()
            .preferences_of(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Timestamp of an edge, if present.
    #[must_use]
    pub fn edge_timestamp(&self, user_id: UserId, item_id: ItemId) -> Option<u64> {
        self.state.read().edge_timestamp(user_id, item_id)
    }

    /// Node and edge counts in O(1).
    #[must_use]
    pub fn counts(&self) -> GraphCounts {
        self.state.read().counts()
    }

    /// Swaps in a whole new state (e.g. one decoded from a snapshot).
    pub fn replace(&self, state: GraphState) {
        *self.state.write() = state;
    }

    /// Clones the current state.
    #[must_use]
    pub fn clone_state(&self) -> GraphState {
        self.state.read().clone()
    }
}
