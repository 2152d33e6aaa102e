//! Sorted adjacency list with edge timestamps.

/// Neighbors of a single node, sorted by neighbor id.
///
/// Sorted storage gives deterministic iteration order (which keeps seeded
/// random walks reproducible) and O(1) access by position for uniform
/// sampling. Membership is a binary search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborList {
    entries: Vec<(u64, u64)>,
}

impl NeighborList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of neighbors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no neighbors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `id` is a neighbor.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.position(id).is_ok()
    }

    /// Returns the edge timestamp for neighbor `id`.
    #[must_use]
    pub fn timestamp(&self, id: u64) -> Option<u64> {
        self.position(id).ok().map(|pos| self.entries[pos].1)
    }

    /// Inserts a neighbor; returns the existing timestamp if already present.
    pub fn insert(&mut self, id: u64, timestamp: u64) -> Option<u64> {
        match self.position(id) {
            Ok(pos) => Some(self.entries[pos].1),
            Err(pos) => {
                self.entries.insert(pos, (id, timestamp));
                None
            },
        }
    }

    /// Removes a neighbor; returns its timestamp if it was present.
    pub fn remove(&mut self, id: u64) -> Option<u64> {
        self.position(id)
            .ok()
            .map(|pos| self.entries.remove(pos).1)
    }

    /// Neighbor id at `index` in ascending id order.
    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(|(id, _)| *id)
    }

    /// Iterates neighbor ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Iterates `(neighbor id, timestamp)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.entries.iter().copied()
    }

    fn position(&self, id: u64) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by_key(&id, |(neighbor, _)| *neighbor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_sorted_order() {
        let mut list = NeighborList::new();
        list.insert(30, 3);
        list.insert(10, 1);
        list.insert(20, 2);
        assert_eq!(list.ids().collect::<Vec<_>>(), vec![10, 20, 30]);
        assert_eq!(list.id_at(0), Some(10));
        assert_eq!(list.id_at(3), None);
    }

    #[test]
    fn test_duplicate_insert_returns_existing_timestamp() {
        let mut list = NeighborList::new();
        assert_eq!(list.insert(5, 100), None);
        assert_eq!(list.insert(5, 999), Some(100));
        assert_eq!(list.len(), 1);
        assert_eq!(list.timestamp(5), Some(100));
    }

    #[test]
    fn test_remove() {
        let mut list = NeighborList::new();
        list.insert(1, 10);
        assert_eq!(list.remove(2), None);
        assert_eq!(list.remove(1), Some(10));
        assert!(list.is_empty());
        assert!(!list.contains(1));
    }
}
