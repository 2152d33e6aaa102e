//! Rows exchanged with the persistence layer.

use super::genre::{Genre, GenreId};
use super::{ItemId, UserId};
use serde::{Deserialize, Serialize};

/// A recorded like, as stored by the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionRow {
    /// User who liked the item.
    pub user_id: UserId,
    /// Item that was liked.
    pub item_id: ItemId,
    /// Unix seconds.
    pub timestamp: u64,
}

impl InteractionRow {
    /// Creates a new interaction row.
    #[must_use]
    pub const fn new(user_id: UserId, item_id: ItemId, timestamp: u64) -> Self {
        Self {
            user_id,
            item_id,
            timestamp,
        }
    }
}

/// Catalog metadata used to hydrate recommendation results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Item identifier.
    pub id: ItemId,
    /// Display title.
    pub title: String,
    /// Free-form category string (mapped to a [`Genre`]).
    pub category: String,
}

impl ItemMeta {
    /// Creates catalog metadata for an item.
    pub fn new(id: ItemId, title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            category: category.into(),
        }
    }

    /// Placeholder metadata for items missing from the catalog.
    #[must_use]
    pub fn unknown(id: ItemId) -> Self {
        Self::new(id, format!("Unknown {id}"), Genre::Unknown.as_str())
    }

    /// Genre derived from the category string.
    #[must_use]
    pub fn genre(&self) -> Genre {
        Genre::parse(&self.category)
    }
}

/// A user's stated genre preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreferenceRow {
    /// User the preference belongs to.
    pub user_id: UserId,
    /// Preferred genre tag.
    pub genre_id: GenreId,
}
