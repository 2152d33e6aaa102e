//! Data models for graphrec.
//!
//! This module contains the value types that cross component boundaries:
//! genre tags, catalog rows, recommendation requests and results.

mod catalog;
mod genre;
mod recommendation;

pub use catalog::{InteractionRow, ItemMeta, PreferenceRow};
pub use genre::{Genre, GenreId};
pub use recommendation::{
    Algorithm, RecommendRequest, Recommendation, RecommendedItem, Tier, non_negative,
};

/// Identifier of a user node.
pub type UserId = u64;

/// Identifier of an item node.
pub type ItemId = u64;
