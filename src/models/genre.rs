//! Genre tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric genre tag as stored in the graph.
pub type GenreId = u32;

/// Stable genre enumeration.
///
/// The numeric values are part of the snapshot format and of the preference
/// rows stored by the persistence layer; never renumber them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Genre {
    /// No category recorded.
    #[default]
    Unknown,
    /// Action.
    Action,
    /// Animation.
    Animation,
    /// Comedy.
    Comedy,
    /// Crime.
    Crime,
    /// Drama.
    Drama,
    /// Horror.
    Horror,
    /// Science fiction.
    #[serde(rename = "sci-fi", alias = "scifi")]
    SciFi,
}

impl Genre {
    /// Returns all genre variants in tag order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Unknown,
            Self::Action,
            Self::Animation,
            Self::Comedy,
            Self::Crime,
            Self::Drama,
            Self::Horror,
            Self::SciFi,
        ]
    }

    /// Returns the numeric tag.
    #[must_use]
    pub const fn id(self) -> GenreId {
        match self {
            Self::Unknown => 0,
            Self::Action => 1,
            Self::Animation => 2,
            Self::Comedy => 3,
            Self::Crime => 4,
            Self::Drama => 5,
            Self::Horror => 6,
            Self::SciFi => 7,
        }
    }

    /// Looks up a genre by numeric tag.
    #[must_use]
    pub fn from_id(id: GenreId) -> Option<Self> {
        Self::all().iter().copied().find(|g| g.id() == id)
    }

    /// Returns the display name used by catalog rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Action => "Action",
            Self::Animation => "Animation",
            Self::Comedy => "Comedy",
            Self::Crime => "Crime",
            Self::Drama => "Drama",
            Self::Horror => "Horror",
            Self::SciFi => "Sci-Fi",
        }
    }

    /// Maps a catalog category string to a genre.
    ///
    /// Matching is case-insensitive and ignores `-`, `_` and spaces.
    /// Unrecognized categories map to [`Genre::Unknown`].
    #[must_use]
    pub fn parse(category: &str) -> Self {
        let normalized: String = category
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "action" => Self::Action,
            "animation" | "animated" => Self::Animation,
            "comedy" => Self::Comedy,
            "crime" => Self::Crime,
            "drama" => Self::Drama,
            "horror" => Self::Horror,
            "scifi" | "sciencefiction" => Self::SciFi,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
