//! Row source trait.

use crate::Result;
use crate::models::{InteractionRow, ItemMeta, PreferenceRow};

/// Source of the rows the graph and catalog are rebuilt from.
///
/// # Implementor Notes
///
/// - Rows may be returned in any order; duplicates are tolerated
/// - Negative ids or timestamps in the backing store must be rejected, not wrapped
pub trait RowSource: Send + Sync {
    /// Returns every interaction row.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read.
    fn interactions(&self) -> Result<Vec<InteractionRow>>;

    /// Returns catalog metadata for every known item.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read.
    fn catalog(&self) -> Result<Vec<ItemMeta>>;

    /// Returns every user genre preference row.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read.
    fn preferences(&self) -> Result<Vec<PreferenceRow>>;
}
