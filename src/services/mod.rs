//! Business logic services.
//!
//! Services orchestrate the graph, the ranking algorithms, the cache and
//! storage to provide high-level operations.

pub mod bootstrap;
mod engine;
mod fallback;

pub use bootstrap::{BootReport, BootSource, load_graph, shutdown};
pub use engine::RecommendationEngine;
pub use fallback::{DEFAULT_POPULARITY_MARGIN, FallbackOrchestrator};
