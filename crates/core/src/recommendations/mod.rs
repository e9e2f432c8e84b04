//! Product recommendation engine
//!
//! Ranks products from two static datasets: basket-affinity rules mined from
//! past orders, and per-product transaction counts. Ranking is pure and
//! deterministic; presenting the result in natural language happens in the
//! agent layer.

mod datasets;
mod engine;
mod types;

pub use datasets::{AffinityTable, PopularityTable};
pub use engine::RecommendationEngine;
pub use types::*;

/// Maximum recommendations to return
pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 5;

/// Maximum recommendations per category for diversity
pub const MAX_PER_CATEGORY: usize = 2;
