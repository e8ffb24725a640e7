pub mod cache;
pub mod engine;
pub mod explain;
pub mod popularity;
pub mod similarity;

pub use cache::{load_or_build, CacheOutcome};
pub use engine::RecommendationEngine;
pub use explain::{ai_score, generate_reason, ReasonInput};
pub use popularity::PopularityTable;
pub use similarity::{build_index, ItemSimilarityIndex, SimilarNeighbor};
