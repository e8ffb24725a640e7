//! Item-based collaborative-filtering recommendation engine.
//!
//! Turns a table of user ratings into an item-item similarity index,
//! ranks candidate items for a user (with cold-start and seed-item
//! handling), and produces a deterministic, explainable reason for each
//! recommendation.
//!
//! Typical flow: load the processed tables, assemble a
//! [`RecommendationEngine`], `fit()` (or `load_or_fit()` through the
//! similarity cache), then serve `recommend()`/`explain()` calls against the
//! immutable snapshot.
//!
//! ```no_run
//! use recommendation_engine::{Config, RecommendationEngine, RecommendRequest};
//! use recommendation_engine::dataset;
//!
//! # fn main() -> recommendation_engine::Result<()> {
//! let config = Config::from_env();
//! let ratings = dataset::load_ratings(&config.data.ratings_csv)?;
//! let movies = dataset::load_movies(&config.data.movies_csv)?;
//! let popular = dataset::load_popular(&config.data.popular_csv)?;
//!
//! let engine = RecommendationEngine::from_tables(config.engine, &ratings, &movies, popular)?;
//! engine.load_or_fit(&config.data.sims_cache)?;
//!
//! let page = engine.recommend(&RecommendRequest {
//!     user_id: 1,
//!     limit: 20,
//!     ..RecommendRequest::default()
//! })?;
//! # let _ = page;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod services;

pub use config::{Config, DataConfig, EngineConfig};
pub use error::{AppError, Result};
pub use models::{
    EngineInfo, ExplainResponse, Explanation, Factor, Movie, MovieCatalog, MovieId, PopularMovie,
    PrimaryReason, RankedItem, Rating, RatingIndex, RecommendRequest, SocialSignals, UserId,
};
pub use services::{
    build_index, CacheOutcome, ItemSimilarityIndex, PopularityTable, RecommendationEngine,
    SimilarNeighbor,
};
