use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub engine: EngineConfig,
}

/// Locations of the processed tables and the similarity cache artifact.
///
/// File names are derived from `processed_dir` unless overridden.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub processed_dir: PathBuf,
    pub ratings_csv: PathBuf,
    pub movies_csv: PathBuf,
    pub popular_csv: PathBuf,
    pub sims_cache: PathBuf,
}

/// Knobs for the similarity build and the ranking policy.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Minimum effective history (rated items plus seeds) for personalized
    /// scoring; below this the engine falls back to seeds or popularity.
    pub min_user_history: usize,

    /// Hard cap on the per-request page size.
    pub max_k: usize,

    /// Minimum number of common raters for an item pair to enter the index.
    pub min_common_raters: u32,

    /// Neighbor list length cap per item.
    pub topk_sim_per_item: usize,

    /// Optional cap on how many of a user's most recent ratings enter the
    /// pairwise build. The pairwise pass is O(n^2) per user, so one user with
    /// thousands of ratings can dominate build time. Off by default: capping
    /// changes results for power users.
    pub max_build_history: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_user_history: 5,
            max_k: 50,
            min_common_raters: 2,
            topk_sim_per_item: 200,
            max_build_history: None,
        }
    }
}

impl DataConfig {
    /// Derive all table paths from a processed-data directory.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            ratings_csv: dir.join("ratings.csv"),
            movies_csv: dir.join("movies.csv"),
            popular_csv: dir.join("popular_movies.csv"),
            sims_cache: dir.join("item_sims.bin"),
            processed_dir: dir,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self::from_dir("data/processed")
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let processed_dir =
            env::var("PROCESSED_DIR").unwrap_or_else(|_| "data/processed".to_string());
        let mut data = DataConfig::from_dir(processed_dir);
        if let Ok(path) = env::var("SIMS_CACHE") {
            data.sims_cache = PathBuf::from(path);
        }

        let engine = EngineConfig {
            min_user_history: env::var("MIN_USER_HISTORY")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("MIN_USER_HISTORY must be a valid usize"),
            max_k: env::var("MAX_K")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .expect("MAX_K must be a valid usize"),
            min_common_raters: env::var("MIN_COMMON_RATERS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .expect("MIN_COMMON_RATERS must be a valid u32"),
            topk_sim_per_item: env::var("TOPK_SIM_PER_ITEM")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .expect("TOPK_SIM_PER_ITEM must be a valid usize"),
            max_build_history: env::var("MAX_BUILD_HISTORY")
                .ok()
                .map(|v| v.parse().expect("MAX_BUILD_HISTORY must be a valid usize")),
        };

        Config { data, engine }
    }
}
