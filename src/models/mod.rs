use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub type UserId = i64;
pub type MovieId = i64;

/// A single already-cleaned rating record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub rating: f64,
    pub timestamp: i64,
}

/// Movie metadata. Genres are lowercased; the ordered set gives the
/// alphabetical order the explanation text relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub movie_id: MovieId,
    pub title: String,
    pub genres: BTreeSet<String>,
}

/// One row of the precomputed popularity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularMovie {
    pub movie_id: MovieId,
    pub rating_count: u64,
    pub rating_avg: f64,
}

/// Ratings grouped by user, with derived per-user means.
///
/// Immutable after construction. Per-user histories keep the insertion order
/// of the source table; users keep first-seen order so that index builds are
/// reproducible run to run.
#[derive(Debug, Clone)]
pub struct RatingIndex {
    histories: HashMap<UserId, Vec<(MovieId, f64)>>,
    user_order: Vec<UserId>,
    user_means: HashMap<UserId, f64>,
}

impl RatingIndex {
    /// Group validated rating records by user.
    ///
    /// Fails fast with `InvalidInput` on a rating outside [0.5, 5.0].
    pub fn from_records(records: &[Rating]) -> Result<Self> {
        let mut histories: HashMap<UserId, Vec<(MovieId, f64)>> = HashMap::new();
        let mut user_order: Vec<UserId> = Vec::new();

        for r in records {
            if !(0.5..=5.0).contains(&r.rating) {
                return Err(AppError::InvalidInput(format!(
                    "rating {} for user {} movie {} is outside [0.5, 5.0]",
                    r.rating, r.user_id, r.movie_id
                )));
            }
            let history = histories.entry(r.user_id).or_insert_with(|| {
                user_order.push(r.user_id);
                Vec::new()
            });
            history.push((r.movie_id, r.rating));
        }

        let mut user_means = HashMap::with_capacity(histories.len());
        for (user_id, history) in &histories {
            let sum: f64 = history.iter().map(|(_, r)| r).sum();
            user_means.insert(*user_id, sum / history.len() as f64);
        }

        Ok(Self {
            histories,
            user_order,
            user_means,
        })
    }

    pub fn history(&self, user_id: UserId) -> Option<&[(MovieId, f64)]> {
        self.histories.get(&user_id).map(|h| h.as_slice())
    }

    pub fn user_mean(&self, user_id: UserId) -> Option<f64> {
        self.user_means.get(&user_id).copied()
    }

    /// Users in first-seen order.
    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.user_order.iter().copied()
    }

    pub fn user_count(&self) -> usize {
        self.user_order.len()
    }

    pub fn rating_count(&self) -> usize {
        self.histories.values().map(|h| h.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.user_order.is_empty()
    }
}

/// Title and genre lookups for explanation text.
#[derive(Debug, Clone, Default)]
pub struct MovieCatalog {
    titles: HashMap<MovieId, String>,
    genres: HashMap<MovieId, BTreeSet<String>>,
}

impl MovieCatalog {
    pub fn from_records(records: &[Movie]) -> Self {
        let mut titles = HashMap::with_capacity(records.len());
        let mut genres = HashMap::with_capacity(records.len());
        for m in records {
            titles.insert(m.movie_id, m.title.clone());
            genres.insert(m.movie_id, m.genres.clone());
        }
        Self { titles, genres }
    }

    pub fn title(&self, movie_id: MovieId) -> Option<&str> {
        self.titles.get(&movie_id).map(|t| t.as_str())
    }

    pub fn genres(&self, movie_id: MovieId) -> Option<&BTreeSet<String>> {
        self.genres.get(&movie_id)
    }

    pub fn movie_count(&self) -> usize {
        self.titles.len()
    }
}

/// Reason category, also used as the factor kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryReason {
    Popular,
    BecauseYouRated,
    GenreOverlap,
    Social,
}

/// One weighted contributing factor behind an explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    #[serde(rename = "type")]
    pub kind: PrimaryReason,
    pub weight: f64,
    pub payload: serde_json::Value,
}

/// Structured, human-readable reason for one recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub primary_reason: PrimaryReason,
    pub confidence: f64,
    pub text: String,
    pub factors: Vec<Factor>,
}

/// One entry of a recommendation page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub movie_id: MovieId,
    pub score: f64,
    pub rank: usize,
    pub explanation: Explanation,
}

/// Parameters of a single `recommend` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendRequest {
    pub user_id: UserId,
    pub limit: usize,
    pub offset: usize,
    #[serde(default)]
    pub exclude_movie_ids: Vec<MovieId>,
    #[serde(default)]
    pub seed_movie_ids: Vec<MovieId>,
    #[serde(default)]
    pub use_social: bool,
}

impl Default for RecommendRequest {
    fn default() -> Self {
        Self {
            user_id: 0,
            limit: 20,
            offset: 0,
            exclude_movie_ids: Vec::new(),
            seed_movie_ids: Vec::new(),
            use_social: false,
        }
    }
}

/// Placeholder until a real friend graph is wired in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialSignals {
    pub friend_ratings_count: u32,
    pub friend_ratings_avg: Option<f64>,
    pub friend_watch_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub movie_id: MovieId,
    /// `round(confidence * 100)`.
    pub ai_score: u32,
    pub explanation: Explanation,
    pub social_signals: SocialSignals,
}

/// Snapshot counts for health/info endpoints upstream.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub users: usize,
    pub movies: usize,
    pub indexed_items: usize,
    pub built_at: Option<chrono::DateTime<chrono::Utc>>,
}
