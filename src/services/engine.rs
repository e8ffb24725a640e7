// ============================================
// Recommendation Engine
// ============================================
//
// Explicit context object owning the immutable data snapshots:
//   RatingIndex + MovieCatalog + PopularityTable + ItemSimilarityIndex
//
// The similarity index lives behind an Arc that is swapped atomically on
// refresh, so concurrent recommend/explain calls always see a complete
// snapshot and need no locking on the hot path.
//
// Scoring: predicted(item) = sum(sim * seed_rating) / sum(|sim|) over the
// item's similar seeds, ranked descending, paginated, then min-max
// normalized within the returned page only. Page-relative normalization is
// deliberate: scores are comparable within one response, not across pages.

use crate::config::EngineConfig;
use crate::error::{AppError, Result};
use crate::models::{
    EngineInfo, ExplainResponse, Movie, MovieCatalog, MovieId, PopularMovie, RankedItem, Rating,
    RatingIndex, RecommendRequest, SocialSignals, UserId,
};
use crate::services::cache::{self, CacheOutcome};
use crate::services::explain::{ai_score, generate_reason, ReasonInput};
use crate::services::popularity::PopularityTable;
use crate::services::similarity::{build_index, ItemSimilarityIndex};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Synthetic "soft like" rating assigned to seed items blended into history.
const SEED_RATING: f64 = 4.0;

/// Floor for prediction denominators. The denominator is a sum of absolute
/// similarities and is positive whenever a candidate exists; the floor only
/// guards float underflow.
const MIN_DENOMINATOR: f64 = 1e-9;

/// Two page scores closer than this are treated as identical when
/// normalizing.
const SCORE_EPSILON: f64 = 1e-9;

pub struct RecommendationEngine {
    config: EngineConfig,
    ratings: RatingIndex,
    catalog: MovieCatalog,
    popular: PopularityTable,
    index: RwLock<Option<Arc<ItemSimilarityIndex>>>,
}

/// Per-request candidate accumulator. Tracks first-insertion order so that
/// equal predicted scores rank in the order candidates were discovered.
#[derive(Default)]
struct CandidateAccumulator {
    order: Vec<MovieId>,
    entries: HashMap<MovieId, Candidate>,
}

#[derive(Clone, Copy)]
struct Candidate {
    numerator: f64,
    denominator: f64,
    best_seed: Option<(MovieId, f64)>,
}

struct ScoredCandidate {
    movie_id: MovieId,
    predicted: f64,
    best_seed: Option<MovieId>,
}

impl CandidateAccumulator {
    fn add(&mut self, movie_id: MovieId, seed_movie_id: MovieId, similarity: f64, seed_rating: f64) {
        let contribution = similarity * seed_rating;
        let order = &mut self.order;
        let entry = self.entries.entry(movie_id).or_insert_with(|| {
            order.push(movie_id);
            Candidate {
                numerator: 0.0,
                denominator: 0.0,
                best_seed: None,
            }
        });

        entry.numerator += contribution;
        entry.denominator += similarity.abs();
        match entry.best_seed {
            Some((_, best)) if best >= contribution => {}
            _ => entry.best_seed = Some((seed_movie_id, contribution)),
        }
    }

    /// Candidates in first-insertion order with their predicted scores.
    fn into_scored(self) -> Vec<ScoredCandidate> {
        let entries = self.entries;
        self.order
            .into_iter()
            .map(|movie_id| {
                let c = entries[&movie_id];
                ScoredCandidate {
                    movie_id,
                    predicted: c.numerator / c.denominator.max(MIN_DENOMINATOR),
                    best_seed: c.best_seed.map(|(seed, _)| seed),
                }
            })
            .collect()
    }
}

impl RecommendationEngine {
    /// Assemble an engine from already-validated tabular records. The
    /// popularity table is taken as precomputed and pre-sorted.
    ///
    /// Fails fast with `InvalidInput` on malformed rating records. The
    /// similarity index is not built yet; call [`fit`](Self::fit) or
    /// [`load_or_fit`](Self::load_or_fit) before serving.
    pub fn from_tables(
        config: EngineConfig,
        ratings: &[Rating],
        movies: &[Movie],
        popular: Vec<PopularMovie>,
    ) -> Result<Self> {
        let ratings = RatingIndex::from_records(ratings)?;
        let catalog = MovieCatalog::from_records(movies);
        info!(
            users = ratings.user_count(),
            ratings = ratings.rating_count(),
            movies = catalog.movie_count(),
            popular = popular.len(),
            "Recommendation engine tables loaded"
        );

        Ok(Self {
            config,
            ratings,
            catalog,
            popular: PopularityTable::new(popular),
            index: RwLock::new(None),
        })
    }

    /// Build a fresh similarity index and swap it in atomically. In-flight
    /// readers keep the snapshot they already hold.
    pub fn fit(&self) -> Result<()> {
        let index = build_index(&self.ratings, &self.config)?;
        self.swap_index(index);
        Ok(())
    }

    /// Load the similarity index from the cache artifact at `path`, or build
    /// and best-effort persist it.
    pub fn load_or_fit(&self, path: &Path) -> Result<CacheOutcome> {
        let (index, outcome) = cache::load_or_build(path, &self.ratings, &self.config)?;
        self.swap_index(index);
        Ok(outcome)
    }

    fn swap_index(&self, index: ItemSimilarityIndex) {
        let mut guard = match self.index.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::new(index));
    }

    fn snapshot(&self) -> Option<Arc<ItemSimilarityIndex>> {
        let guard = match self.index.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    /// Rank candidate items for a user.
    ///
    /// Falls back to seed-only scoring or the popularity window when the
    /// effective history is below `min_user_history`, and to the popularity
    /// window when personalized scoring yields an empty page. Never fails on
    /// "no personalization possible"; only on a missing index.
    pub fn recommend(&self, request: &RecommendRequest) -> Result<Vec<RankedItem>> {
        let index = self.snapshot().ok_or(AppError::NotLoaded)?;

        let limit = request.limit.min(self.config.max_k);
        let exclude: HashSet<MovieId> = request.exclude_movie_ids.iter().copied().collect();

        // Local copy per request: seed blending never touches shared state.
        let mut history: Vec<(MovieId, f64)> = self
            .ratings
            .history(request.user_id)
            .map(|h| h.to_vec())
            .unwrap_or_default();
        let rated: HashSet<MovieId> = history.iter().map(|(m, _)| *m).collect();

        // Seeds are deduplicated so a repeated id contributes once.
        let mut seeds: Vec<MovieId> = Vec::new();
        for m in request.seed_movie_ids.iter().copied() {
            if !exclude.contains(&m) && !seeds.contains(&m) {
                seeds.push(m);
            }
        }

        let mut seen = rated.clone();
        seen.extend(seeds.iter().copied());

        // Rated items stay out of fallback pages too, not just scored ones.
        let fallback_exclude: HashSet<MovieId> = exclude.union(&seen).copied().collect();

        if seen.len() < self.config.min_user_history {
            if seeds.is_empty() {
                debug!(
                    user_id = request.user_id,
                    history = rated.len(),
                    "Cold start, serving popularity fallback"
                );
                return Ok(self.popular.window(limit, request.offset, &fallback_exclude));
            }
            // Seed-only: score from the seeds alone as pseudo-history.
            history = seeds.iter().map(|m| (*m, SEED_RATING)).collect();
        } else {
            for seed in &seeds {
                if !rated.contains(seed) {
                    history.push((*seed, SEED_RATING));
                }
            }
        }

        let mut accumulator = CandidateAccumulator::default();
        for (seed_movie_id, seed_rating) in &history {
            for neighbor in index.neighbors_of(*seed_movie_id) {
                if seen.contains(&neighbor.movie_id) || exclude.contains(&neighbor.movie_id) {
                    continue;
                }
                accumulator.add(
                    neighbor.movie_id,
                    *seed_movie_id,
                    neighbor.similarity,
                    *seed_rating,
                );
            }
        }

        let mut scored = accumulator.into_scored();
        // Stable sort: ties keep first-insertion order.
        scored.sort_by(|a, b| {
            b.predicted
                .partial_cmp(&a.predicted)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let window: Vec<ScoredCandidate> = scored
            .into_iter()
            .skip(request.offset)
            .take(limit)
            .collect();

        if window.is_empty() {
            debug!(
                user_id = request.user_id,
                "No personalized candidates, serving popularity fallback"
            );
            return Ok(self.popular.window(limit, request.offset, &fallback_exclude));
        }

        // Min-max normalization within this page only. All-equal pages
        // flatten to 0.5.
        let min = window.iter().map(|c| c.predicted).fold(f64::INFINITY, f64::min);
        let max = window
            .iter()
            .map(|c| c.predicted)
            .fold(f64::NEG_INFINITY, f64::max);
        let to_unit = |x: f64| {
            if max - min < SCORE_EPSILON {
                0.5
            } else {
                (x - min) / (max - min)
            }
        };

        let items = window
            .iter()
            .enumerate()
            .map(|(idx, candidate)| RankedItem {
                movie_id: candidate.movie_id,
                score: to_unit(candidate.predicted),
                rank: request.offset + idx + 1,
                explanation: generate_reason(&ReasonInput {
                    rec_movie_id: candidate.movie_id,
                    seed_movie_id: candidate.best_seed,
                    catalog: &self.catalog,
                    use_social: request.use_social,
                    friend_ids: None,
                }),
            })
            .collect();

        Ok(items)
    }

    /// Explain why `movie_id` would be recommended to `user_id`, using the
    /// user's most similar rated item as the seed when one exists.
    pub fn explain(
        &self,
        user_id: UserId,
        movie_id: MovieId,
        use_social: bool,
    ) -> Result<ExplainResponse> {
        let index = self.snapshot().ok_or(AppError::NotLoaded)?;

        let mut best: Option<(MovieId, f64)> = None;
        if let Some(history) = self.ratings.history(user_id) {
            for (seed_movie_id, _) in history {
                for neighbor in index.neighbors_of(*seed_movie_id) {
                    if neighbor.movie_id != movie_id {
                        continue;
                    }
                    match best {
                        Some((_, sim)) if sim >= neighbor.similarity => {}
                        _ => best = Some((*seed_movie_id, neighbor.similarity)),
                    }
                }
            }
        }

        let explanation = generate_reason(&ReasonInput {
            rec_movie_id: movie_id,
            seed_movie_id: best.map(|(seed, _)| seed),
            catalog: &self.catalog,
            use_social,
            friend_ids: None,
        });

        Ok(ExplainResponse {
            movie_id,
            ai_score: ai_score(explanation.confidence),
            explanation,
            // No real social graph is wired in; placeholders by contract.
            social_signals: SocialSignals::default(),
        })
    }

    /// Snapshot counts for upstream health/info surfaces.
    pub fn info(&self) -> EngineInfo {
        let snapshot = self.snapshot();
        EngineInfo {
            users: self.ratings.user_count(),
            movies: self.catalog.movie_count(),
            indexed_items: snapshot.as_ref().map(|i| i.item_count()).unwrap_or(0),
            built_at: snapshot.map(|i| i.built_at()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn popularity(&self) -> &PopularityTable {
        &self.popular
    }
}
