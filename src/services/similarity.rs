// ============================================
// Item-Item Similarity Builder
// ============================================
//
// Batch-fits the item similarity index from the rating index:
// - mean-center ratings per user
// - accumulate co-rating dot products and per-item centered norms
// - cosine = dot / sqrt(norm_i * norm_j), positive correlations only
// - per-item neighbor lists sorted descending, truncated to top-K
//
// Data Flow:
//   RatingIndex → pairwise accumulation per user → ItemSimilarityIndex

use crate::config::EngineConfig;
use crate::error::{AppError, Result};
use crate::models::{MovieId, RatingIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::info;

/// One neighbor of an item in the similarity index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarNeighbor {
    pub movie_id: MovieId,
    /// Cosine of mean-centered co-ratings, in (0, 1].
    pub similarity: f64,
    /// Number of users who rated both items.
    pub common_raters: u32,
}

/// Immutable item-item similarity index. Produced in one batch pass and
/// replaced wholesale on refresh, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSimilarityIndex {
    neighbors: HashMap<MovieId, Vec<SimilarNeighbor>>,
    built_at: DateTime<Utc>,
}

impl ItemSimilarityIndex {
    /// Neighbor list for an item, best-first. Empty for unknown items.
    pub fn neighbors_of(&self, movie_id: MovieId) -> &[SimilarNeighbor] {
        self.neighbors
            .get(&movie_id)
            .map(|n| n.as_slice())
            .unwrap_or(&[])
    }

    pub fn item_count(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn items(&self) -> impl Iterator<Item = MovieId> + '_ {
        self.neighbors.keys().copied()
    }
}

/// Build the similarity index from grouped ratings.
///
/// Cost is O(n^2) in each user's history length; `max_build_history` bounds
/// the worst case by keeping only the most recent N entries per user.
///
/// Fails with `NotLoaded` when the rating index is empty. Never mutates the
/// rating index.
pub fn build_index(ratings: &RatingIndex, config: &EngineConfig) -> Result<ItemSimilarityIndex> {
    if ratings.is_empty() {
        return Err(AppError::NotLoaded);
    }

    let mut norms: HashMap<MovieId, f64> = HashMap::new();
    let mut dots: HashMap<(MovieId, MovieId), f64> = HashMap::new();
    let mut commons: HashMap<(MovieId, MovieId), u32> = HashMap::new();

    // Users are visited in first-seen order so that floating-point
    // accumulation is reproducible across runs.
    for user_id in ratings.users() {
        let history = match ratings.history(user_id) {
            Some(h) => h,
            None => continue,
        };
        let mean = match ratings.user_mean(user_id) {
            Some(m) => m,
            None => continue,
        };

        let window = match config.max_build_history {
            Some(cap) if history.len() > cap => &history[history.len() - cap..],
            _ => history,
        };

        let centered: Vec<(MovieId, f64)> =
            window.iter().map(|(m, r)| (*m, r - mean)).collect();

        for (movie_id, c) in &centered {
            *norms.entry(*movie_id).or_insert(0.0) += c * c;
        }

        for a in 0..centered.len() {
            let (i, ci) = centered[a];
            for b in (a + 1)..centered.len() {
                let (j, cj) = centered[b];
                if i == j {
                    continue;
                }
                let key = if i < j { (i, j) } else { (j, i) };
                *dots.entry(key).or_insert(0.0) += ci * cj;
                *commons.entry(key).or_insert(0) += 1;
            }
        }
    }

    let mut neighbors: HashMap<MovieId, Vec<SimilarNeighbor>> = HashMap::new();
    let mut surviving_pairs = 0usize;

    for ((i, j), dot) in &dots {
        let common = commons.get(&(*i, *j)).copied().unwrap_or(0);
        if common < config.min_common_raters {
            continue;
        }
        let (ni, nj) = (
            norms.get(i).copied().unwrap_or(0.0),
            norms.get(j).copied().unwrap_or(0.0),
        );
        if ni <= 0.0 || nj <= 0.0 {
            continue;
        }
        let similarity = dot / (ni.sqrt() * nj.sqrt());
        if similarity <= 0.0 {
            continue;
        }

        surviving_pairs += 1;
        neighbors.entry(*i).or_default().push(SimilarNeighbor {
            movie_id: *j,
            similarity,
            common_raters: common,
        });
        neighbors.entry(*j).or_default().push(SimilarNeighbor {
            movie_id: *i,
            similarity,
            common_raters: common,
        });
    }

    for list in neighbors.values_mut() {
        // Similarity ties break by ascending movie id to keep the index
        // deterministic regardless of map iteration order.
        list.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.movie_id.cmp(&b.movie_id))
        });
        list.truncate(config.topk_sim_per_item);
    }

    info!(
        users = ratings.user_count(),
        candidate_pairs = dots.len(),
        surviving_pairs,
        indexed_items = neighbors.len(),
        "Item similarity index built"
    );

    Ok(ItemSimilarityIndex {
        neighbors,
        built_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rating;

    fn rating(user_id: i64, movie_id: i64, value: f64) -> Rating {
        Rating {
            user_id,
            movie_id,
            rating: value,
            timestamp: 0,
        }
    }

    fn index_from(records: &[Rating], config: &EngineConfig) -> ItemSimilarityIndex {
        let ratings = RatingIndex::from_records(records).unwrap();
        build_index(&ratings, config).unwrap()
    }

    fn config(min_common_raters: u32, topk: usize) -> EngineConfig {
        EngineConfig {
            min_common_raters,
            topk_sim_per_item: topk,
            ..EngineConfig::default()
        }
    }

    /// Two users both rate items 1 and 2 above their mean and item 3 below:
    /// items 1 and 2 correlate positively, pairs with item 3 negatively.
    fn correlated_records() -> Vec<Rating> {
        vec![
            rating(1, 1, 5.0),
            rating(1, 2, 5.0),
            rating(1, 3, 1.0),
            rating(2, 1, 4.0),
            rating(2, 2, 5.0),
            rating(2, 3, 2.0),
        ]
    }

    #[test]
    fn test_empty_ratings_fail_with_not_loaded() {
        let ratings = RatingIndex::from_records(&[]).unwrap();
        let err = build_index(&ratings, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::NotLoaded));
    }

    #[test]
    fn test_cosine_matches_hand_computation() {
        let index = index_from(&correlated_records(), &config(2, 200));

        // User 1: mean 11/3, centered (+4/3, +4/3, -8/3).
        // User 2: mean 11/3, centered (+1/3, +4/3, -5/3).
        // dot(1,2) = 16/9 + 4/9 = 20/9; norm1 = 17/9; norm2 = 32/9.
        let expected = (20.0 / 9.0) / ((17.0f64 / 9.0).sqrt() * (32.0f64 / 9.0).sqrt());

        let neighbors = index.neighbors_of(1);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].movie_id, 2);
        assert!((neighbors[0].similarity - expected).abs() < 1e-12);
        assert_eq!(neighbors[0].common_raters, 2);
    }

    #[test]
    fn test_negative_correlations_are_dropped() {
        let index = index_from(&correlated_records(), &config(2, 200));

        // Item 3 anti-correlates with both others and must not appear.
        assert!(index.neighbors_of(3).is_empty());
        assert!(index.neighbors_of(1).iter().all(|n| n.movie_id != 3));
        assert!(index.neighbors_of(2).iter().all(|n| n.movie_id != 3));
    }

    #[test]
    fn test_all_similarities_positive() {
        let index = index_from(&correlated_records(), &config(1, 200));
        for item in index.items() {
            for n in index.neighbors_of(item) {
                assert!(n.similarity > 0.0);
                assert!(n.similarity <= 1.0 + 1e-12);
            }
        }
    }

    #[test]
    fn test_min_support_threshold() {
        // Items 1 and 2 co-rated by two users; items 1 and 4 by one only.
        let mut records = correlated_records();
        records.push(rating(1, 4, 5.0));

        let strict = index_from(&records, &config(2, 200));
        assert!(strict.neighbors_of(4).is_empty());
        for item in strict.items() {
            for n in strict.neighbors_of(item) {
                assert!(n.common_raters >= 2);
            }
        }

        let relaxed = index_from(&records, &config(1, 200));
        assert!(relaxed
            .neighbors_of(4)
            .iter()
            .any(|n| n.movie_id == 1 || n.movie_id == 2));
    }

    #[test]
    fn test_symmetry() {
        let index = index_from(&correlated_records(), &config(1, 200));
        for item in index.items() {
            for n in index.neighbors_of(item) {
                let back = index
                    .neighbors_of(n.movie_id)
                    .iter()
                    .find(|m| m.movie_id == item)
                    .expect("symmetric entry missing");
                assert_eq!(back.similarity, n.similarity);
                assert_eq!(back.common_raters, n.common_raters);
            }
        }
    }

    #[test]
    fn test_topk_truncation_and_descending_order() {
        // Star pattern: item 1 positively co-rated with items 2..=5.
        let mut records = Vec::new();
        for user in 1..=4 {
            let other = user + 1; // items 2..=5
            records.push(rating(user, 1, 5.0));
            records.push(rating(user, other, 4.0 + 0.2 * user as f64 % 1.0));
            records.push(rating(user, 100 + user, 1.0));
            records.push(rating(200 + user, 1, 4.5));
            records.push(rating(200 + user, other, 4.5));
            records.push(rating(200 + user, 100 + user, 1.5));
        }

        let index = index_from(&records, &config(1, 2));
        for item in index.items() {
            let list = index.neighbors_of(item);
            assert!(list.len() <= 2);
            for pair in list.windows(2) {
                assert!(pair[0].similarity >= pair[1].similarity);
            }
        }
    }

    #[test]
    fn test_no_self_pairs() {
        // Duplicate rating of the same movie by one user must not produce a
        // self-similarity entry.
        let mut records = correlated_records();
        records.push(rating(1, 1, 4.0));
        records.push(rating(2, 1, 4.0));

        let index = index_from(&records, &config(1, 200));
        for item in index.items() {
            assert!(index.neighbors_of(item).iter().all(|n| n.movie_id != item));
        }
    }

    #[test]
    fn test_build_history_cap_limits_pairs() {
        // One user rates 1, 2, 3 in order; capping at 2 keeps only the
        // (2, 3) pair from the tail of the history.
        let records = vec![
            rating(1, 1, 5.0),
            rating(1, 2, 5.0),
            rating(1, 3, 1.0),
            rating(2, 2, 5.0),
            rating(2, 3, 1.0),
            rating(2, 1, 5.0),
        ];

        let capped = EngineConfig {
            min_common_raters: 1,
            max_build_history: Some(2),
            ..EngineConfig::default()
        };
        let ratings = RatingIndex::from_records(&records).unwrap();
        let index = build_index(&ratings, &capped).unwrap();

        // User 1 tail: (2, 3); user 2 tail: (3, 1). Pair (1, 2) never
        // co-occurs inside any window.
        assert!(index.neighbors_of(1).iter().all(|n| n.movie_id != 2));
    }

    #[test]
    fn test_deterministic_across_rebuilds() {
        let records = correlated_records();
        let cfg = config(1, 200);
        let a = index_from(&records, &cfg);
        let b = index_from(&records, &cfg);
        for item in a.items() {
            assert_eq!(a.neighbors_of(item), b.neighbors_of(item));
        }
        assert_eq!(a.item_count(), b.item_count());
    }
}
