//! Offline evaluation of the recommender: temporal train/test split plus
//! rating-error (RMSE/MAE) and ranking (recall@k, NDCG@k, MAP@k) metrics.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{MovieId, Rating, RecommendRequest, UserId};
use crate::services::engine::RecommendationEngine;
use crate::services::popularity::PopularityTable;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Users with fewer ratings than this keep their whole history in train.
const MIN_SPLITTABLE_HISTORY: usize = 5;

#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Fraction of each user's most recent interactions held out as test.
    pub test_ratio: f64,
    /// Page size for ranking metrics.
    pub k: usize,
    /// Minimum held-out items for a user to count toward the metrics.
    pub min_user_test_items: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            k: 10,
            min_user_test_items: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub rmse: f64,
    pub mae: f64,
    pub recall_at_k: f64,
    pub ndcg_at_k: f64,
    pub map_at_k: f64,
    pub users_evaluated: usize,
}

/// Split per user by timestamp: the last `test_ratio` share of each user's
/// interactions becomes test data.
pub fn temporal_split(ratings: &[Rating], test_ratio: f64) -> (Vec<Rating>, Vec<Rating>) {
    let mut sorted: Vec<Rating> = ratings.to_vec();
    sorted.sort_by(|a, b| {
        a.user_id
            .cmp(&b.user_id)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    let mut train = Vec::with_capacity(sorted.len());
    let mut test = Vec::new();

    let mut start = 0;
    while start < sorted.len() {
        let user_id = sorted[start].user_id;
        let mut end = start;
        while end < sorted.len() && sorted[end].user_id == user_id {
            end += 1;
        }
        let group = &sorted[start..end];
        if group.len() < MIN_SPLITTABLE_HISTORY {
            train.extend_from_slice(group);
        } else {
            let cut = (group.len() as f64 * (1.0 - test_ratio)).floor() as usize;
            train.extend_from_slice(&group[..cut]);
            test.extend_from_slice(&group[cut..]);
        }
        start = end;
    }

    (train, test)
}

pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    (sum / y_true.len() as f64).sqrt()
}

pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
    sum / y_true.len() as f64
}

pub fn recall_at_k(recommended: &[MovieId], relevant: &HashSet<MovieId>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let hits = recommended
        .iter()
        .take(k)
        .filter(|m| relevant.contains(m))
        .count();
    hits as f64 / relevant.len() as f64
}

pub fn dcg_at_k(recommended: &[MovieId], relevant: &HashSet<MovieId>, k: usize) -> f64 {
    recommended
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, m)| relevant.contains(m))
        .map(|(idx, _)| 1.0 / ((idx + 2) as f64).log2())
        .sum()
}

pub fn ndcg_at_k(recommended: &[MovieId], relevant: &HashSet<MovieId>, k: usize) -> f64 {
    let ideal_hits = relevant.len().min(k);
    if ideal_hits == 0 {
        return 0.0;
    }
    let ideal: f64 = (1..=ideal_hits).map(|i| 1.0 / ((i + 1) as f64).log2()).sum();
    dcg_at_k(recommended, relevant, k) / ideal
}

pub fn map_at_k(recommended: &[MovieId], relevant: &HashSet<MovieId>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let mut hits = 0usize;
    let mut precision_sum = 0.0;
    for (idx, movie_id) in recommended.iter().take(k).enumerate() {
        if relevant.contains(movie_id) {
            hits += 1;
            precision_sum += hits as f64 / (idx + 1) as f64;
        }
    }
    precision_sum / relevant.len().min(k) as f64
}

/// Train on the temporal train split (popularity derived from train, no
/// catalog needed) and score the held-out interactions.
pub fn run_offline_eval(
    config: &EvalConfig,
    engine_config: &EngineConfig,
    ratings: &[Rating],
) -> Result<EvalReport> {
    let (train, test) = temporal_split(ratings, config.test_ratio);

    let popular = PopularityTable::from_ratings(&train);
    let engine = RecommendationEngine::from_tables(
        engine_config.clone(),
        &train,
        &[],
        popular.entries().to_vec(),
    )?;
    engine.fit()?;

    let mut test_by_user: HashMap<UserId, Vec<&Rating>> = HashMap::new();
    for r in &test {
        test_by_user.entry(r.user_id).or_default().push(r);
    }
    let mut user_ids: Vec<UserId> = test_by_user.keys().copied().collect();
    user_ids.sort_unstable();

    let mut y_true = Vec::new();
    let mut y_pred = Vec::new();
    let mut recalls = Vec::new();
    let mut ndcgs = Vec::new();
    let mut maps = Vec::new();

    for user_id in user_ids {
        let held_out = &test_by_user[&user_id];
        let relevant: HashSet<MovieId> = held_out.iter().map(|r| r.movie_id).collect();
        if relevant.len() < config.min_user_test_items {
            continue;
        }

        let items = engine.recommend(&RecommendRequest {
            user_id,
            limit: config.k,
            ..RecommendRequest::default()
        })?;
        let recommended: Vec<MovieId> = items.iter().map(|i| i.movie_id).collect();

        recalls.push(recall_at_k(&recommended, &relevant, config.k));
        ndcgs.push(ndcg_at_k(&recommended, &relevant, config.k));
        maps.push(map_at_k(&recommended, &relevant, config.k));

        // Rating proxy: map the page-relative score [0,1] back onto the
        // rating scale; unscored held-out items sit at the midpoint.
        let scores: HashMap<MovieId, f64> =
            items.iter().map(|i| (i.movie_id, i.score)).collect();
        for r in held_out {
            let unit = scores.get(&r.movie_id).copied().unwrap_or(0.5);
            y_true.push(r.rating);
            y_pred.push(0.5 + 4.5 * unit);
        }
    }

    let report = EvalReport {
        rmse: rmse(&y_true, &y_pred),
        mae: mae(&y_true, &y_pred),
        recall_at_k: mean(&recalls),
        ndcg_at_k: mean(&ndcgs),
        map_at_k: mean(&maps),
        users_evaluated: recalls.len(),
    };
    info!(
        users_evaluated = report.users_evaluated,
        recall_at_k = report.recall_at_k,
        ndcg_at_k = report.ndcg_at_k,
        "Offline evaluation complete"
    );
    Ok(report)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(user_id: i64, movie_id: i64, value: f64, timestamp: i64) -> Rating {
        Rating {
            user_id,
            movie_id,
            rating: value,
            timestamp,
        }
    }

    #[test]
    fn test_temporal_split_holds_out_latest() {
        let mut ratings = Vec::new();
        for t in 0..10 {
            ratings.push(rating(1, t, 4.0, t));
        }
        // Short-history user stays wholly in train.
        ratings.push(rating(2, 1, 3.0, 0));
        ratings.push(rating(2, 2, 3.0, 1));

        let (train, test) = temporal_split(&ratings, 0.2);

        let test_users: HashSet<i64> = test.iter().map(|r| r.user_id).collect();
        assert_eq!(test_users, [1].into_iter().collect());
        assert_eq!(test.len(), 2);
        // The held-out rows are the user's latest.
        assert!(test.iter().all(|r| r.timestamp >= 8));
        assert_eq!(train.len(), 10);
    }

    #[test]
    fn test_rmse_mae() {
        let y_true = [4.0, 3.0];
        let y_pred = [3.0, 3.0];
        assert!((rmse(&y_true, &y_pred) - (0.5f64).sqrt()).abs() < 1e-12);
        assert!((mae(&y_true, &y_pred) - 0.5).abs() < 1e-12);
        assert!(rmse(&[], &[]).is_nan());
        assert!(mae(&[], &[]).is_nan());
    }

    #[test]
    fn test_recall_at_k() {
        let relevant: HashSet<i64> = [1, 2, 3, 4].into_iter().collect();
        assert!((recall_at_k(&[1, 9, 2], &relevant, 3) - 0.5).abs() < 1e-12);
        assert_eq!(recall_at_k(&[1, 2], &HashSet::new(), 2), 0.0);
        // Only the first k recommendations count.
        assert!((recall_at_k(&[9, 8, 1], &relevant, 2) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_ndcg_perfect_ranking_is_one() {
        let relevant: HashSet<i64> = [1, 2].into_iter().collect();
        assert!((ndcg_at_k(&[1, 2, 9], &relevant, 3) - 1.0).abs() < 1e-12);
        assert_eq!(ndcg_at_k(&[1], &HashSet::new(), 3), 0.0);
        let partial = ndcg_at_k(&[9, 1, 2], &relevant, 3);
        assert!(partial > 0.0 && partial < 1.0);
    }

    #[test]
    fn test_map_at_k() {
        let relevant: HashSet<i64> = [1, 2].into_iter().collect();
        // Hits at positions 1 and 3: (1/1 + 2/3) / 2.
        let expected = (1.0 + 2.0 / 3.0) / 2.0;
        assert!((map_at_k(&[1, 9, 2], &relevant, 3) - expected).abs() < 1e-12);
        assert_eq!(map_at_k(&[9, 8], &relevant, 2), 0.0);
    }

    #[test]
    fn test_run_offline_eval_smoke() {
        // Three users with aligned tastes over six movies, enough history to
        // survive the split and the min-history policy.
        let mut ratings = Vec::new();
        for user in 1..=3i64 {
            for (idx, movie) in [1i64, 2, 3, 4, 5, 6].iter().enumerate() {
                let value = if *movie <= 4 { 4.5 } else { 1.5 };
                ratings.push(rating(user, *movie, value, idx as i64));
            }
        }

        let engine_config = EngineConfig {
            min_user_history: 2,
            min_common_raters: 2,
            ..EngineConfig::default()
        };
        let report =
            run_offline_eval(&EvalConfig::default(), &engine_config, &ratings).unwrap();

        assert_eq!(report.users_evaluated, 3);
        assert!((0.0..=1.0).contains(&report.recall_at_k));
        assert!((0.0..=1.0).contains(&report.ndcg_at_k));
        assert!((0.0..=1.0).contains(&report.map_at_k));
        assert!(report.rmse.is_finite());
        assert!(report.mae.is_finite());
    }
}
