//! Popularity fallback: a precomputed global ranking used whenever
//! personalized scoring is unavailable or yields no candidates.

use crate::models::{MovieId, PopularMovie, RankedItem, Rating};
use crate::services::explain::popular_fallback_reason;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Score attached to every popularity-fallback item. Flat: the table carries
/// order, not strength.
const FALLBACK_SCORE: f64 = 0.5;

/// Global popularity ranking, sorted by rating count then average rating,
/// both descending. Loaded once and treated as immutable.
#[derive(Debug, Clone, Default)]
pub struct PopularityTable {
    entries: Vec<PopularMovie>,
}

impl PopularityTable {
    /// Wrap a precomputed, pre-sorted table.
    pub fn new(entries: Vec<PopularMovie>) -> Self {
        Self { entries }
    }

    /// Derive the table from rating records when no precomputed artifact is
    /// available (count desc, then average desc; ids break exact ties).
    pub fn from_ratings(records: &[Rating]) -> Self {
        let mut counts: HashMap<MovieId, (u64, f64)> = HashMap::new();
        for r in records {
            let entry = counts.entry(r.movie_id).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += r.rating;
        }

        let mut entries: Vec<PopularMovie> = counts
            .into_iter()
            .map(|(movie_id, (count, sum))| PopularMovie {
                movie_id,
                rating_count: count,
                rating_avg: sum / count as f64,
            })
            .collect();

        entries.sort_by(|a, b| {
            b.rating_count
                .cmp(&a.rating_count)
                .then_with(|| {
                    b.rating_avg
                        .partial_cmp(&a.rating_avg)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.movie_id.cmp(&b.movie_id))
        });

        Self { entries }
    }

    /// Slice `[offset, offset + limit)` of the table after removing excluded
    /// items, with flat scores and generic popular explanations.
    pub fn window(
        &self,
        limit: usize,
        offset: usize,
        exclude: &HashSet<MovieId>,
    ) -> Vec<RankedItem> {
        self.entries
            .iter()
            .filter(|e| !exclude.contains(&e.movie_id))
            .skip(offset)
            .take(limit)
            .enumerate()
            .map(|(idx, e)| RankedItem {
                movie_id: e.movie_id,
                score: FALLBACK_SCORE,
                rank: offset + idx + 1,
                explanation: popular_fallback_reason(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PopularMovie] {
        &self.entries
    }
}
