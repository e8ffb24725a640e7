//! Explanation generator: pure mapping from a recommendation context to a
//! structured, human-readable reason. No I/O, no engine state.

use crate::models::{Explanation, Factor, MovieCatalog, MovieId, PrimaryReason, UserId};
use serde_json::json;

const FALLBACK_REC_TITLE: &str = "this movie";
const FALLBACK_SEED_TITLE: &str = "a movie you liked";

/// How many overlapping genres an explanation cites at most.
const MAX_CITED_GENRES: usize = 3;

/// Context for one explanation. Borrowed: the generator never clones the
/// catalog.
#[derive(Debug, Clone)]
pub struct ReasonInput<'a> {
    pub rec_movie_id: MovieId,
    pub seed_movie_id: Option<MovieId>,
    pub catalog: &'a MovieCatalog,
    pub use_social: bool,
    pub friend_ids: Option<&'a [UserId]>,
}

/// Generate the reason for recommending `rec_movie_id`.
///
/// Priority order, first match wins:
/// 1. social signal requested (confidence 0.70)
/// 2. seed with genre overlap (0.78)
/// 3. seed without overlap (0.75)
/// 4. no seed: popular (0.60)
pub fn generate_reason(input: &ReasonInput) -> Explanation {
    let rec_title = input
        .catalog
        .title(input.rec_movie_id)
        .unwrap_or(FALLBACK_REC_TITLE);
    let seed_title = input
        .seed_movie_id
        .map(|id| input.catalog.title(id).unwrap_or(FALLBACK_SEED_TITLE));

    // Case-insensitive intersection; genres are stored lowercased and the
    // ordered sets keep the overlap in ascending alphabetical order.
    let overlap: Vec<&str> = match (
        input.catalog.genres(input.rec_movie_id),
        input.seed_movie_id.and_then(|id| input.catalog.genres(id)),
    ) {
        (Some(rec_genres), Some(seed_genres)) => rec_genres
            .intersection(seed_genres)
            .map(|g| g.as_str())
            .take(MAX_CITED_GENRES)
            .collect(),
        _ => Vec::new(),
    };

    if input.use_social {
        return Explanation {
            primary_reason: PrimaryReason::Social,
            confidence: 0.70,
            text: "Popular with people you follow, and similar to your taste.".to_string(),
            factors: vec![
                Factor {
                    kind: PrimaryReason::Social,
                    weight: 0.6,
                    payload: json!({ "friend_ids": input.friend_ids.unwrap_or(&[]) }),
                },
                Factor {
                    kind: PrimaryReason::GenreOverlap,
                    weight: 0.4,
                    payload: json!({ "overlap": overlap }),
                },
            ],
        };
    }

    if let Some(seed_movie_id) = input.seed_movie_id {
        let seed_title = seed_title.unwrap_or(FALLBACK_SEED_TITLE);

        if !overlap.is_empty() {
            return Explanation {
                primary_reason: PrimaryReason::GenreOverlap,
                confidence: 0.78,
                text: format!(
                    "Because you liked {} and it shares genres: {}.",
                    seed_title,
                    overlap.join(", ")
                ),
                factors: vec![
                    Factor {
                        kind: PrimaryReason::BecauseYouRated,
                        weight: 0.6,
                        payload: json!({ "seed_movie_id": seed_movie_id }),
                    },
                    Factor {
                        kind: PrimaryReason::GenreOverlap,
                        weight: 0.4,
                        payload: json!({ "overlap": overlap }),
                    },
                ],
            };
        }

        return Explanation {
            primary_reason: PrimaryReason::BecauseYouRated,
            confidence: 0.75,
            text: format!(
                "Because you liked {}, which is similar to {}.",
                seed_title, rec_title
            ),
            factors: vec![Factor {
                kind: PrimaryReason::BecauseYouRated,
                weight: 1.0,
                payload: json!({ "seed_movie_id": seed_movie_id }),
            }],
        };
    }

    Explanation {
        primary_reason: PrimaryReason::Popular,
        confidence: 0.60,
        text: format!("Recommended because {} is popular among users.", rec_title),
        factors: vec![Factor {
            kind: PrimaryReason::Popular,
            weight: 1.0,
            payload: json!({}),
        }],
    }
}

/// Generic reason attached to popularity-fallback pages, where no specific
/// movie context is available.
pub fn popular_fallback_reason() -> Explanation {
    Explanation {
        primary_reason: PrimaryReason::Popular,
        confidence: 0.60,
        text: "Recommended because it's popular among users.".to_string(),
        factors: vec![Factor {
            kind: PrimaryReason::Popular,
            weight: 1.0,
            payload: json!({}),
        }],
    }
}

/// Score surfaced by the `explain` entry point.
pub fn ai_score(confidence: f64) -> u32 {
    (confidence * 100.0).round() as u32
}
