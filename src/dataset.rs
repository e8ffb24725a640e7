//! Loaders for the processed tables.
//!
//! Expected CSV headers:
//! - ratings: `user_id,movie_id,rating,timestamp`
//! - movies: `movie_id,title,genres` (genres pipe-separated, may be empty)
//! - popular: `movie_id,rating_count,rating_avg` (pre-sorted upstream)
//!
//! Malformed files fail fast with `InvalidInput` naming the path and the
//! offending row. Raw-file ETL (MovieLens `.dat` parsing and friends) happens
//! upstream; this module only reads its output.

use crate::error::{AppError, Result};
use crate::models::{Movie, MovieId, PopularMovie, Rating};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct RatingRow {
    user_id: i64,
    movie_id: MovieId,
    rating: f64,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct MovieRow {
    movie_id: MovieId,
    title: String,
    #[serde(default)]
    genres: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PopularRow {
    movie_id: MovieId,
    rating_count: u64,
    rating_avg: f64,
}

pub fn load_ratings(path: &Path) -> Result<Vec<Rating>> {
    let mut reader = open(path, "ratings")?;
    let mut out = Vec::new();
    for (row, record) in reader.deserialize::<RatingRow>().enumerate() {
        let r = record.map_err(|e| row_error(path, "ratings", row, e))?;
        out.push(Rating {
            user_id: r.user_id,
            movie_id: r.movie_id,
            rating: r.rating,
            timestamp: r.timestamp,
        });
    }
    info!(path = %path.display(), rows = out.len(), "Ratings table loaded");
    Ok(out)
}

pub fn load_movies(path: &Path) -> Result<Vec<Movie>> {
    let mut reader = open(path, "movies")?;
    let mut out = Vec::new();
    for (row, record) in reader.deserialize::<MovieRow>().enumerate() {
        let m = record.map_err(|e| row_error(path, "movies", row, e))?;
        out.push(Movie {
            movie_id: m.movie_id,
            title: m.title,
            genres: parse_genres(m.genres.as_deref().unwrap_or("")),
        });
    }
    info!(path = %path.display(), rows = out.len(), "Movies table loaded");
    Ok(out)
}

pub fn load_popular(path: &Path) -> Result<Vec<PopularMovie>> {
    let mut reader = open(path, "popular movies")?;
    let mut out = Vec::new();
    for (row, record) in reader.deserialize::<PopularRow>().enumerate() {
        let p = record.map_err(|e| row_error(path, "popular movies", row, e))?;
        out.push(PopularMovie {
            movie_id: p.movie_id,
            rating_count: p.rating_count,
            rating_avg: p.rating_avg,
        });
    }
    info!(path = %path.display(), rows = out.len(), "Popularity table loaded");
    Ok(out)
}

/// Split a pipe-separated genre cell into a lowercased ordered set.
/// `(no genres listed)` and empty segments are dropped.
pub fn parse_genres(raw: &str) -> BTreeSet<String> {
    raw.split('|')
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty() && g != "(no genres listed)")
        .collect()
}

fn open(path: &Path, table: &str) -> Result<csv::Reader<std::fs::File>> {
    csv::Reader::from_path(path).map_err(|e| {
        AppError::InvalidInput(format!(
            "failed to read {} CSV at '{}': {}",
            table,
            path.display(),
            e
        ))
    })
}

fn row_error(path: &Path, table: &str, row: usize, err: csv::Error) -> AppError {
    AppError::InvalidInput(format!(
        "malformed {} record at '{}' row {}: {}",
        table,
        path.display(),
        row + 1,
        err
    ))
}
