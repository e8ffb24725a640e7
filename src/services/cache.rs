//! Best-effort persistence of the item similarity index.
//!
//! The cache is an opaque bincode blob keyed by file path. It carries no
//! config fingerprint: a blob built under different top-K or min-support
//! settings loads silently. Delete the file to invalidate. Cache failures
//! never surface through the recommend/explain paths.

use crate::config::EngineConfig;
use crate::error::{AppError, Result};
use crate::models::RatingIndex;
use crate::services::similarity::{build_index, ItemSimilarityIndex};
use anyhow::Context;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// How the index was obtained. A failed build propagates as `Err` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Deserialized from the cache artifact, without re-validation against
    /// the current ratings.
    Cached,
    /// Built from ratings; persisting the result was attempted best-effort.
    Rebuilt,
}

/// Load the index from `path` if a readable artifact exists there, otherwise
/// build it from ratings and try to persist the result.
///
/// Unreadable or corrupt artifacts are logged and rebuilt over; write
/// failures are logged and swallowed.
pub fn load_or_build(
    path: &Path,
    ratings: &RatingIndex,
    config: &EngineConfig,
) -> Result<(ItemSimilarityIndex, CacheOutcome)> {
    if path.exists() {
        match read_cached(path) {
            Ok(index) => {
                info!(
                    path = %path.display(),
                    indexed_items = index.item_count(),
                    "Similarity index loaded from cache"
                );
                return Ok((index, CacheOutcome::Cached));
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Similarity cache unusable, rebuilding");
            }
        }
    }

    let index = build_index(ratings, config)?;

    if let Err(err) = persist(path, &index) {
        warn!(path = %path.display(), error = %err, "Similarity cache write failed");
    }

    Ok((index, CacheOutcome::Rebuilt))
}

fn read_cached(path: &Path) -> Result<ItemSimilarityIndex> {
    let bytes = fs::read(path)
        .map_err(|e| AppError::CacheUnavailable(format!("{}: {}", path.display(), e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| AppError::CacheCorrupt(format!("{}: {}", path.display(), e)))
}

fn persist(path: &Path, index: &ItemSimilarityIndex) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating cache dir {}", parent.display()))?;
        }
    }
    let bytes = bincode::serialize(index).context("encoding similarity index")?;
    fs::write(path, bytes).with_context(|| format!("writing cache {}", path.display()))?;
    Ok(())
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

    fn sample_ratings() -> RatingIndex {
        RatingIndex::from_records(&[
            rating(1, 1, 5.0),
            rating(1, 2, 5.0),
            rating(1, 3, 1.0),
            rating(2, 1, 4.0),
            rating(2, 2, 5.0),
            rating(2, 3, 2.0),
        ])
        .unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig {
            min_common_raters: 1,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_miss_builds_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item_sims.bin");
        let ratings = sample_ratings();

        let (index, outcome) = load_or_build(&path, &ratings, &config()).unwrap();
        assert_eq!(outcome, CacheOutcome::Rebuilt);
        assert!(!index.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_hit_round_trips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item_sims.bin");
        let ratings = sample_ratings();

        let (built, _) = load_or_build(&path, &ratings, &config()).unwrap();
        let (loaded, outcome) = load_or_build(&path, &ratings, &config()).unwrap();

        assert_eq!(outcome, CacheOutcome::Cached);
        assert_eq!(loaded, built);
    }

    #[test]
    fn test_corrupt_artifact_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item_sims.bin");
        fs::write(&path, b"not a similarity index").unwrap();

        let ratings = sample_ratings();
        let (index, outcome) = load_or_build(&path, &ratings, &config()).unwrap();
        assert_eq!(outcome, CacheOutcome::Rebuilt);
        assert!(!index.is_empty());
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        // A directory at the cache path makes both read and write fail; the
        // call must still return a freshly built index.
        let dir = tempfile::tempdir().unwrap();
        let ratings = sample_ratings();

        let (index, outcome) = load_or_build(dir.path(), &ratings, &config()).unwrap();
        assert_eq!(outcome, CacheOutcome::Rebuilt);
        assert!(!index.is_empty());
    }

    #[test]
    fn test_build_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item_sims.bin");
        let empty = RatingIndex::from_records(&[]).unwrap();

        let err = load_or_build(&path, &empty, &config()).unwrap_err();
        assert!(matches!(err, AppError::NotLoaded));
    }
}
