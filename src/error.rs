use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Ratings or the similarity index are not available yet. Fatal to the
    /// call; the caller decides whether to fit and retry.
    #[error("Model not ready: load ratings and call fit() before serving")]
    NotLoaded,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cache artifact could not be read. Recoverable: triggers a rebuild.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Cache artifact exists but could not be decoded. Recoverable: triggers
    /// a rebuild.
    #[error("Cache corrupt: {0}")]
    CacheCorrupt(String),
}
