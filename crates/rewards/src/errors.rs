use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewardError {
    // Configuration errors
    #[error("Outcome table must contain at least one segment")]
    EmptyOutcomeTable,
    #[error("Segment {index} is outside the outcome table ({len} segments)")]
    SegmentOutOfRange { index: usize, len: usize },
    #[error("Invalid rate limit config: limit={limit}, window_ms={window_ms} (both must be positive)")]
    InvalidRateLimitConfig { limit: i64, window_ms: i64 },

    // Persistence errors
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Store file {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Store lock poisoned")]
    Poisoned,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
