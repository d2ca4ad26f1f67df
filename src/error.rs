//! Error types for tilestream_core.

use thiserror::Error;

/// Error types for cache and loader operations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to load value: {0}")]
    LoadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
