//! Error types for the chunk store.

use std::path::PathBuf;

use stream_core::TilingError;

/// Chunk store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The configured byte quota (or the medium itself) is full.
    #[error("storage quota exceeded (limit: {limit} bytes)")]
    QuotaExceeded {
        /// The storage limit in bytes, or 0 when the medium reported full.
        limit: u64,
    },

    /// Staged chunks do not tile the declared file.
    #[error("integrity error for {key}: {source}")]
    Integrity {
        /// File key being reassembled.
        key: String,
        /// First defect found.
        #[source]
        source: TilingError,
    },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

impl StoreError {
    /// Whether this error means the store is out of space.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Whether this error means the staged data is inconsistent.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
