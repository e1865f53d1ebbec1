//! Unified error types for docstack-core.
//!
//! All variants describe persistent-tier failures; the memory tier and key
//! derivation cannot fail. The cache facade catches these at the failing
//! operation and degrades to a miss or a no-op, so collaborators never see
//! them directly.

use tokio_rusqlite::rusqlite;

/// Unified error types for the cache core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORAGE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A persisted row could not be decoded back into a cache entry.
    #[error("STORAGE_ERROR: malformed record for key {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    /// Cache directory could not be created.
    #[error("STORAGE_ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
