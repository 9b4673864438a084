//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur while persisting cache files.
///
/// Reads are fail-safe and never produce these: a corrupt or stale entry
/// is a miss. Writes report failures so the driver can surface a
/// cache-write error without corrupting its in-memory state.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A serialization error occurred while encoding the info file.
    #[error("cache serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}
