//! The driver's error taxonomy and sticky error codes.

use kiln_backend::BackendError;
use kiln_cache::CacheError;

/// Small integer error codes exposed through the sticky error accessor.
///
/// Recoverable conditions (cache miss, lookup-not-found) are signaled via
/// return values and never appear here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// No error recorded.
    NoError = 0,
    /// A source slot outside {0, 1} was addressed.
    InvalidSlot = 1,
    /// Process-wide backend initialization failed.
    BackendInit = 2,
    /// The backend failed to produce an artifact.
    Compile = 3,
    /// The backend's linking stage failed.
    Link = 4,
    /// Reserved: cache files present but structurally invalid. Never
    /// raised in practice because cache reads are fail-safe misses.
    CacheRead = 5,
    /// Cache persistence failed.
    CacheWrite = 6,
}

impl ErrorCode {
    /// The raw integer value of this code.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Failures returned by the driver's public operations.
///
/// Every variant maps onto an [`ErrorCode`]; the driver records that code
/// in its sticky first-error slot as the error is returned.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A source slot outside {0, 1} was addressed.
    #[error("invalid source slot {slot} (valid slots are 0 and 1)")]
    InvalidSlot {
        /// The offending slot index.
        slot: usize,
    },

    /// Process-wide backend initialization failed.
    #[error("backend initialization failed: {reason}")]
    BackendInit {
        /// Description of the initialization failure.
        reason: String,
    },

    /// The backend failed to produce an artifact.
    #[error("compile failed: {diagnostic}")]
    Compile {
        /// The backend's diagnostic text.
        diagnostic: String,
    },

    /// The backend's linking stage failed, typically unresolved symbols.
    #[error("link failed: {diagnostic}")]
    Link {
        /// The backend's diagnostic text.
        diagnostic: String,
    },

    /// Cache persistence failed; in-memory state is unchanged.
    #[error("cache write failed: {source}")]
    CacheWrite {
        /// The underlying cache error.
        #[source]
        source: CacheError,
    },
}

impl DriverError {
    /// The sticky error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            DriverError::InvalidSlot { .. } => ErrorCode::InvalidSlot,
            DriverError::BackendInit { .. } => ErrorCode::BackendInit,
            DriverError::Compile { .. } => ErrorCode::Compile,
            DriverError::Link { .. } => ErrorCode::Link,
            DriverError::CacheWrite { .. } => ErrorCode::CacheWrite,
        }
    }
}

impl From<BackendError> for DriverError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Init { reason } => DriverError::BackendInit { reason },
            BackendError::Compile { diagnostic } => DriverError::Compile { diagnostic },
            BackendError::Link { diagnostic } => DriverError::Link { diagnostic },
            BackendError::Io { path, source } => DriverError::Compile {
                diagnostic: format!("source I/O error at {}: {source}", path.display()),
            },
        }
    }
}

impl From<CacheError> for DriverError {
    fn from(source: CacheError) -> Self {
        DriverError::CacheWrite { source }
    }
}
