//! Error types for write cache operations.

use storage_core::BufferError;

/// Errors that can occur while building or filling a write cache.
///
/// A full cache is not an error: [`put`](crate::WriteCache::put) reports it
/// by returning `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteCacheError {
    /// Construction parameters are invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The entry's bytes could not be read.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Result type for write cache operations.
pub type WriteCacheResult<T> = Result<T, WriteCacheError>;
