//! Error types shared by buffer consumers.

/// Errors raised while obtaining or filling byte buffers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The allocator could not produce a buffer of the requested capacity.
    #[error("allocator failed to provide a buffer of {capacity} bytes")]
    Allocation {
        /// Requested capacity in bytes.
        capacity: usize,
    },

    /// The source buffer could not expose its readable bytes.
    #[error("source buffer corrupted: {0}")]
    Corrupted(String),
}

/// Result type for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;
