//! Error types for buffered channel operations.

use std::io;
use storage_core::BufferError;

/// Errors that can occur while writing to or reading from a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The backing file failed. The native error is passed through unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A buffer could not be allocated or a source could not be read.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The channel has been closed.
    #[error("channel is closed")]
    Closed,

    /// The destination cannot hold the requested number of bytes.
    #[error("destination holds {available} bytes but {needed} were requested")]
    DestinationTooSmall {
        /// Bytes requested.
        needed: usize,
        /// Bytes the destination can hold.
        available: usize,
    },

    /// The requested range is not inside the written region.
    #[error("read of {length} bytes at {pos} is outside [0, {position})")]
    OutOfBounds {
        /// Requested start offset.
        pos: u64,
        /// Requested length.
        length: usize,
        /// Logical position of the channel.
        position: u64,
    },

    /// The backing file returned fewer bytes than it should hold.
    #[error("short read from backing file at {pos}")]
    ShortRead {
        /// Offset at which the file ran dry.
        pos: u64,
    },
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
