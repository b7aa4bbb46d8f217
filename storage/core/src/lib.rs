//! storage-core: shared building blocks for the bookie write path.
//!
//! The buffered channel and the write cache are independent of each other but
//! agree on a few capabilities, collected here:
//!
//! - **Allocation**: [`BufferAllocator`] hands out byte buffers on demand
//! - **Payloads**: [`ByteSource`] is the opaque, copy-in view of a caller's bytes
//! - **Errors**: [`BufferError`] for allocation and source failures
//! - **Sync**: atomics that switch to `loom` under the `loom` feature

#![warn(missing_docs)]
#![warn(clippy::all)]

mod allocator;
mod error;
mod source;

pub mod sync;

pub use allocator::{BufferAllocator, HeapAllocator};
pub use error::{BufferError, BufferResult};
pub use source::ByteSource;
