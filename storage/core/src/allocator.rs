//! Byte-buffer allocation capability.
//!
//! Components never allocate their working buffers up front. They ask a
//! [`BufferAllocator`] the first time a buffer is needed, so an allocator that
//! cannot produce buffers only surfaces on the call that needed one.

use crate::error::BufferResult;
use bytes::BytesMut;

/// Produces independently addressable byte buffers.
pub trait BufferAllocator: Send + Sync {
    /// Allocate an empty buffer able to hold at least `capacity` bytes
    /// without reallocating.
    fn buffer(&self, capacity: usize) -> BufferResult<BytesMut>;
}

/// Allocates plain heap buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    #[inline]
    fn buffer(&self, capacity: usize) -> BufferResult<BytesMut> {
        Ok(BytesMut::with_capacity(capacity))
    }
}

impl<A: BufferAllocator + ?Sized> BufferAllocator for &A {
    #[inline]
    fn buffer(&self, capacity: usize) -> BufferResult<BytesMut> {
        (**self).buffer(capacity)
    }
}

impl<A: BufferAllocator + ?Sized> BufferAllocator for std::sync::Arc<A> {
    #[inline]
    fn buffer(&self, capacity: usize) -> BufferResult<BytesMut> {
        (**self).buffer(capacity)
    }
}

impl<A: BufferAllocator + ?Sized> BufferAllocator for Box<A> {
    #[inline]
    fn buffer(&self, capacity: usize) -> BufferResult<BytesMut> {
        (**self).buffer(capacity)
    }
}

/// Plain functions act as allocators.
impl BufferAllocator for fn(usize) -> BufferResult<BytesMut> {
    fn buffer(&self, capacity: usize) -> BufferResult<BytesMut> {
        self(capacity)
    }
}
