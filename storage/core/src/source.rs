//! Opaque payload view used by writers.

use crate::error::BufferResult;
use bytes::{Bytes, BytesMut};

/// A caller-owned buffer whose readable bytes can be copied out.
///
/// Ownership is never transferred: consumers borrow the contiguous view,
/// copy what they need, and leave the source untouched. Obtaining the view
/// may fail (for example a source whose reader index is corrupt), and
/// consumers must check that before mutating any of their own state.
pub trait ByteSource {
    /// Number of readable bytes.
    fn readable_bytes(&self) -> usize;

    /// Contiguous view of exactly `readable_bytes()` bytes.
    fn as_bytes(&self) -> BufferResult<&[u8]>;
}

impl ByteSource for [u8] {
    #[inline]
    fn readable_bytes(&self) -> usize {
        self.len()
    }

    #[inline]
    fn as_bytes(&self) -> BufferResult<&[u8]> {
        Ok(self)
    }
}

impl<const N: usize> ByteSource for [u8; N] {
    #[inline]
    fn readable_bytes(&self) -> usize {
        N
    }

    #[inline]
    fn as_bytes(&self) -> BufferResult<&[u8]> {
        Ok(self)
    }
}

impl ByteSource for str {
    #[inline]
    fn readable_bytes(&self) -> usize {
        self.len()
    }

    #[inline]
    fn as_bytes(&self) -> BufferResult<&[u8]> {
        Ok(str::as_bytes(self))
    }
}

impl ByteSource for Vec<u8> {
    #[inline]
    fn readable_bytes(&self) -> usize {
        self.len()
    }

    #[inline]
    fn as_bytes(&self) -> BufferResult<&[u8]> {
        Ok(self.as_slice())
    }
}

impl ByteSource for Bytes {
    #[inline]
    fn readable_bytes(&self) -> usize {
        self.len()
    }

    #[inline]
    fn as_bytes(&self) -> BufferResult<&[u8]> {
        Ok(self.as_ref())
    }
}

impl ByteSource for BytesMut {
    #[inline]
    fn readable_bytes(&self) -> usize {
        self.len()
    }

    #[inline]
    fn as_bytes(&self) -> BufferResult<&[u8]> {
        Ok(self.as_ref())
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &T {
    #[inline]
    fn readable_bytes(&self) -> usize {
        (**self).readable_bytes()
    }

    #[inline]
    fn as_bytes(&self) -> BufferResult<&[u8]> {
        (**self).as_bytes()
    }
}
