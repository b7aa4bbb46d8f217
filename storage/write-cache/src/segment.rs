//! Fixed-capacity memory regions backing the write cache.
//!
//! A segment is a zeroed heap allocation written through a raw pointer. The
//! cache hands out disjoint byte ranges with an atomic cursor, so concurrent
//! writers never touch the same bytes and no lock guards the copy itself.

use std::ptr::{self, NonNull};

pub(crate) struct Segment {
    data: NonNull<u8>,
    capacity: usize,
}

// SAFETY: writers only touch ranges reserved exclusively through the cache
// cursor, and readers only see ranges published through the index lock.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Allocate a zeroed segment of `capacity` bytes.
    pub(crate) fn new(capacity: usize) -> Self {
        let memory: Box<[u8]> = vec![0u8; capacity].into_boxed_slice();
        let raw = Box::into_raw(memory) as *mut u8;
        Self {
            // SAFETY: Box::into_raw never returns null, even for empty slices
            data: unsafe { NonNull::new_unchecked(raw) },
            capacity,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy `src` into the segment at `offset`.
    ///
    /// # Safety
    ///
    /// - `offset + src.len()` must not exceed the capacity
    /// - the range must be reserved for the caller alone, with no concurrent
    ///   reader or writer
    pub(crate) unsafe fn write(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.capacity);
        unsafe {
            let dst = self.data.as_ptr().add(offset);
            ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
        }
    }

    /// Borrow `len` bytes starting at `offset`.
    ///
    /// # Safety
    ///
    /// The range must be inside the capacity and fully written, and no writer
    /// may touch it while the returned slice is alive.
    pub(crate) unsafe fn slice(&self, offset: usize, len: usize) -> &[u8] {
        debug_assert!(offset + len <= self.capacity);
        unsafe { std::slice::from_raw_parts(self.data.as_ptr().add(offset), len) }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        let raw = ptr::slice_from_raw_parts_mut(self.data.as_ptr(), self.capacity);
        // SAFETY: `data` came from Box::into_raw of a slice of `capacity` bytes
        drop(unsafe { Box::from_raw(raw) });
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("capacity", &self.capacity)
            .finish()
    }
}
