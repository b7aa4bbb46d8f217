//! Lock-free allocation cursor shared by all writers.

use storage_core::sync::{AtomicU64, Ordering, spin_loop};

/// Monotonic byte cursor over the concatenated segments.
///
/// Offsets are global: the segment index is `offset >> offset_bits` and the
/// position inside it is `offset & (segment_size - 1)`. A reservation never
/// straddles a segment boundary; a range that would is moved to the start of
/// the next segment and the tail of the current one is left unused.
#[derive(Debug)]
pub(crate) struct Cursor {
    offset: AtomicU64,
    limit: u64,
    segment_size: u64,
    offset_bits: u32,
}

impl Cursor {
    pub(crate) fn new(limit: u64, segment_size: u64) -> Self {
        debug_assert!(segment_size.is_power_of_two());
        Self {
            offset: AtomicU64::new(0),
            limit,
            segment_size,
            offset_bits: segment_size.trailing_zeros(),
        }
    }

    #[inline]
    pub(crate) fn load(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Reserve `size` contiguous bytes inside one segment.
    ///
    /// Returns the global start offset, or `None` when the range would pass
    /// the limit or cannot fit in a single segment. A failed reservation
    /// leaves the cursor where it was.
    pub(crate) fn reserve(&self, size: u64) -> Option<u64> {
        if size > self.segment_size {
            return None;
        }

        loop {
            let current = self.offset.load(Ordering::Acquire);
            let start = self.placement(current, size)?;
            let end = start.checked_add(size)?;
            if end > self.limit {
                return None;
            }

            match self
                .offset
                .compare_exchange(current, end, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(start),
                Err(_) => spin_loop(),
            }
        }
    }

    /// Whether a reservation of `size` bytes would succeed right now.
    pub(crate) fn fits(&self, size: u64) -> bool {
        size <= self.segment_size
            && self
                .placement(self.load(), size)
                .and_then(|start| start.checked_add(size))
                .is_some_and(|end| end <= self.limit)
    }

    /// Rewind to zero. Callers must have exclusive access to the cache.
    pub(crate) fn reset(&self) {
        self.offset.store(0, Ordering::Release);
    }

    /// Where a reservation of `size` bytes would start if the cursor is at
    /// `current`.
    #[inline]
    fn placement(&self, current: u64, size: u64) -> Option<u64> {
        let mask = self.segment_size - 1;
        if (current & mask) + size <= self.segment_size {
            Some(current)
        } else {
            ((current >> self.offset_bits) + 1).checked_mul(self.segment_size)
        }
    }
}
