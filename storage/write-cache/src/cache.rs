//! The segmented write cache.

use crate::cursor::Cursor;
use crate::error::{WriteCacheError, WriteCacheResult};
use crate::segment::Segment;
use ahash::AHashMap;
use bytes::Bytes;
use parking_lot::RwLock;
use storage_core::ByteSource;
use storage_core::sync::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Round `value` up to the next multiple of 64.
#[inline]
pub fn align64(value: u64) -> u64 {
    value.next_multiple_of(64)
}

/// Where an entry lives: its global cache offset and payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Location {
    offset: u64,
    len: usize,
}

#[derive(Debug, Default)]
struct Index {
    entries: AHashMap<(i64, i64), Location>,
    /// Most recently inserted entry per ledger.
    last_entry: AHashMap<i64, Location>,
}

/// Append-only cache of ledger entries awaiting a flush.
///
/// Entries are copied into fixed-capacity segments at 64-byte aligned
/// offsets handed out by a lock-free cursor. Lookups go through an index
/// keyed by `(ledger_id, entry_id)` plus a per-ledger "last inserted" index.
///
/// ```text
///  cache offset:  0          S          2S               max
///                 +----------+----------+--------+
///  segments:      |    0     |    1     |  last  |  (last = max % S)
///                 +----------+----------+--------+
///                 [e0][e1][ ]  [e2]...     ^ cursor
/// ```
///
/// `put` may be called from any number of threads through `&self`. Space is
/// never reused until [`clear`](Self::clear).
#[derive(Debug)]
pub struct WriteCache {
    segments: Box<[Segment]>,
    cursor: Cursor,
    index: RwLock<Index>,

    size: AtomicU64,
    count: AtomicU64,

    max_cache_size: u64,
    max_segment_size: u64,
    segment_offset_bits: u32,
    segment_offset_mask: u64,
}

impl WriteCache {
    /// Create a cache holding up to `max_cache_size` bytes in segments of
    /// `max_segment_size` bytes.
    ///
    /// The segment size must be a positive power of two. It may exceed the
    /// cache size, in which case a single segment capped at the cache size is
    /// used. All segment memory is allocated up front.
    pub fn new(max_cache_size: u64, max_segment_size: u64) -> WriteCacheResult<Self> {
        if !max_segment_size.is_power_of_two() {
            return Err(WriteCacheError::InvalidArgument(format!(
                "max segment size {max_segment_size} is not a positive power of two"
            )));
        }
        let segment_bytes = usize::try_from(max_segment_size).map_err(|_| {
            WriteCacheError::InvalidArgument(format!(
                "max segment size {max_segment_size} is not addressable"
            ))
        })?;

        let full_segments = max_cache_size / max_segment_size;
        let tail = (max_cache_size % max_segment_size) as usize;
        let segments: Box<[Segment]> = (0..full_segments)
            .map(|_| Segment::new(segment_bytes))
            .chain(std::iter::once(Segment::new(tail)))
            .collect();

        debug!(
            max_cache_size,
            max_segment_size,
            segments = segments.len(),
            "allocated write cache"
        );

        Ok(Self {
            segments,
            cursor: Cursor::new(max_cache_size, max_segment_size),
            index: RwLock::new(Index::default()),
            size: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max_cache_size,
            max_segment_size,
            segment_offset_bits: max_segment_size.trailing_zeros(),
            segment_offset_mask: max_segment_size - 1,
        })
    }

    /// Store a copy of `entry` under `(ledger_id, entry_id)`.
    ///
    /// Returns `Ok(false)` without changing anything when the cache has no
    /// room for the 64-byte aligned entry, or the entry is larger than a
    /// segment. Room is checked before the entry's bytes are touched, so a
    /// source whose view fails only errors when it would otherwise fit.
    /// Storing a key again replaces the earlier entry in lookups.
    pub fn put<S>(&self, ledger_id: i64, entry_id: i64, entry: &S) -> WriteCacheResult<bool>
    where
        S: ByteSource + ?Sized,
    {
        if !self.cursor.fits(align64(entry.readable_bytes() as u64)) {
            debug!(
                ledger_id,
                entry_id,
                len = entry.readable_bytes(),
                cache_offset = self.cursor.load(),
                "write cache full"
            );
            return Ok(false);
        }

        let data = entry.as_bytes()?;
        let len = data.len();

        // another writer may have taken the space since the check above
        let Some(offset) = self.cursor.reserve(align64(len as u64)) else {
            return Ok(false);
        };

        let (segment, local) = self.locate(offset);
        // SAFETY: the cursor reserved [offset, offset + aligned) for this call
        // alone, and it lies inside one segment and below the cache size.
        unsafe { self.segments[segment].write(local, data) };

        let location = Location { offset, len };
        {
            let mut index = self.index.write();
            index.entries.insert((ledger_id, entry_id), location);
            index.last_entry.insert(ledger_id, location);
            // counted under the lock so they never trail a visible entry
            self.count.fetch_add(1, Ordering::Relaxed);
            self.size.fetch_add(len as u64, Ordering::Relaxed);
        }

        trace!(ledger_id, entry_id, offset, len, "cached entry");
        Ok(true)
    }

    /// A copy of the entry stored under `(ledger_id, entry_id)`.
    pub fn get(&self, ledger_id: i64, entry_id: i64) -> Option<Bytes> {
        let location = self.index.read().entries.get(&(ledger_id, entry_id)).copied()?;
        Some(Bytes::copy_from_slice(self.bytes(location)))
    }

    /// A copy of the most recently inserted entry of `ledger_id`.
    pub fn get_last_entry(&self, ledger_id: i64) -> Option<Bytes> {
        let location = self.index.read().last_entry.get(&ledger_id).copied()?;
        Some(Bytes::copy_from_slice(self.bytes(location)))
    }

    pub fn has_entry(&self, ledger_id: i64, entry_id: i64) -> bool {
        self.index.read().entries.contains_key(&(ledger_id, entry_id))
    }

    /// Visit every entry in `(ledger_id, entry_id)` order.
    ///
    /// The walk stops at the first error returned by `f`. Entries stored while
    /// the walk runs may or may not be visited.
    pub fn for_each<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(i64, i64, &[u8]) -> Result<(), E>,
    {
        let mut entries: Vec<((i64, i64), Location)> = {
            let index = self.index.read();
            index.entries.iter().map(|(k, v)| (*k, *v)).collect()
        };
        entries.sort_unstable_by_key(|(key, _)| *key);

        for ((ledger_id, entry_id), location) in entries {
            f(ledger_id, entry_id, self.bytes(location))?;
        }
        Ok(())
    }

    /// Remove every entry of `ledger_id` from lookups.
    ///
    /// The space they occupy is only reclaimed by [`clear`](Self::clear).
    pub fn delete_ledger(&self, ledger_id: i64) {
        let mut index = self.index.write();
        index.entries.retain(|(ledger, _), _| *ledger != ledger_id);
        index.last_entry.remove(&ledger_id);
        debug!(ledger_id, "dropped ledger from write cache");
    }

    /// Forget all entries and rewind the cursor so the space can be reused.
    pub fn clear(&mut self) {
        let index = self.index.get_mut();
        index.entries.clear();
        index.last_entry.clear();
        self.cursor.reset();
        self.size.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
        debug!("cleared write cache");
    }

    /// Sum of the payload lengths of all successful puts.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Number of successful puts.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    #[inline]
    pub fn max_cache_size(&self) -> u64 {
        self.max_cache_size
    }

    #[inline]
    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }

    /// `log2(max_segment_size)`.
    #[inline]
    pub fn segment_offset_bits(&self) -> u32 {
        self.segment_offset_bits
    }

    /// `max_segment_size - 1`.
    #[inline]
    pub fn segment_offset_mask(&self) -> u64 {
        self.segment_offset_mask
    }

    /// Bytes handed out so far, including alignment and skipped segment tails.
    #[inline]
    pub fn cache_offset(&self) -> u64 {
        self.cursor.load()
    }

    #[inline]
    pub fn segments_count(&self) -> usize {
        self.segments.len()
    }

    /// Usable capacity of segment `i`, or `None` if there is no such segment.
    pub fn segment_capacity(&self, i: usize) -> Option<usize> {
        self.segments.get(i).map(Segment::capacity)
    }

    #[inline]
    fn locate(&self, offset: u64) -> (usize, usize) {
        (
            (offset >> self.segment_offset_bits) as usize,
            (offset & self.segment_offset_mask) as usize,
        )
    }

    fn bytes(&self, location: Location) -> &[u8] {
        let (segment, local) = self.locate(location.offset);
        // SAFETY: locations are only published after their bytes are written,
        // and the range is never written again while `&self` is borrowed.
        unsafe { self.segments[segment].slice(local, location.len) }
    }
}
