//! Read-ahead window over the persisted region of a channel.

use crate::error::{ChannelError, ChannelResult};
use crate::file::BackingFile;
use bytes::BytesMut;
use std::io;
use storage_core::BufferAllocator;
use tracing::trace;

/// A single cached window `[start, start + len)` of the backing file.
///
/// The window only ever covers bytes below the channel's persisted position,
/// which only grows by appending, so a filled window never goes stale. A miss
/// invalidates the window and refills it from the missed offset.
#[derive(Debug)]
pub(crate) struct ReadAheadCache {
    /// Lazily allocated window storage.
    buffer: Option<BytesMut>,
    /// Start offset of the window, `None` while unset.
    start: Option<u64>,
    /// Maximum window size in bytes.
    capacity: usize,
}

impl ReadAheadCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buffer: None,
            start: None,
            capacity,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn start_position(&self) -> Option<u64> {
        self.start
    }

    /// Cached bytes from `pos` to the end of the window, if `pos` is inside it.
    pub(crate) fn lookup(&self, pos: u64) -> Option<&[u8]> {
        let start = self.start?;
        let buffer = self.buffer.as_ref()?;
        if pos < start {
            return None;
        }
        let offset = usize::try_from(pos - start).ok()?;
        if offset < buffer.len() {
            Some(&buffer[offset..])
        } else {
            None
        }
    }

    /// Refill the window from `pos`, reading no further than `limit`.
    ///
    /// Returns the number of bytes now cached. Zero bytes available is a
    /// short read.
    pub(crate) fn fill<F, A>(
        &mut self,
        file: &F,
        allocator: &A,
        pos: u64,
        limit: u64,
    ) -> ChannelResult<usize>
    where
        F: BackingFile + ?Sized,
        A: BufferAllocator + ?Sized,
    {
        self.invalidate();

        let want = limit.saturating_sub(pos).min(self.capacity as u64) as usize;
        let mut buffer = match self.buffer.take() {
            Some(buffer) => buffer,
            None => allocator.buffer(self.capacity)?,
        };
        buffer.clear();
        buffer.resize(want, 0);

        let mut filled = 0;
        while filled < want {
            match file.read_at(&mut buffer[filled..], pos + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    buffer.clear();
                    self.buffer = Some(buffer);
                    return Err(e.into());
                }
            }
        }
        buffer.truncate(filled);
        self.buffer = Some(buffer);

        if filled == 0 {
            return Err(ChannelError::ShortRead { pos });
        }

        trace!(start = pos, len = filled, "refilled read-ahead window");
        self.start = Some(pos);
        Ok(filled)
    }

    /// Forget the cached window, keeping its storage for reuse.
    pub(crate) fn invalidate(&mut self) {
        self.start = None;
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
        }
    }

    /// Forget the window and drop its storage.
    pub(crate) fn release(&mut self) {
        self.start = None;
        self.buffer = None;
    }
}
