//! The buffered channel.

use crate::error::{ChannelError, ChannelResult};
use crate::file::BackingFile;
use crate::read_ahead::ReadAheadCache;
use bytes::BytesMut;
use std::fs::File;
use std::io;
use storage_core::{BufferAllocator, ByteSource, HeapAllocator};
use tracing::{debug, trace, warn};

/// A write buffer and a read-ahead window in front of a [`BackingFile`].
///
/// Bytes are appended at the logical `position`. Everything below
/// `file_channel_position` has been handed to the file; everything from there
/// up to `position` lives only in the write buffer.
///
/// ```text
///  0                 file_channel_position          position
///  +------------------------+------------------------+
///  |   persisted (file)     |  unpersisted (buffer)  |
///  +------------------------+------------------------+
///        ^ read-ahead window
/// ```
///
/// The channel is single-writer: every operation takes `&mut self`.
pub struct BufferedChannel<F: BackingFile = File, A: BufferAllocator = HeapAllocator> {
    allocator: A,
    file: F,

    /// Allocated on the first write that needs to retain bytes.
    write_buffer: Option<BytesMut>,
    write_capacity: usize,

    read_ahead: ReadAheadCache,

    /// `<= 0` disables threshold flushing.
    unpersisted_bytes_bound: i64,
    regular_flushes: bool,

    position: u64,
    file_channel_position: u64,
    unpersisted_bytes: u64,

    closed: bool,
}

impl<F: BackingFile, A: BufferAllocator> BufferedChannel<F, A> {
    /// Wrap `file`, resuming at its current end of data.
    ///
    /// Fails with the file's native error if its size cannot be queried.
    /// No buffers are allocated until they are needed.
    pub fn new(
        allocator: A,
        file: F,
        write_capacity: usize,
        read_capacity: usize,
        unpersisted_bytes_bound: i64,
    ) -> ChannelResult<Self> {
        let position = file.size()?;

        debug!(
            position,
            write_capacity,
            read_capacity,
            unpersisted_bytes_bound,
            "opened buffered channel"
        );

        Ok(Self {
            allocator,
            file,
            write_buffer: None,
            write_capacity,
            read_ahead: ReadAheadCache::new(read_capacity),
            unpersisted_bytes_bound,
            regular_flushes: unpersisted_bytes_bound > 0,
            position,
            file_channel_position: position,
            unpersisted_bytes: 0,
            closed: false,
        })
    }

    /// Append the readable bytes of `src`.
    ///
    /// When the bytes pending in memory reach the flush threshold, all but
    /// `pending % threshold` of them are written to the file. The threshold is
    /// the unpersisted-bytes bound when regular flushes are enabled and the
    /// bound is below the write capacity, otherwise the write capacity.
    ///
    /// The source is inspected before any state changes, and a failed file
    /// write leaves the positions untouched.
    pub fn write<S: ByteSource + ?Sized>(&mut self, src: &S) -> ChannelResult<()> {
        self.ensure_open()?;

        let data = src.as_bytes()?;
        if data.is_empty() {
            return Ok(());
        }

        let len = data.len() as u64;
        let threshold = self.flush_threshold();
        let pending = self.unpersisted_bytes + len;
        let retained = if threshold == 0 {
            0
        } else if pending < threshold {
            pending
        } else {
            pending % threshold
        };

        if self.write_capacity > 0 {
            self.write_buffer()?;
        }

        if retained == pending {
            self.write_buffer()?.extend_from_slice(data);
        } else {
            // retained < threshold and the buffer held less than threshold,
            // so the retained tail always comes from this write
            debug_assert!(retained < len);
            let split = (len - retained) as usize;
            self.persist(&data[..split])?;
            if split < data.len() {
                self.write_buffer()?.extend_from_slice(&data[split..]);
            }
        }

        self.position += len;
        self.unpersisted_bytes = retained;
        debug_assert_eq!(
            self.file_channel_position + self.unpersisted_bytes,
            self.position
        );

        Ok(())
    }

    /// Copy `length` bytes starting at logical offset `pos` into `dest`.
    ///
    /// Bytes at or above the persisted position come from the write buffer,
    /// bytes below it from the read-ahead window or the file. A read may span
    /// both regions. Returns `length`; running out of data is an error rather
    /// than a short count.
    pub fn read(&mut self, dest: &mut [u8], pos: u64, length: usize) -> ChannelResult<usize> {
        self.ensure_open()?;

        if dest.len() < length {
            return Err(ChannelError::DestinationTooSmall {
                needed: length,
                available: dest.len(),
            });
        }

        let end = pos
            .checked_add(length as u64)
            .filter(|end| *end <= self.position)
            .ok_or(ChannelError::OutOfBounds {
                pos,
                length,
                position: self.position,
            })?;

        let mut cursor = pos;
        let mut copied = 0;
        while cursor < end {
            let out = &mut dest[copied..length];
            let n = if cursor >= self.file_channel_position {
                self.read_buffered(cursor, out)?
            } else {
                let limit = end.min(self.file_channel_position);
                self.read_persisted(cursor, limit, out)?
            };
            cursor += n as u64;
            copied += n;
        }

        Ok(copied)
    }

    /// Write every buffered byte to the file.
    pub fn flush(&mut self) -> ChannelResult<()> {
        self.ensure_open()?;
        if self.unpersisted_bytes == 0 {
            return Ok(());
        }
        self.persist(&[])?;
        self.unpersisted_bytes = 0;
        Ok(())
    }

    /// Sync the file to stable storage.
    ///
    /// Returns the position covered by the sync. Bytes still in the write
    /// buffer are not included; see [`flush_and_force_write`].
    ///
    /// [`flush_and_force_write`]: Self::flush_and_force_write
    pub fn force_write(&mut self, force_metadata: bool) -> ChannelResult<u64> {
        self.ensure_open()?;
        let durable = self.file_channel_position;
        self.file.sync(force_metadata)?;
        trace!(position = durable, force_metadata, "forced channel to disk");
        Ok(durable)
    }

    /// Flush the write buffer, then sync the file.
    pub fn flush_and_force_write(&mut self, force_metadata: bool) -> ChannelResult<u64> {
        self.flush()?;
        self.force_write(force_metadata)
    }

    /// Flush pending bytes and close the channel.
    ///
    /// Later reads and writes fail with [`ChannelError::Closed`]. Closing an
    /// already closed channel does nothing. If the flush fails the channel
    /// stays open.
    pub fn close(&mut self) -> ChannelResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.write_buffer = None;
        self.read_ahead.release();
        self.closed = true;
        debug!(position = self.position, "closed buffered channel");
        Ok(())
    }

    /// Total bytes ever written.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Offset up to which bytes have been written to the file.
    #[inline]
    pub fn file_channel_position(&self) -> u64 {
        self.file_channel_position
    }

    /// Bytes held only in the write buffer.
    #[inline]
    pub fn unpersisted_bytes(&self) -> u64 {
        self.unpersisted_bytes
    }

    #[inline]
    pub fn unpersisted_bytes_bound(&self) -> i64 {
        self.unpersisted_bytes_bound
    }

    /// Whether the unpersisted-bytes bound drives flushing.
    #[inline]
    pub fn is_regular_flushes(&self) -> bool {
        self.regular_flushes
    }

    #[inline]
    pub fn write_capacity(&self) -> usize {
        self.write_capacity
    }

    #[inline]
    pub fn read_capacity(&self) -> usize {
        self.read_ahead.capacity()
    }

    /// Start of the read-ahead window, `None` until a file read fills it.
    #[inline]
    pub fn read_buffer_start_position(&self) -> Option<u64> {
        self.read_ahead.start_position()
    }

    /// Bytes currently held in the write buffer.
    #[inline]
    pub fn write_buffer_len(&self) -> usize {
        self.write_buffer.as_ref().map_or(0, |b| b.len())
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The backing file.
    #[inline]
    pub fn file(&self) -> &F {
        &self.file
    }

    fn ensure_open(&self) -> ChannelResult<()> {
        if self.closed {
            Err(ChannelError::Closed)
        } else {
            Ok(())
        }
    }

    fn flush_threshold(&self) -> u64 {
        let capacity = self.write_capacity as u64;
        if self.regular_flushes && (self.unpersisted_bytes_bound as u64) < capacity {
            self.unpersisted_bytes_bound as u64
        } else {
            capacity
        }
    }

    fn write_buffer(&mut self) -> ChannelResult<&mut BytesMut> {
        let buffer = match self.write_buffer.take() {
            Some(buffer) => buffer,
            None => self.allocator.buffer(self.write_capacity)?,
        };
        Ok(self.write_buffer.insert(buffer))
    }

    /// Write the buffered bytes followed by `head` at the persisted position.
    ///
    /// State only advances once every byte has been accepted by the file.
    fn persist(&mut self, head: &[u8]) -> ChannelResult<()> {
        let start = self.file_channel_position;
        let mut offset = start;

        if let Some(buffer) = self.write_buffer.as_ref()
            && !buffer.is_empty()
        {
            self.file.write_all_at(buffer, offset)?;
            offset += buffer.len() as u64;
        }
        if !head.is_empty() {
            self.file.write_all_at(head, offset)?;
            offset += head.len() as u64;
        }

        if let Some(buffer) = self.write_buffer.as_mut() {
            buffer.clear();
        }
        self.file_channel_position = offset;
        trace!(from = start, to = offset, "flushed write buffer");
        Ok(())
    }

    fn read_buffered(&self, cursor: u64, out: &mut [u8]) -> ChannelResult<usize> {
        let buffered = self.write_buffer.as_deref().unwrap_or_default();
        let offset = (cursor - self.file_channel_position) as usize;
        let available = buffered.len().saturating_sub(offset).min(out.len());
        if available == 0 {
            return Err(ChannelError::ShortRead { pos: cursor });
        }
        out[..available].copy_from_slice(&buffered[offset..offset + available]);
        Ok(available)
    }

    fn read_persisted(&mut self, cursor: u64, limit: u64, out: &mut [u8]) -> ChannelResult<usize> {
        let want = ((limit - cursor) as usize).min(out.len());

        if self.read_ahead.capacity() == 0 {
            return match self.file.read_exact_at(&mut out[..want], cursor) {
                Ok(()) => Ok(want),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    Err(ChannelError::ShortRead { pos: cursor })
                }
                Err(e) => Err(e.into()),
            };
        }

        if self.read_ahead.lookup(cursor).is_none() {
            self.read_ahead.fill(
                &self.file,
                &self.allocator,
                cursor,
                self.file_channel_position,
            )?;
        }

        let window = self
            .read_ahead
            .lookup(cursor)
            .ok_or(ChannelError::ShortRead { pos: cursor })?;
        let n = window.len().min(want);
        out[..n].copy_from_slice(&window[..n]);
        Ok(n)
    }
}

impl<F: BackingFile, A: BufferAllocator> Drop for BufferedChannel<F, A> {
    fn drop(&mut self) {
        if !self.closed && self.unpersisted_bytes > 0 {
            warn!(
                unpersisted_bytes = self.unpersisted_bytes,
                "buffered channel dropped with unflushed bytes"
            );
        }
    }
}

impl<F: BackingFile, A: BufferAllocator> std::fmt::Debug for BufferedChannel<F, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedChannel")
            .field("position", &self.position)
            .field("file_channel_position", &self.file_channel_position)
            .field("unpersisted_bytes", &self.unpersisted_bytes)
            .field("write_capacity", &self.write_capacity)
            .field("read_capacity", &self.read_ahead.capacity())
            .field("unpersisted_bytes_bound", &self.unpersisted_bytes_bound)
            .field("closed", &self.closed)
            .finish()
    }
}
