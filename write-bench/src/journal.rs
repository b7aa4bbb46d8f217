//! A write cache drained into a buffered channel.
//!
//! Producers append entries to the cache concurrently. When an append finds
//! the cache full, it takes the cache exclusively, writes every cached entry
//! to the channel as a frame in `(ledger, entry)` order, forces the channel
//! and clears the cache.
//!
//! Frame layout on disk:
//!
//! ```text
//! +-----------+----------+---------+-------------+
//! | ledger_id | entry_id |   len   |   payload   |
//! |  i64 LE   |  i64 LE  | u32 LE  |  len bytes  |
//! +-----------+----------+---------+-------------+
//! ```

use buffered_channel::{BufferedChannel, ChannelError};
use bytes::{Buf, BufMut};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, error, info};
use write_cache::{WriteCache, WriteCacheError};

/// Bytes in a frame header.
pub const HEADER_LEN: usize = 8 + 8 + 4;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Cache(#[from] WriteCacheError),

    /// The entry does not fit in an empty cache.
    #[error("entry {ledger_id}:{entry_id} of {len} bytes does not fit in the write cache")]
    TooLarge {
        ledger_id: i64,
        entry_id: i64,
        len: usize,
    },

    /// The payload length does not fit in a frame header.
    #[error("entry {ledger_id}:{entry_id} of {len} bytes is too large for a frame")]
    FrameTooLarge {
        ledger_id: i64,
        entry_id: i64,
        len: usize,
    },

    /// A frame read back from the log does not match what was written.
    #[error("corrupt frame at {pos}: {reason}")]
    Corrupt { pos: u64, reason: String },

    /// An earlier drain failed part way, so the log may hold some of the
    /// cached frames. Further appends and drains are refused.
    #[error("journal failed during an earlier drain")]
    Failed,
}

/// Encode the header of a frame carrying `len` payload bytes.
fn encode_header(
    header: &mut Vec<u8>,
    ledger_id: i64,
    entry_id: i64,
    len: usize,
) -> Result<(), JournalError> {
    let frame_len = u32::try_from(len).map_err(|_| JournalError::FrameTooLarge {
        ledger_id,
        entry_id,
        len,
    })?;
    header.clear();
    header.put_i64_le(ledger_id);
    header.put_i64_le(entry_id);
    header.put_u32_le(frame_len);
    Ok(())
}

pub struct Journal {
    cache: RwLock<WriteCache>,
    channel: Mutex<BufferedChannel>,
    force_metadata: bool,
    /// Channel position when the journal was opened.
    start: u64,
    failed: AtomicBool,
    drains: AtomicU64,
    drained_bytes: AtomicU64,
}

impl Journal {
    pub fn new(cache: WriteCache, channel: BufferedChannel, force_metadata: bool) -> Self {
        let start = channel.position();
        Self {
            cache: RwLock::new(cache),
            channel: Mutex::new(channel),
            force_metadata,
            start,
            failed: AtomicBool::new(false),
            drains: AtomicU64::new(0),
            drained_bytes: AtomicU64::new(0),
        }
    }

    /// Add an entry, draining the cache first if it is full.
    pub fn append(&self, ledger_id: i64, entry_id: i64, payload: &[u8]) -> Result<(), JournalError> {
        self.ensure_healthy()?;
        if self.cache.read().put(ledger_id, entry_id, payload)? {
            return Ok(());
        }

        let mut cache = self.cache.write();
        // another producer may have drained while we waited for the lock
        if cache.put(ledger_id, entry_id, payload)? {
            return Ok(());
        }
        self.drain_locked(&mut cache)?;

        if cache.put(ledger_id, entry_id, payload)? {
            Ok(())
        } else {
            Err(JournalError::TooLarge {
                ledger_id,
                entry_id,
                len: payload.len(),
            })
        }
    }

    /// Write out whatever is cached. Returns the number of bytes written.
    pub fn drain(&self) -> Result<u64, JournalError> {
        let mut cache = self.cache.write();
        self.drain_locked(&mut cache)
    }

    fn ensure_healthy(&self) -> Result<(), JournalError> {
        if self.failed.load(Ordering::Acquire) {
            return Err(JournalError::Failed);
        }
        Ok(())
    }

    fn drain_locked(&self, cache: &mut WriteCache) -> Result<u64, JournalError> {
        self.ensure_healthy()?;
        if cache.is_empty() {
            return Ok(0);
        }

        let mut channel = self.channel.lock();
        let mut written = 0u64;
        let mut header = Vec::with_capacity(HEADER_LEN);

        let result = cache
            .for_each(|ledger_id, entry_id, data| -> Result<(), JournalError> {
                encode_header(&mut header, ledger_id, entry_id, data.len())?;
                channel.write(header.as_slice())?;
                channel.write(data)?;
                written += (HEADER_LEN + data.len()) as u64;
                Ok(())
            })
            .and_then(|()| {
                channel
                    .flush_and_force_write(self.force_metadata)
                    .map_err(JournalError::from)
            });

        let durable = match result {
            Ok(durable) => durable,
            Err(e) => {
                // frames already handed to the channel would be written twice
                // by a retry
                self.failed.store(true, Ordering::Release);
                error!(bytes = written, "drain failed: {e}");
                return Err(e);
            }
        };
        let entries = cache.count();
        cache.clear();

        self.drains.fetch_add(1, Ordering::Relaxed);
        self.drained_bytes.fetch_add(written, Ordering::Relaxed);
        debug!(entries, bytes = written, durable, "drained write cache");
        Ok(written)
    }

    /// Read every frame written since the journal was opened, checking each
    /// payload with `check`. Returns the number of frames.
    pub fn verify<F>(&self, mut check: F) -> Result<u64, JournalError>
    where
        F: FnMut(i64, i64, &[u8]) -> bool,
    {
        let mut channel = self.channel.lock();
        let end = channel.position();
        let mut pos = self.start;
        let mut header = [0u8; HEADER_LEN];
        let mut payload = Vec::new();
        let mut frames = 0;

        while pos < end {
            channel.read(&mut header, pos, HEADER_LEN)?;
            let mut cursor = &header[..];
            let ledger_id = cursor.get_i64_le();
            let entry_id = cursor.get_i64_le();
            let len = cursor.get_u32_le() as usize;
            let frame = pos;
            pos += HEADER_LEN as u64;

            if pos + len as u64 > end {
                return Err(JournalError::Corrupt {
                    pos: frame,
                    reason: format!("payload of {len} bytes runs past the end of the log"),
                });
            }
            payload.resize(len, 0);
            channel.read(&mut payload, pos, len)?;
            if !check(ledger_id, entry_id, &payload) {
                return Err(JournalError::Corrupt {
                    pos: frame,
                    reason: format!("payload mismatch for entry {ledger_id}:{entry_id}"),
                });
            }
            pos += len as u64;
            frames += 1;
        }

        info!(frames, bytes = end - self.start, "verified entry log");
        Ok(frames)
    }

    /// Flush and close the channel.
    pub fn close(&self) -> Result<(), JournalError> {
        self.channel.lock().close()?;
        Ok(())
    }

    pub fn drains(&self) -> u64 {
        self.drains.load(Ordering::Relaxed)
    }

    pub fn drained_bytes(&self) -> u64 {
        self.drained_bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buffered_channel::HeapAllocator;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn open(dir: &std::path::Path, cache_size: u64, write_buffer: usize) -> Journal {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.join("entry.log"))
            .expect("Failed to open entry log");
        let channel = BufferedChannel::new(HeapAllocator, file, write_buffer, 256, 0).unwrap();
        let cache = WriteCache::new(cache_size, 256).unwrap();
        Journal::new(cache, channel, false)
    }

    fn payload(ledger_id: i64, entry_id: i64) -> Vec<u8> {
        format!("{ledger_id}:{entry_id}").into_bytes()
    }

    #[test]
    fn test_append_drains_when_full() {
        let dir = tempdir().expect("Failed to create temp dir");
        // four 64-byte slots
        let journal = open(dir.path(), 256, 100);

        for entry_id in 0..10 {
            journal.append(1, entry_id, &payload(1, entry_id)).unwrap();
        }
        assert_eq!(journal.drains(), 2);

        journal.drain().unwrap();
        assert_eq!(journal.drains(), 3);
        // draining an empty cache is free
        assert_eq!(journal.drain().unwrap(), 0);
        assert_eq!(journal.drains(), 3);

        let mut seen = Vec::new();
        let frames = journal
            .verify(|ledger_id, entry_id, data| {
                seen.push(entry_id);
                data == payload(ledger_id, entry_id).as_slice()
            })
            .unwrap();
        assert_eq!(frames, 10);
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        journal.close().unwrap();

        let size = std::fs::metadata(dir.path().join("entry.log")).unwrap().len();
        assert_eq!(size, journal.drained_bytes());
    }

    #[test]
    fn test_drain_orders_by_ledger_then_entry() {
        let dir = tempdir().expect("Failed to create temp dir");
        let journal = open(dir.path(), 1024, 0);

        journal.append(2, 0, b"c").unwrap();
        journal.append(1, 1, b"b").unwrap();
        journal.append(1, 0, b"a").unwrap();
        journal.drain().unwrap();

        let mut order = Vec::new();
        journal
            .verify(|ledger_id, entry_id, _| {
                order.push((ledger_id, entry_id));
                true
            })
            .unwrap();
        assert_eq!(order, vec![(1, 0), (1, 1), (2, 0)]);
    }

    #[test]
    fn test_verify_reports_mismatch() {
        let dir = tempdir().expect("Failed to create temp dir");
        let journal = open(dir.path(), 1024, 64);

        journal.append(1, 0, b"entry").unwrap();
        journal.drain().unwrap();

        let err = journal.verify(|_, _, _| false).unwrap_err();
        assert!(matches!(err, JournalError::Corrupt { pos: 0, .. }));
    }

    #[test]
    fn test_failed_drain_stops_the_journal() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("entry.log");
        std::fs::write(&path, b"").unwrap();
        let file = OpenOptions::new().read(true).open(&path).unwrap();
        let channel = BufferedChannel::new(HeapAllocator, file, 64, 0, 0).unwrap();
        let journal = Journal::new(WriteCache::new(1024, 256).unwrap(), channel, false);

        journal.append(1, 0, b"first").unwrap();
        journal.append(1, 1, b"second").unwrap();
        assert!(matches!(journal.drain(), Err(JournalError::Channel(_))));

        assert!(matches!(journal.drain(), Err(JournalError::Failed)));
        assert!(matches!(journal.append(1, 2, b"third"), Err(JournalError::Failed)));
        assert_eq!(journal.drains(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_frame_length_must_fit_header() {
        let mut header = Vec::new();
        encode_header(&mut header, 3, 4, u32::MAX as usize).unwrap();
        assert_eq!(header.len(), HEADER_LEN);
        assert_eq!(&header[16..], &u32::MAX.to_le_bytes());

        let err = encode_header(&mut header, 3, 5, u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(
            err,
            JournalError::FrameTooLarge {
                ledger_id: 3,
                entry_id: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_entry_larger_than_empty_cache() {
        let dir = tempdir().expect("Failed to create temp dir");
        let journal = open(dir.path(), 64, 64);

        let err = journal.append(1, 0, &[0u8; 65]).unwrap_err();
        assert!(matches!(err, JournalError::TooLarge { len: 65, .. }));
    }
}
