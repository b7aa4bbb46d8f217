//! Shared fixtures for channel integration tests.

#![allow(dead_code)]

use buffered_channel::{BackingFile, BufferAllocator, BufferError, ByteSource};
use bytes::BytesMut;
use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use storage_core::BufferResult;

/// Open (creating and truncating) a read-write log file.
pub fn open_log(dir: &Path, name: &str) -> File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(dir.join(name))
        .expect("Failed to open log file")
}

/// Read a whole file from the start.
pub fn contents(path: &Path) -> Vec<u8> {
    std::fs::read(path).expect("Failed to read log file")
}

/// In-memory backing file that counts reads and can be told to fail.
#[derive(Default)]
pub struct MemFile {
    pub data: RefCell<Vec<u8>>,
    pub reads: Cell<usize>,
    pub fail_writes: Cell<bool>,
    pub fail_size: bool,
}

impl MemFile {
    pub fn with_data(data: &[u8]) -> Self {
        Self {
            data: RefCell::new(data.to_vec()),
            ..Default::default()
        }
    }

    /// A handle whose size cannot be queried.
    pub fn invalid() -> Self {
        Self {
            fail_size: true,
            ..Default::default()
        }
    }
}

impl BackingFile for MemFile {
    fn size(&self) -> io::Result<u64> {
        if self.fail_size {
            return Err(io::Error::other("bad file descriptor"));
        }
        Ok(self.data.borrow().len() as u64)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.reads.set(self.reads.get() + 1);
        let data = self.data.borrow();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        if self.fail_writes.get() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        let mut data = self.data.borrow_mut();
        let offset = offset as usize;
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&self, _metadata: bool) -> io::Result<()> {
        Ok(())
    }
}

/// Allocator that never produces a buffer.
pub struct NoBuffers;

impl BufferAllocator for NoBuffers {
    fn buffer(&self, capacity: usize) -> BufferResult<BytesMut> {
        Err(BufferError::Allocation { capacity })
    }
}

/// A source that claims bytes but cannot expose them.
pub struct Corrupt;

impl ByteSource for Corrupt {
    fn readable_bytes(&self) -> usize {
        2
    }

    fn as_bytes(&self) -> BufferResult<&[u8]> {
        Err(BufferError::Corrupted("reader index past writer index".into()))
    }
}

/// Expected `(position, file_channel_position, unpersisted_bytes)` after
/// writing `sizes` in order to an empty channel.
pub fn expected_state(write_capacity: u64, bound: i64, sizes: &[u64]) -> (u64, u64, u64) {
    let threshold = if bound > 0 && (bound as u64) < write_capacity {
        bound as u64
    } else {
        write_capacity
    };
    let mut position = 0;
    let mut unpersisted = 0;
    for &n in sizes {
        if n == 0 {
            continue;
        }
        position += n;
        let pending = unpersisted + n;
        unpersisted = if threshold == 0 {
            0
        } else if pending >= threshold {
            pending % threshold
        } else {
            pending
        };
    }
    (position, position - unpersisted, unpersisted)
}
