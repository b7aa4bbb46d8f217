//! Read-path tests for BufferedChannel.
//!
//! Reads are resolved from the write buffer, the read-ahead window or the
//! file, and may span the persisted/buffered boundary.

mod common;

use buffered_channel::{BufferedChannel, ChannelError, HeapAllocator};
use common::{MemFile, open_log};
use std::fs::OpenOptions;
use tempfile::tempdir;

fn read_vec<F, A>(channel: &mut BufferedChannel<F, A>, pos: u64, length: usize) -> Vec<u8>
where
    F: buffered_channel::BackingFile,
    A: buffered_channel::BufferAllocator,
{
    let mut buf = vec![0u8; length];
    let n = channel.read(&mut buf, pos, length).expect("read failed");
    assert_eq!(n, length);
    buf
}

// =============================================================================
// Buffered and Persisted Regions
// =============================================================================

#[test]
fn test_read_from_write_buffer() {
    let mut channel = BufferedChannel::new(HeapAllocator, MemFile::default(), 64, 16, 0).unwrap();
    channel.write(b"Hello world!").unwrap();
    assert_eq!(channel.file_channel_position(), 0);

    assert_eq!(read_vec(&mut channel, 0, 5), b"Hello");
    assert_eq!(read_vec(&mut channel, 6, 6), b"world!");
    assert_eq!(channel.file().reads.get(), 0);
    assert_eq!(channel.read_buffer_start_position(), None);
}

#[test]
fn test_read_through_read_ahead_window() {
    let mut channel = BufferedChannel::new(HeapAllocator, MemFile::default(), 0, 4, 0).unwrap();
    channel.write(b"Hello world!").unwrap();

    assert_eq!(read_vec(&mut channel, 6, 5), b"world");
    // the window was refilled at 6 and again at 10
    assert_eq!(channel.read_buffer_start_position(), Some(10));
}

#[test]
fn test_read_ahead_serves_hits_without_file_reads() {
    let mut channel = BufferedChannel::new(HeapAllocator, MemFile::default(), 0, 8, 0).unwrap();
    channel.write(b"abcdefghijkl").unwrap();

    assert_eq!(read_vec(&mut channel, 0, 2), b"ab");
    assert_eq!(channel.file().reads.get(), 1);
    assert_eq!(channel.read_buffer_start_position(), Some(0));

    assert_eq!(read_vec(&mut channel, 2, 2), b"cd");
    assert_eq!(read_vec(&mut channel, 4, 4), b"efgh");
    assert_eq!(channel.file().reads.get(), 1);

    assert_eq!(read_vec(&mut channel, 8, 4), b"ijkl");
    assert_eq!(channel.file().reads.get(), 2);
    assert_eq!(channel.read_buffer_start_position(), Some(8));
}

#[test]
fn test_read_ahead_miss_below_window_refills() {
    let mut channel = BufferedChannel::new(HeapAllocator, MemFile::default(), 0, 4, 0).unwrap();
    channel.write(b"abcdefgh").unwrap();

    assert_eq!(read_vec(&mut channel, 4, 2), b"ef");
    assert_eq!(read_vec(&mut channel, 1, 2), b"bc");
    assert_eq!(channel.read_buffer_start_position(), Some(1));
}

#[test]
fn test_read_direct_without_read_ahead() {
    let mut channel = BufferedChannel::new(HeapAllocator, MemFile::default(), 0, 0, 0).unwrap();
    channel.write(b"Hello world!").unwrap();

    assert_eq!(read_vec(&mut channel, 0, 12), b"Hello world!");
    assert_eq!(read_vec(&mut channel, 4, 3), b"o w");
    assert_eq!(channel.read_buffer_start_position(), None);
}

#[test]
fn test_read_spans_persisted_and_buffered() {
    let mut channel = BufferedChannel::new(HeapAllocator, MemFile::default(), 8, 16, 0).unwrap();

    channel.write(b"Hello world").unwrap();
    assert_eq!(channel.file_channel_position(), 8);
    channel.write(b"!").unwrap();
    assert_eq!(channel.unpersisted_bytes(), 4);

    assert_eq!(read_vec(&mut channel, 0, 12), b"Hello world!");
    assert_eq!(read_vec(&mut channel, 6, 5), b"world");
}

#[test]
fn test_read_window_never_passes_persisted_position() {
    let mut channel = BufferedChannel::new(HeapAllocator, MemFile::default(), 8, 64, 0).unwrap();
    channel.write(b"0123456789").unwrap();

    assert_eq!(read_vec(&mut channel, 0, 10), b"0123456789");

    // more bytes persisted after the window was filled are still visible
    channel.write(b"abcdefgh").unwrap();
    assert_eq!(channel.file_channel_position(), 16);
    assert_eq!(read_vec(&mut channel, 6, 12), b"6789abcdefgh");
}

#[test]
fn test_read_after_reopen() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("reopen.log");
    let file = open_log(dir.path(), "reopen.log");

    let mut channel = BufferedChannel::new(HeapAllocator, file, 64, 0, 0).unwrap();
    channel.write(b"durable bytes").unwrap();
    channel.close().unwrap();

    let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    let mut channel = BufferedChannel::new(HeapAllocator, file, 64, 4, 0).unwrap();
    assert_eq!(channel.position(), 13);
    assert_eq!(read_vec(&mut channel, 0, 13), b"durable bytes");
}

// =============================================================================
// Argument and Bounds Errors
// =============================================================================

#[test]
fn test_read_beyond_position_fails() {
    let mut channel = BufferedChannel::new(HeapAllocator, MemFile::default(), 64, 0, 0).unwrap();
    channel.write(b"Hello world!").unwrap();

    let mut buf = [0u8; 8];
    let err = channel.read(&mut buf, 10, 5).unwrap_err();
    assert!(matches!(
        err,
        ChannelError::OutOfBounds {
            pos: 10,
            length: 5,
            position: 12
        }
    ));
    assert!(matches!(
        channel.read(&mut buf, u64::MAX, 2),
        Err(ChannelError::OutOfBounds { .. })
    ));
}

#[test]
fn test_empty_read_at_end() {
    let mut channel = BufferedChannel::new(HeapAllocator, MemFile::default(), 64, 0, 0).unwrap();
    channel.write(b"abc").unwrap();

    let mut buf = [0u8; 0];
    assert_eq!(channel.read(&mut buf, 3, 0).unwrap(), 0);
}

#[test]
fn test_destination_too_small() {
    let mut channel = BufferedChannel::new(HeapAllocator, MemFile::default(), 64, 0, 0).unwrap();
    channel.write(b"Hello world!").unwrap();

    let mut buf = [0u8; 4];
    let err = channel.read(&mut buf, 0, 5).unwrap_err();
    assert!(matches!(
        err,
        ChannelError::DestinationTooSmall {
            needed: 5,
            available: 4
        }
    ));
}

#[test]
fn test_short_read_is_an_error() {
    let dir = tempdir().expect("Failed to create temp dir");
    let file = open_log(dir.path(), "truncated.log");

    for read_capacity in [0, 16] {
        let mut channel = BufferedChannel::new(HeapAllocator, &file, 0, read_capacity, 0).unwrap();
        channel.write(b"Hello world!").unwrap();
        file.set_len(4).unwrap();

        let mut buf = [0u8; 8];
        let err = channel.read(&mut buf, 2, 8).unwrap_err();
        assert!(
            matches!(err, ChannelError::ShortRead { .. }),
            "read capacity {read_capacity}: {err:?}"
        );
        file.set_len(0).unwrap();
    }
}
