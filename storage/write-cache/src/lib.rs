//! write-cache: segmented, concurrently appendable cache of ledger entries.
//!
//! Newly appended entries are held here, keyed by `(ledger_id, entry_id)`,
//! until the owner drains them to durable storage:
//!
//! - **Segments**: fixed-capacity zeroed memory regions allocated up front
//! - **Cursor**: a lock-free compare-and-swap allocator over the segments
//! - **Index**: entry lookup plus a per-ledger "last inserted" entry
//!
//! A full cache is reported by [`WriteCache::put`] returning `Ok(false)`;
//! the owner is expected to drain it with [`WriteCache::for_each`] and
//! [`WriteCache::clear`] it.
//!
//! # Example
//!
//! ```ignore
//! use write_cache::WriteCache;
//!
//! let cache = WriteCache::new(1024 * 1024, 64 * 1024)?;
//! assert!(cache.put(7, 0, b"first entry")?);
//! assert_eq!(cache.get_last_entry(7).unwrap(), &b"first entry"[..]);
//! ```

#![warn(clippy::all)]

mod cache;
mod cursor;
mod error;
mod segment;

pub use cache::{WriteCache, align64};
pub use error::{WriteCacheError, WriteCacheResult};

pub use storage_core::{BufferError, ByteSource};
