//! buffered-channel: write-buffered, read-ahead cached access to a log file.
//!
//! A [`BufferedChannel`] sits between an appending writer and a
//! [`BackingFile`]. Writes accumulate in memory and are handed to the file
//! once the flush threshold is reached; reads are served from the write
//! buffer, a single read-ahead window, or the file itself.
//!
//! ```text
//!   write(src) ---> [ write buffer ] --flush--> +--------------+
//!                                               | BackingFile  |
//!   read(pos)  <--- [ read-ahead   ] <--fill--- +--------------+
//!              <--- [ write buffer ]   (pos >= file_channel_position)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use buffered_channel::{BufferedChannel, HeapAllocator};
//!
//! let file = std::fs::OpenOptions::new()
//!     .read(true)
//!     .write(true)
//!     .create(true)
//!     .open("entry.log")?;
//! let mut channel = BufferedChannel::new(HeapAllocator, file, 64 * 1024, 8 * 1024, 0)?;
//!
//! channel.write(b"Hello world!")?;
//! let mut buf = [0u8; 5];
//! channel.read(&mut buf, 0, 5)?;
//! channel.flush_and_force_write(false)?;
//! channel.close()?;
//! ```

#![warn(clippy::all)]

mod channel;
mod error;
mod file;
mod read_ahead;

pub use channel::BufferedChannel;
pub use error::{ChannelError, ChannelResult};
pub use file::BackingFile;

// Re-export the capabilities a caller needs to construct and feed a channel.
pub use storage_core::{BufferAllocator, BufferError, ByteSource, HeapAllocator};
