//! Synchronization primitives with optional loom support.
//!
//! Production builds use `std` atomics; with the `loom` feature enabled the
//! same names resolve to loom's model-checked atomics.

#[cfg(not(feature = "loom"))]
pub use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicU64, Ordering};

/// Spin loop hint for CAS retry loops.
///
/// Under loom this yields so the model checker can schedule other threads.
#[inline]
pub fn spin_loop() {
    #[cfg(not(feature = "loom"))]
    std::hint::spin_loop();

    #[cfg(feature = "loom")]
    loom::thread::yield_now();
}
