//! Lock-free counter for message ids.
//!
//! # Why atomics? (for beginners)
//!
//! Many connection tasks submit messages to the hub at the same time, and each
//! accepted message needs a distinct id.  `AtomicU64::fetch_add` reads,
//! increments, and writes the counter as a single indivisible step, so two
//! tasks calling [`SequenceCounter::next`] simultaneously can never receive
//! the same id, and neither has to wait for a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, monotonically increasing id source.
///
/// Ids start at 1 because `0` on a [`crate::Message`] means "not assigned".
///
/// # Examples
///
/// ```rust
/// use campfire_core::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a counter whose first id is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next id.
    ///
    /// `Ordering::Relaxed` is enough: ids only need to be unique, they do not
    /// publish any other memory to the reader.  Wraps to 0 after `u64::MAX`
    /// without panicking.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the id the next call to [`next`](Self::next) would hand out.
    pub fn peek(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
