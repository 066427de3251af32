//! Modification time tracking.
//!
//! Every mutable object owns a [`TimeStamp`]. Calling [`TimeStamp::modified`]
//! takes the next tick of a process-wide counter, so stamps taken by different
//! objects are totally ordered. A consumer that caches derived data records the
//! tick at which it built and compares it against the stamps of its producers.

use std::sync::atomic::{AtomicU64, Ordering};

static GLOBAL_CLOCK: AtomicU64 = AtomicU64::new(0);

fn next_tick() -> u64 {
    GLOBAL_CLOCK.fetch_add(1, Ordering::Relaxed) + 1
}

/// A monotonically increasing modification time.
///
/// A freshly created stamp reads 0, which is older than any tick ever handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeStamp {
    mtime: u64,
}

impl TimeStamp {
    /// Creates a stamp that has never been modified.
    pub const fn new() -> Self {
        Self { mtime: 0 }
    }

    /// Creates a stamp already set to a fresh tick.
    pub fn now() -> Self {
        Self { mtime: next_tick() }
    }

    /// Marks the owner as modified.
    pub fn modified(&mut self) {
        self.mtime = next_tick();
    }

    /// Returns the tick of the last modification (0 if never modified).
    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    /// Returns whether this stamp has ever been set.
    pub fn is_set(&self) -> bool {
        self.mtime != 0
    }

    /// Returns whether data built at this stamp is out of date with respect
    /// to a producer modified at `producer_mtime`.
    ///
    /// Unset stamps are always stale.
    pub fn is_older_than(&self, producer_mtime: u64) -> bool {
        !self.is_set() || producer_mtime >= self.mtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stamp_is_unset() {
        let stamp = TimeStamp::new();
        assert_eq!(stamp.mtime(), 0);
        assert!(!stamp.is_set());
        assert!(stamp.is_older_than(0));
    }

    #[test]
    fn test_modified_is_monotonic_across_stamps() {
        let mut a = TimeStamp::new();
        let mut b = TimeStamp::new();
        a.modified();
        b.modified();
        assert!(b.mtime() > a.mtime());
        a.modified();
        assert!(a.mtime() > b.mtime());
    }

    #[test]
    fn test_staleness() {
        let mut producer = TimeStamp::new();
        producer.modified();
        let built = TimeStamp::now();
        assert!(!built.is_older_than(producer.mtime()));
        producer.modified();
        assert!(built.is_older_than(producer.mtime()));
    }
}
