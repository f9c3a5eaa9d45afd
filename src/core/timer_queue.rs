//! Min-heap of timer entries keyed by their firing instant.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One pending entry.
struct TimerEntry<I, T> {
    fire_at: I,
    seq: u64,
    task: T,
}

impl<I: Ord, T> PartialEq for TimerEntry<I, T> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl<I: Ord, T> Eq for TimerEntry<I, T> {}

impl<I: Ord, T> PartialOrd for TimerEntry<I, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I: Ord, T> Ord for TimerEntry<I, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for the max-heap: earliest fire_at on top, then lowest seq.
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered queue of deferred tasks.
///
/// Generic over the instant type so the same heap serves both the thread-based
/// scheduler (`std::time::Instant`) and the Tokio one (`tokio::time::Instant`).
/// Entries with equal `fire_at` come out in insertion order, but callers must
/// not depend on that.
pub struct TimerQueue<I, T> {
    entries: BinaryHeap<TimerEntry<I, T>>,
    next_seq: u64,
}

impl<I: Ord + Copy, T> TimerQueue<I, T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Insert a task firing at `fire_at`. O(log n).
    pub fn push(&mut self, fire_at: I, task: T) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.entries.push(TimerEntry { fire_at, seq, task });
    }

    /// Firing instant of the earliest entry.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        self.entries.peek().map(|entry| entry.fire_at)
    }

    /// Remove and return the earliest entry if it is due at `now`.
    pub fn pop_due(&mut self, now: I) -> Option<T> {
        if self.next_deadline()? > now {
            return None;
        }
        self.entries.pop().map(|entry| entry.task)
    }

    /// Drop every entry, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.entries.len();
        self.entries.clear();
        discarded
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<I: Ord + Copy, T> Default for TimerQueue<I, T> {
    fn default() -> Self {
        Self::new()
    }
}
