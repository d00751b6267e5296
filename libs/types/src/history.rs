//! Fixed-capacity replay history.
//!
//! When the history is full, enqueuing a new item evicts the oldest one.
//! Memory usage is bounded at `capacity` items regardless of publish volume.
//!
//! # Usage on the bus
//!
//! Each broker topic owns one `BoundedHistory<String>` of encoded envelope
//! lines; the wire server owns one `BoundedHistory<Envelope>` shared by all
//! peers. New subscribers and newly accepted peers are served from
//! [`BoundedHistory::snapshot`] / [`BoundedHistory::latest`] before they see
//! live traffic.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use parking_lot::Mutex;

use crate::common::errors::HistoryError;

/// Thread-safe, fixed-size FIFO buffer with oldest-first eviction.
///
/// Every mutation and every snapshot happens under one mutex scoped to the
/// instance. Snapshots copy the backing storage while the lock is held and
/// release it before the caller iterates.
#[derive(Debug)]
pub struct BoundedHistory<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> BoundedHistory<T> {
    /// Create a history holding at most `capacity` items.
    ///
    /// Returns [`HistoryError::ZeroCapacity`] when `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, HistoryError> {
        NonZeroUsize::new(capacity)
            .map(Self::with_capacity)
            .ok_or(HistoryError::ZeroCapacity { capacity })
    }

    /// Infallible constructor for callers that validated capacity up front.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            // Pre-allocate a modest chunk; VecDeque grows lazily.
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Append `item`, evicting the oldest entry first if at capacity.
    pub fn enqueue(&self, item: T) {
        let mut items = self.items.lock();
        if items.len() == self.capacity {
            items.pop_front();
        }
        items.push_back(item);
    }

    /// Independent copy of every buffered item, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        let items = self.items.lock();
        items.iter().cloned().collect()
    }

    /// The most recent `min(count, len)` items, oldest first.
    #[must_use]
    pub fn latest(&self, count: usize) -> Vec<T> {
        let items = self.items.lock();
        let skip = items.len().saturating_sub(count);
        items.iter().skip(skip).cloned().collect()
    }

    /// Current number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Discard all buffered items without changing capacity.
    pub fn clear(&self) {
        self.items.lock().clear();
    }

    /// Configured maximum number of items.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_history_is_empty() {
        let history: BoundedHistory<u32> = BoundedHistory::new(8).unwrap();
        assert!(history.is_empty());
        assert_eq!(history.len(), 0);
        assert_eq!(history.capacity(), 8);
        assert!(history.snapshot().is_empty());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = BoundedHistory::<u32>::new(0).unwrap_err();
        assert_eq!(err, HistoryError::ZeroCapacity { capacity: 0 });
    }

    #[test]
    fn test_overflow_keeps_last_n_oldest_first() {
        let history = BoundedHistory::new(3).unwrap();
        for item in ["a", "b", "c", "d"] {
            history.enqueue(item);
        }
        assert_eq!(history.snapshot(), vec!["b", "c", "d"]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_many_pushes_retain_tail_in_order() {
        let history = BoundedHistory::new(5).unwrap();
        for i in 0u32..100 {
            history.enqueue(i);
        }
        assert_eq!(history.snapshot(), vec![95, 96, 97, 98, 99]);
    }

    #[test]
    fn test_latest_returns_most_recent_oldest_first() {
        let history = BoundedHistory::new(10).unwrap();
        for i in 1u32..=6 {
            history.enqueue(i);
        }
        assert_eq!(history.latest(3), vec![4, 5, 6]);
        assert_eq!(history.latest(0), Vec::<u32>::new());
        // Asking for more than is buffered returns everything.
        assert_eq!(history.latest(50), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let history = BoundedHistory::new(4).unwrap();
        history.enqueue("x".to_string());
        let snapshot = history.snapshot();
        history.enqueue("y".to_string());
        assert_eq!(snapshot, vec!["x".to_string()]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let history = BoundedHistory::new(2).unwrap();
        history.enqueue(1);
        history.enqueue(2);
        history.clear();
        assert!(history.is_empty());
        history.enqueue(3);
        assert_eq!(history.snapshot(), vec![3]);
        assert_eq!(history.capacity(), 2);
    }

    #[test]
    fn test_concurrent_enqueue_never_exceeds_capacity() {
        let history = Arc::new(BoundedHistory::new(16).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let history = Arc::clone(&history);
                thread::spawn(move || {
                    for i in 0..1_000u32 {
                        history.enqueue(worker * 10_000 + i);
                        assert!(history.snapshot().len() <= 16);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(history.len(), 16);
    }
}
