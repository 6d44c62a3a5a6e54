// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! Bounded FIFO record buffer with drop-oldest eviction.
//!
//! The buffer is the single shared data structure between producers and the
//! background worker. It is not synchronized itself; the processor wraps it
//! in a mutex and keeps every critical section free of I/O.
//!
//! Overflow favors fresh data: when a push would exceed capacity, the oldest
//! entry is evicted. Re-queued batches (from a timed-out flush) go back to
//! the front because they are older than anything queued behind them, and
//! the same bound applies afterwards.

use std::collections::VecDeque;

/// FIFO queue of exportable snapshots, capacity-bounded by `max_queue_size`.
#[derive(Debug)]
pub struct RecordBuffer<T> {
    items: VecDeque<T>,
    max_queue_size: usize,
}

impl<T> RecordBuffer<T> {
    /// Creates an empty buffer. `max_queue_size` must be non-zero; the
    /// processor validates this at construction.
    #[must_use]
    pub fn new(max_queue_size: usize) -> Self {
        RecordBuffer {
            items: VecDeque::new(),
            max_queue_size,
        }
    }

    /// Appends an item, evicting the oldest entry first when full.
    ///
    /// Returns the number of evicted items (0 or 1) so the caller can count
    /// and report drops.
    pub fn push(&mut self, item: T) -> usize {
        let mut dropped = 0;
        if self.items.len() >= self.max_queue_size {
            self.items.pop_front();
            dropped = 1;
        }
        self.items.push_back(item);
        dropped
    }

    /// Removes up to `max` items from the front, in arrival order.
    pub fn take_batch(&mut self, max: usize) -> Vec<T> {
        let n = max.min(self.items.len());
        self.items.drain(..n).collect()
    }

    /// Returns unexported items to the front in their original relative
    /// order, then re-applies the capacity bound (evicting from the front,
    /// since the re-queued items are the oldest).
    ///
    /// Returns the number of items evicted to stay within capacity.
    pub fn requeue_front(&mut self, batch: Vec<T>) -> usize {
        for item in batch.into_iter().rev() {
            self.items.push_front(item);
        }
        let mut dropped = 0;
        while self.items.len() > self.max_queue_size {
            self.items.pop_front();
            dropped += 1;
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn push_within_capacity_drops_nothing() {
        let mut buffer = RecordBuffer::new(3);
        assert_eq!(buffer.push(1), 0);
        assert_eq!(buffer.push(2), 0);
        assert_eq!(buffer.push(3), 0);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn push_over_capacity_evicts_oldest() {
        let mut buffer = RecordBuffer::new(3);
        for i in 1..=5 {
            buffer.push(i);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.take_batch(3), vec![3, 4, 5]);
    }

    #[test]
    fn take_batch_preserves_fifo_order() {
        let mut buffer = RecordBuffer::new(10);
        for i in 0..6 {
            buffer.push(i);
        }
        assert_eq!(buffer.take_batch(4), vec![0, 1, 2, 3]);
        assert_eq!(buffer.take_batch(4), vec![4, 5]);
        assert!(buffer.take_batch(4).is_empty());
    }

    #[test]
    fn take_batch_respects_max() {
        let mut buffer = RecordBuffer::new(10);
        for i in 0..10 {
            buffer.push(i);
        }
        assert_eq!(buffer.take_batch(3).len(), 3);
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn requeue_front_restores_original_order() {
        let mut buffer = RecordBuffer::new(10);
        for i in 0..6 {
            buffer.push(i);
        }
        let batch = buffer.take_batch(3);
        assert_eq!(batch, vec![0, 1, 2]);

        assert_eq!(buffer.requeue_front(batch), 0);
        assert_eq!(buffer.take_batch(6), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn requeue_front_applies_capacity_bound() {
        let mut buffer = RecordBuffer::new(4);
        for i in 0..4 {
            buffer.push(i);
        }
        let batch = buffer.take_batch(2); // [0, 1], buffer = [2, 3]
        buffer.push(4);
        buffer.push(5); // buffer = [2, 3, 4, 5], full again

        // Re-queue the two oldest: the bound evicts them right back out,
        // because they are the oldest entries.
        assert_eq!(buffer.requeue_front(batch), 2);
        assert_eq!(buffer.take_batch(4), vec![2, 3, 4, 5]);
    }

    proptest! {
        // Capacity invariant: however many pushes happen, the buffer never
        // observably exceeds its bound, the reported drop count matches the
        // overflow, and the survivors are the most recent entries.
        #[test]
        fn capacity_invariant_holds(capacity in 1usize..64, pushes in 0usize..256) {
            let mut buffer = RecordBuffer::new(capacity);
            let mut dropped = 0;
            for i in 0..pushes {
                dropped += buffer.push(i);
                prop_assert!(buffer.len() <= capacity);
            }
            prop_assert_eq!(dropped, pushes.saturating_sub(capacity));

            let survivors = buffer.take_batch(capacity);
            let expected: Vec<usize> =
                (pushes.saturating_sub(capacity)..pushes).collect();
            prop_assert_eq!(survivors, expected);
        }
    }
}
