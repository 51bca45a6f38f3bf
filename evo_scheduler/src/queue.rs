//! Time-ordered event storage.
//!
//! A min-heap on `(due, seq)` where `seq` is a per-queue insertion counter,
//! so events with equal due times come out in the order they were inserted.
//! The queue itself is not synchronized; [`crate::scheduler::Scheduler`]
//! owns it behind its mutex.

use crate::event::{Event, Timestamp};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
struct Entry {
    seq: u64,
    event: Event,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: earliest due first, then lowest seq.
        other
            .event
            .due
            .cmp(&self.event.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Ordered multiset of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    /// Latest due time among queued events.
    horizon: Option<Timestamp>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the heap (typically to the backpressure capacity).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Add an event. O(log n).
    pub fn insert(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.horizon = Some(match self.horizon {
            Some(h) if h >= event.due => h,
            _ => event.due,
        });
        self.heap.push(Entry { seq, event });
    }

    /// Remove and return the earliest event. O(log n).
    pub fn pop_min(&mut self) -> Option<Event> {
        let entry = self.heap.pop()?;
        if self.heap.is_empty() {
            self.horizon = None;
        }
        Some(entry.event)
    }

    /// Earliest event without removing it.
    pub fn peek_min(&self) -> Option<&Event> {
        self.heap.peek().map(|e| &e.event)
    }

    /// Latest due time currently queued, `None` when empty.
    ///
    /// Only the minimum is ever removed, so the running maximum stays exact
    /// until the queue drains.
    #[inline]
    pub fn horizon(&self) -> Option<Timestamp> {
        self.horizon
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Direction;

    fn ev(ns: u64, axis: u8) -> Event {
        Event::new(Timestamp::from_nanos(ns), axis, Direction::Forward)
    }

    #[test]
    fn pops_in_due_order() {
        let mut q = EventQueue::new();
        for ns in [50, 10, 40, 30, 20] {
            q.insert(ev(ns, 0));
        }
        let order: Vec<u64> = std::iter::from_fn(|| q.pop_min())
            .map(|e| e.due.as_nanos())
            .collect();
        assert_eq!(order, vec![10, 20, 30, 40, 50]);
        assert!(q.is_empty());
    }

    #[test]
    fn equal_due_is_fifo() {
        let mut q = EventQueue::new();
        for axis in 0..5 {
            q.insert(ev(100, axis));
        }
        q.insert(ev(50, 9));
        assert_eq!(q.pop_min().unwrap().axis, 9);
        for axis in 0..5 {
            assert_eq!(q.pop_min().unwrap().axis, axis);
        }
    }

    #[test]
    fn horizon_tracks_latest_due() {
        let mut q = EventQueue::with_capacity(4);
        assert_eq!(q.horizon(), None);
        q.insert(ev(30, 0));
        q.insert(ev(90, 0));
        q.insert(ev(60, 0));
        assert_eq!(q.horizon(), Some(Timestamp::from_nanos(90)));
        q.pop_min();
        q.pop_min();
        assert_eq!(q.horizon(), Some(Timestamp::from_nanos(90)));
        q.pop_min();
        assert_eq!(q.horizon(), None);
    }

    #[test]
    fn peek_matches_pop() {
        let mut q = EventQueue::new();
        q.insert(ev(7, 1));
        q.insert(ev(3, 2));
        assert_eq!(q.peek_min().map(|e| e.axis), Some(2));
        assert_eq!(q.pop_min().map(|e| e.axis), Some(2));
        assert_eq!(q.len(), 1);
    }
}
