//! Heap-order delivery tests.
//!
//! Whatever the insertion order or producer interleaving, `take_next`
//! always yields the earliest queued due time, and equal due times come
//! out in insertion order.

use evo_scheduler::event::{Direction, Event, Timestamp};
use evo_scheduler::scheduler::Scheduler;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

/// Axis with no PWM configuration, so nothing is regenerated.
const PLAIN_AXIS: u8 = 0;

fn at(ns: u64) -> Event {
    Event::new(Timestamp::from_nanos(ns), PLAIN_AXIS, Direction::Forward)
}

proptest! {
    #[test]
    fn take_next_yields_sorted_due_times(dues in prop::collection::vec(0u64..10_000, 1..200)) {
        let sched = Scheduler::with_limits(dues.len() + 1, 1);
        for &ns in &dues {
            sched.schedule(at(ns));
        }

        let mut expected = dues.clone();
        expected.sort_unstable();
        let delivered: Vec<u64> = (0..dues.len())
            .map(|_| sched.take_next().due.as_nanos())
            .collect();
        prop_assert_eq!(delivered, expected);
        prop_assert!(sched.is_empty());
    }

    #[test]
    fn interleaved_insert_and_pop_keeps_min(
        ops in prop::collection::vec(prop::option::of(0u64..1_000), 1..300)
    ) {
        let sched = Scheduler::with_limits(1_000, 1);
        let mut model: Vec<u64> = Vec::new();
        for op in ops {
            match op {
                Some(ns) => {
                    sched.schedule(at(ns));
                    model.push(ns);
                }
                None if !model.is_empty() => {
                    let min_idx = model
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, v)| **v)
                        .map(|(i, _)| i)
                        .unwrap();
                    let expected = model.swap_remove(min_idx);
                    prop_assert_eq!(sched.take_next().due.as_nanos(), expected);
                }
                None => {}
            }
        }
        prop_assert_eq!(sched.len(), model.len());
    }
}

#[test]
fn equal_due_times_are_fifo() {
    let sched = Scheduler::with_limits(16, 8);
    for axis in 0..8u8 {
        sched.schedule(Event::new(Timestamp::from_nanos(42), axis, Direction::Backward));
    }
    for axis in 0..8u8 {
        assert_eq!(sched.take_next().axis, axis);
    }
}

#[test]
fn concurrent_producers_deliver_in_order() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 250;

    let sched = Arc::new(Scheduler::with_limits(10_000, 1));
    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let sched = sched.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    // Interleaved, unsorted due times across producers.
                    let ns = (i * 7919 + p * 104_729) % 100_000;
                    sched.schedule(at(ns));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = (PRODUCERS * PER_PRODUCER) as usize;
    assert_eq!(sched.len(), total);

    let mut last = 0;
    for _ in 0..total {
        let due = sched.take_next().due.as_nanos();
        assert!(due >= last, "out of order: {due} after {last}");
        last = due;
    }
}

#[test]
fn blocked_consumer_wakes_on_insert() {
    let sched = Arc::new(Scheduler::with_limits(8, 1));
    let consumer = {
        let sched = sched.clone();
        thread::spawn(move || sched.take_next())
    };

    thread::sleep(std::time::Duration::from_millis(50));
    assert!(!consumer.is_finished());

    sched.schedule(at(123));
    let event = consumer.join().unwrap();
    assert_eq!(event.due.as_nanos(), 123);
}
