//! Backpressure tests.
//!
//! With capacity `C`, `C` inserts go through, the next one blocks until the
//! consumer pops the queue below `C`. Nothing is ever dropped.

use evo_scheduler::event::{Direction, Event, Timestamp};
use evo_scheduler::scheduler::Scheduler;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const SETTLE: Duration = Duration::from_millis(100);

fn at(ns: u64) -> Event {
    Event::new(Timestamp::from_nanos(ns), 0, Direction::Forward)
}

/// Spawn a producer that flags when its `schedule` call returned.
fn spawn_producer(sched: &Arc<Scheduler>, ns: u64) -> (thread::JoinHandle<()>, Arc<AtomicBool>) {
    let done = Arc::new(AtomicBool::new(false));
    let handle = {
        let sched = sched.clone();
        let done = done.clone();
        thread::spawn(move || {
            sched.schedule(at(ns));
            done.store(true, Ordering::SeqCst);
        })
    };
    (handle, done)
}

#[test]
fn insert_beyond_capacity_blocks_until_pop() {
    const C: usize = 4;
    let sched = Arc::new(Scheduler::with_limits(C, 1));
    for ns in 0..C as u64 {
        sched.schedule(at(ns));
    }
    assert_eq!(sched.len(), C);

    let (producer, done) = spawn_producer(&sched, 100);
    thread::sleep(SETTLE);
    assert!(!done.load(Ordering::SeqCst), "C+1-th insert must block");
    assert_eq!(sched.len(), C);

    assert_eq!(sched.take_next().due.as_nanos(), 0);
    producer.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(sched.len(), C);
}

#[test]
fn no_event_is_dropped_under_pressure() {
    const C: usize = 2;
    const TOTAL: u64 = 200;
    let sched = Arc::new(Scheduler::with_limits(C, 1));

    let producer = {
        let sched = sched.clone();
        thread::spawn(move || {
            for ns in 0..TOTAL {
                sched.schedule(at(ns));
            }
        })
    };

    let mut seen = Vec::new();
    for _ in 0..TOTAL {
        seen.push(sched.take_next().due.as_nanos());
        assert!(sched.len() <= C);
    }
    producer.join().unwrap();

    seen.sort_unstable();
    assert_eq!(seen, (0..TOTAL).collect::<Vec<_>>());
}

#[test]
fn capacity_change_is_not_retroactive() {
    let sched = Arc::new(Scheduler::with_limits(8, 1));
    for ns in 0..6 {
        sched.schedule(at(ns));
    }

    // Lowering capacity keeps the six queued events.
    sched.set_capacity(3);
    assert_eq!(sched.capacity(), 3);
    assert_eq!(sched.len(), 6);

    let (producer, done) = spawn_producer(&sched, 50);
    thread::sleep(SETTLE);
    assert!(!done.load(Ordering::SeqCst));

    // 6 -> 5 -> 4 -> 3: still not below the new capacity.
    for _ in 0..3 {
        sched.take_next();
    }
    thread::sleep(SETTLE);
    assert!(!done.load(Ordering::SeqCst));

    // 3 -> 2 opens the gate.
    sched.take_next();
    producer.join().unwrap();
    assert_eq!(sched.len(), 3);
}

#[test]
fn raised_capacity_applies_at_next_pop() {
    let sched = Arc::new(Scheduler::with_limits(2, 1));
    sched.schedule(at(0));
    sched.schedule(at(1));

    let (producer, done) = spawn_producer(&sched, 10);
    thread::sleep(SETTLE);
    assert!(!done.load(Ordering::SeqCst));

    sched.set_capacity(10);
    sched.take_next();
    producer.join().unwrap();
    assert!(done.load(Ordering::SeqCst));

    // New producers see the raised threshold immediately.
    for ns in 20..25 {
        sched.schedule(at(ns));
    }
    assert_eq!(sched.len(), 7);
}

#[test]
fn pwm_successor_never_blocks_consumer() {
    let sched = Scheduler::with_limits(1, 2);
    sched.schedule_pwm(1, 1_000, 1_000).unwrap();
    // Queue is at capacity; popping must still regenerate the next edge.
    for _ in 0..10 {
        sched.take_next();
        assert_eq!(sched.len(), 1);
    }
}
