//! Exit cascade concurrency tests.
//!
//! Three independent trigger contexts race on `run()`; every handler's side
//! effect must be observed exactly once.

use evo_scheduler::error::SchedError;
use evo_scheduler::exit::{ExitCascade, ExitPhase};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn concurrent_triggers_run_each_handler_once() {
    for _ in 0..50 {
        let counters: Arc<Vec<AtomicUsize>> =
            Arc::new((0..6).map(|_| AtomicUsize::new(0)).collect());
        let mut cascade = ExitCascade::new(3);
        for i in 0..6 {
            let counters = counters.clone();
            cascade
                .register(
                    move || {
                        counters[i].fetch_add(1, Ordering::SeqCst);
                    },
                    i % 3,
                )
                .unwrap();
        }
        let cascade = Arc::new(cascade);

        let barrier = Arc::new(Barrier::new(3));
        let triggers: Vec<_> = (0..3)
            .map(|_| {
                let cascade = cascade.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cascade.run()
                })
            })
            .collect();
        let winners = triggers
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|ran| *ran)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(cascade.phase(), ExitPhase::Done);
        for c in counters.iter() {
            assert_eq!(c.load(Ordering::SeqCst), 1);
        }
    }
}

#[test]
fn levels_run_before_higher_levels_across_registration() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut cascade = ExitCascade::new(3);

    let push = |tag: &'static str| {
        let order = order.clone();
        move || order.lock().push(tag)
    };
    cascade.register(push("release motor holds"), 2).unwrap();
    cascade.register(push("heater off"), 0).unwrap();
    cascade.register(push("fan off"), 1).unwrap();
    cascade.register(push("bed off"), 0).unwrap();

    cascade.run();
    assert_eq!(
        *order.lock(),
        vec!["heater off", "bed off", "fan off", "release motor holds"]
    );
}

#[test]
fn register_beyond_max_depth_fails() {
    let mut cascade = ExitCascade::new(3);
    cascade.register(|| {}, 1).unwrap();

    let err = cascade.register(|| {}, 3).unwrap_err();
    assert!(matches!(err, SchedError::ExitLevel { level: 3, levels: 3 }));
    assert_eq!(err.to_string(), "Exit handler level 3 out of range (levels = 3)");

    assert_eq!(cascade.handler_count(0), 0);
    assert_eq!(cascade.handler_count(1), 1);
    assert_eq!(cascade.handler_count(2), 0);
}

#[test]
fn phase_is_monotonic() {
    let cascade = ExitCascade::new(1);
    assert_eq!(cascade.phase(), ExitPhase::Normal);
    assert!(!cascade.is_exiting());
    cascade.run();
    assert_eq!(cascade.phase(), ExitPhase::Done);
    cascade.run();
    assert_eq!(cascade.phase(), ExitPhase::Done);
    assert!(cascade.is_exiting());
}
