//! The scheduler: time-ordered queue, PWM regeneration and backpressure
//! behind one lock.
//!
//! ## Concurrency
//! One `parking_lot::Mutex` guards the [`EventQueue`] and the [`PwmTable`].
//! Two condition variables hang off it:
//! - `not_empty`: the consumer waits here in [`Scheduler::take_next`];
//!   every insert wakes exactly one waiter.
//! - `not_full`: producers wait here in [`Scheduler::schedule`] while the
//!   queue holds `capacity` or more events; every pop that leaves the queue
//!   below capacity wakes them.
//!
//! PWM successors are inserted by the consumer inside its critical section
//! and never wait on `not_full`, so the queue may briefly exceed capacity.
//! No event is ever rejected.

use crate::error::SchedResult;
use crate::event::{AxisId, Event, Timestamp};
use crate::pwm::{PwmState, PwmTable, PwmUpdate};
use crate::queue::EventQueue;
use crate::rt;
use evo_common::config::QueueConfig;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace};

struct Inner {
    queue: EventQueue,
    pwm: PwmTable,
}

/// Real-time actuation event scheduler.
///
/// Shared between producers (planner, PWM users) and the single consumer
/// thread, typically as `Arc<Scheduler>`.
pub struct Scheduler {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: AtomicUsize,
}

impl Scheduler {
    /// Create a scheduler sized from the `[scheduler]` config section.
    pub fn new(config: &QueueConfig) -> Self {
        Self::with_limits(config.capacity, config.max_axes)
    }

    /// Create a scheduler with an explicit backpressure capacity and number
    /// of PWM-capable axes.
    pub fn with_limits(capacity: usize, max_axes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: EventQueue::with_capacity(capacity),
                pwm: PwmTable::new(max_axes),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: AtomicUsize::new(capacity),
        }
    }

    /// Block while the queue is at or above capacity.
    fn wait_not_full(&self, inner: &mut MutexGuard<'_, Inner>) {
        while inner.queue.len() >= self.capacity() {
            self.not_full.wait(inner);
        }
    }

    fn insert_locked(&self, inner: &mut MutexGuard<'_, Inner>, event: Event) {
        inner.queue.insert(event);
        trace!("queued {event} (len={})", inner.queue.len());
        self.not_empty.notify_one();
    }

    /// Queue a one-shot actuation event.
    ///
    /// Blocks while the backpressure gate is closed.
    pub fn schedule(&self, event: Event) {
        let mut inner = self.inner.lock();
        self.wait_not_full(&mut inner);
        self.insert_locked(&mut inner, event);
    }

    /// (Re)configure duty-cycle oscillation on `axis`.
    ///
    /// Starts a new chain with a `Forward` event due now when none is
    /// running; otherwise the running chain picks up the new durations at
    /// its next step. A zero duration stops the chain when that phase
    /// comes up.
    pub fn schedule_pwm(&self, axis: AxisId, high_ns: u64, low_ns: u64) -> SchedResult<()> {
        let mut inner = self.inner.lock();
        let update = inner.pwm.configure(axis, high_ns, low_ns, Timestamp::now())?;
        debug!("PWM axis {axis}: high={high_ns}ns low={low_ns}ns -> {update:?}");
        if let PwmUpdate::Bootstrap(event) = update {
            self.wait_not_full(&mut inner);
            self.insert_locked(&mut inner, event);
        }
        Ok(())
    }

    /// Remove the next event without sleeping until its due time.
    ///
    /// Blocks while the queue is empty, queues the PWM successor of the
    /// removed event and re-evaluates the backpressure gate.
    pub fn take_next(&self) -> Event {
        let mut inner = self.inner.lock();
        let event = loop {
            if let Some(event) = inner.queue.pop_min() {
                break event;
            }
            self.not_empty.wait(&mut inner);
        };

        if let Some(next) = inner.pwm.successor(&event) {
            self.insert_locked(&mut inner, next);
        }

        if inner.queue.len() < self.capacity() {
            self.not_full.notify_all();
        }
        event
    }

    /// Block until the next event is due and return it.
    ///
    /// Intended for the single RT consumer thread. The absolute sleep is
    /// not cancellable.
    pub fn next_event(&self) -> Event {
        let event = self.take_next();
        rt::sleep_until(event.due);
        event
    }

    /// Set the backpressure threshold. Takes effect at the next gate
    /// evaluation; already queued events are untouched.
    pub fn set_capacity(&self, capacity: usize) {
        debug!("capacity -> {capacity}");
        self.capacity.store(capacity, Ordering::Release);
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Latest due time currently queued, or now when the queue is empty.
    ///
    /// Lets a producer see how far ahead scheduling already reaches.
    pub fn last_scheduled_time(&self) -> Timestamp {
        let horizon = self.inner.lock().queue.horizon();
        horizon.unwrap_or_else(Timestamp::now)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// Snapshot of an axis' PWM configuration.
    pub fn pwm_state(&self, axis: AxisId) -> Option<PwmState> {
        self.inner.lock().pwm.get(axis)
    }

    pub fn max_axes(&self) -> usize {
        self.inner.lock().pwm.max_axes()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
