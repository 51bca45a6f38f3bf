//! Hardware-facing side: the actuator driver trait and the RT consumer loop.
//!
//! The consumer thread raises itself to real-time priority once, then loops
//! on [`Scheduler::next_event`] and hands every due event to an
//! [`ActuatorDriver`]. The loop never returns; the process ends through the
//! exit cascade.

use crate::event::{AxisId, Direction, Event, Timestamp};
use crate::rt::configure_realtime_priority;
use crate::scheduler::Scheduler;
use evo_common::config::RtConfig;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use tracing::{info, trace};

/// Consumer of due events (GPIO, stepper pulse generator, simulation).
pub trait ActuatorDriver: Send + 'static {
    /// Driver identifier for logs.
    fn name(&self) -> &'static str;

    /// Act on an event at (or just after) its due time.
    fn actuate(&mut self, event: &Event);
}

/// O(1) lateness statistics of the consumer loop.
///
/// Lateness is the time between an event's due time and the moment the
/// consumer woke for it. Lock-free so the exit cascade can read it.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    events: AtomicU64,
    sum_lateness_ns: AtomicU64,
    max_lateness_ns: AtomicU64,
}

impl ConsumerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one delivered event.
    #[inline]
    pub fn record(&self, lateness_ns: u64) {
        self.events.fetch_add(1, Ordering::Relaxed);
        self.sum_lateness_ns.fetch_add(lateness_ns, Ordering::Relaxed);
        self.max_lateness_ns.fetch_max(lateness_ns, Ordering::Relaxed);
    }

    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn max_lateness_ns(&self) -> u64 {
        self.max_lateness_ns.load(Ordering::Relaxed)
    }

    /// Average lateness [ns] (0 if no events).
    pub fn avg_lateness_ns(&self) -> u64 {
        match self.events() {
            0 => 0,
            n => self.sum_lateness_ns.load(Ordering::Relaxed) / n,
        }
    }
}

/// Spawn the RT consumer thread.
///
/// The thread applies `rt` to itself, then delivers events to `driver`
/// forever.
pub fn spawn_consumer<D: ActuatorDriver>(
    scheduler: Arc<Scheduler>,
    mut driver: D,
    rt: RtConfig,
    stats: Arc<ConsumerStats>,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("evo-sched-rt".to_string())
        .spawn(move || {
            configure_realtime_priority(&rt);
            info!("Consumer loop started (driver={})", driver.name());
            loop {
                let event = scheduler.next_event();
                stats.record(Timestamp::now().nanos_since(event.due));
                driver.actuate(&event);
            }
        })
}

/// Output line of one simulated axis.
#[derive(Debug, Default)]
struct SimPin {
    high: AtomicBool,
    toggles: AtomicU64,
}

/// Simulated output levels, shared between the driver and shutdown handlers.
#[derive(Debug)]
pub struct SimOutputs {
    pins: Vec<SimPin>,
}

impl SimOutputs {
    pub fn new(axes: usize) -> Self {
        Self {
            pins: (0..axes).map(|_| SimPin::default()).collect(),
        }
    }

    /// Current level of `axis` (`false` for unknown axes).
    pub fn is_high(&self, axis: AxisId) -> bool {
        self.pins
            .get(axis as usize)
            .is_some_and(|p| p.high.load(Ordering::Acquire))
    }

    /// Number of level changes seen on `axis`.
    pub fn toggles(&self, axis: AxisId) -> u64 {
        self.pins
            .get(axis as usize)
            .map_or(0, |p| p.toggles.load(Ordering::Relaxed))
    }

    fn set(&self, axis: AxisId, high: bool) {
        if let Some(pin) = self.pins.get(axis as usize) {
            if pin.high.swap(high, Ordering::AcqRel) != high {
                pin.toggles.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drive every output low. Safe to call from the exit cascade.
    pub fn all_low(&self) {
        for pin in &self.pins {
            pin.high.store(false, Ordering::Release);
        }
    }
}

/// Driver that records output levels instead of touching GPIO.
///
/// `Forward` drives the axis high, `Backward` drives it low.
#[derive(Debug, Clone)]
pub struct SimulationDriver {
    outputs: Arc<SimOutputs>,
}

impl SimulationDriver {
    pub fn new(axes: usize) -> Self {
        Self {
            outputs: Arc::new(SimOutputs::new(axes)),
        }
    }

    /// Handle on the simulated outputs.
    pub fn outputs(&self) -> Arc<SimOutputs> {
        self.outputs.clone()
    }
}

impl ActuatorDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn actuate(&mut self, event: &Event) {
        trace!("actuate {event}");
        self.outputs
            .set(event.axis, event.direction == Direction::Forward);
    }
}
