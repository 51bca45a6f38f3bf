//! # EVO Event Scheduler
//!
//! Real-time actuation event scheduler for motion-control firmware.
//! Producers (the motion planner, heater/fan controllers) queue timestamped
//! events; one RT consumer thread receives them, in due-time order, exactly
//! when they are due and hands them to the hardware driver.
//!
//! ## Components
//!
//! 1. [`event`]: `Timestamp` on `CLOCK_MONOTONIC`, `Event`, `Direction`
//! 2. [`queue`]: min-heap on `(due, insertion seq)`
//! 3. [`pwm`]: self-regenerating duty-cycle chains per axis
//! 4. [`scheduler`]: the shared queue with backpressure and blocking pop
//! 5. [`rt`] / [`driver`]: RT thread setup, absolute sleep, consumer loop
//! 6. [`exit`] / [`fault`]: run-once leveled shutdown cascade and its
//!    signal, `atexit` and panic triggers
//!
//! ## Example
//!
//! ```rust,no_run
//! use evo_scheduler::prelude::*;
//! use std::sync::Arc;
//!
//! let sched = Arc::new(Scheduler::with_limits(512, 16));
//! sched.schedule_pwm(3, 100_000, 50_000)?;
//! let next = sched.next_event();
//! println!("{next}");
//! # Ok::<(), SchedError>(())
//! ```

pub mod driver;
pub mod error;
pub mod event;
pub mod exit;
pub mod fault;
pub mod pwm;
pub mod queue;
pub mod rt;
pub mod scheduler;

pub mod prelude {
    pub use crate::driver::{ActuatorDriver, ConsumerStats, SimulationDriver, spawn_consumer};
    pub use crate::error::{SchedError, SchedResult};
    pub use crate::event::{AxisId, Direction, Event, Timestamp};
    pub use crate::exit::{ExitCascade, ExitPhase};
    pub use crate::fault::FaultGuard;
    pub use crate::scheduler::Scheduler;
}
