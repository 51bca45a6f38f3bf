//! Consumer-thread real-time setup and absolute-time sleeping.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`: only with the `rt` feature.
//! 2. `sched_setaffinity`: pin to the configured CPU core, if any.
//! 3. `pthread_setschedparam(SCHED_FIFO, priority)` on the calling thread.
//!
//! Every step is best effort: a failure is logged and the thread keeps
//! running at whatever class it has.
//!
//! ## Sleeping
//! `clock_nanosleep(CLOCK_MONOTONIC, TIMER_ABSTIME)` against the event's due
//! time, so loop overhead never accumulates as drift.

use crate::error::{SchedError, SchedResult};
use crate::event::Timestamp;
use evo_common::config::RtConfig;
use nix::errno::Errno;
use nix::time::{ClockId, ClockNanosleepFlags, clock_nanosleep};
use tracing::{info, warn};

/// Which RT setup steps took effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtReport {
    pub memory_locked: bool,
    pub affinity_set: bool,
    pub fifo_priority: Option<i32>,
}

impl RtReport {
    /// The thread runs under `SCHED_FIFO`.
    pub fn is_realtime(&self) -> bool {
        self.fifo_priority.is_some()
    }
}

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
fn rt_mlockall() -> SchedResult<()> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| SchedError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> SchedResult<()> {
    Err(SchedError::RtSetup(
        "memory locking requires the `rt` feature".to_string(),
    ))
}

/// Pin the calling thread to a CPU core.
fn rt_set_affinity(cpu: usize) -> SchedResult<()> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| SchedError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| SchedError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

/// Move the calling thread to `SCHED_FIFO` with the given priority.
fn rt_set_fifo(priority: i32) -> SchedResult<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pthread_self() is always valid.
    let ret =
        unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if ret != 0 {
        return Err(SchedError::RtSetup(format!(
            "pthread_setschedparam(SCHED_FIFO, {priority}) failed: {}",
            Errno::from_raw(ret)
        )));
    }
    Ok(())
}

/// Raise the calling (consumer) thread to real-time scheduling.
///
/// Never fails: each step that cannot be applied is logged as a warning and
/// skipped.
pub fn configure_realtime_priority(config: &RtConfig) -> RtReport {
    let mut report = RtReport::default();

    if config.lock_memory {
        match rt_mlockall() {
            Ok(()) => report.memory_locked = true,
            Err(e) => warn!("{e}; continuing with pageable memory"),
        }
    }

    if let Some(cpu) = config.cpu_core {
        match rt_set_affinity(cpu) {
            Ok(()) => report.affinity_set = true,
            Err(e) => warn!("{e}; continuing unpinned"),
        }
    }

    match rt_set_fifo(config.priority) {
        Ok(()) => report.fifo_priority = Some(config.priority),
        Err(e) => warn!("{e}; continuing at default priority"),
    }

    info!(
        "Consumer RT setup: fifo={:?}, pinned={}, mlocked={}",
        report.fifo_priority, report.affinity_set, report.memory_locked
    );
    report
}

/// Sleep the calling thread until `target` on `CLOCK_MONOTONIC`.
///
/// Returns immediately when `target` is already past. Signal interruptions
/// re-enter the sleep with the same absolute deadline.
pub fn sleep_until(target: Timestamp) {
    let deadline = target.to_timespec();
    loop {
        match clock_nanosleep(
            ClockId::CLOCK_MONOTONIC,
            ClockNanosleepFlags::TIMER_ABSTIME,
            &deadline,
        ) {
            Ok(_) => return,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                warn!("clock_nanosleep until {target} failed: {e}");
                return;
            }
        }
    }
}
