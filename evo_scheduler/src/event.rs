//! Actuation events and the monotonic timestamps they are ordered by.
//!
//! All due times live in the `CLOCK_MONOTONIC` domain so that wall-clock
//! jumps (NTP, manual adjustment) never reorder or stall the queue.

use evo_common::consts::NANOS_PER_SEC;
use nix::sys::time::TimeSpec;
use nix::time::{ClockId, clock_gettime};
use std::fmt;

/// Index of one actuation channel (stepper, heater, fan).
pub type AxisId = u8;

/// Point on the `CLOCK_MONOTONIC` timeline [ns].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Clock origin.
    pub const ZERO: Self = Self(0);

    /// Build from raw nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Raw nanoseconds since the clock origin.
    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Current monotonic time.
    ///
    /// `CLOCK_MONOTONIC` cannot fail on Linux; should it ever, the clock
    /// origin is returned, which makes the event due immediately.
    pub fn now() -> Self {
        clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map(Self::from_timespec)
            .unwrap_or(Self::ZERO)
    }

    /// Convert a `TimeSpec`. Negative components clamp to zero.
    pub fn from_timespec(ts: TimeSpec) -> Self {
        let secs = ts.tv_sec().max(0) as u64;
        let nanos = ts.tv_nsec().max(0) as u64;
        Self(secs.saturating_mul(NANOS_PER_SEC).saturating_add(nanos))
    }

    /// Absolute `TimeSpec` for `clock_nanosleep(TIMER_ABSTIME)`.
    pub fn to_timespec(self) -> TimeSpec {
        TimeSpec::new(
            (self.0 / NANOS_PER_SEC) as libc::time_t,
            (self.0 % NANOS_PER_SEC) as libc::c_long,
        )
    }

    /// This timestamp shifted forward by `ns`, saturating at `u64::MAX`.
    #[inline]
    #[must_use]
    pub const fn offset_nanos(self, ns: u64) -> Self {
        Self(self.0.saturating_add(ns))
    }

    /// Nanoseconds from `earlier` to `self`, zero if `earlier` is later.
    #[inline]
    pub const fn nanos_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0 / NANOS_PER_SEC, self.0 % NANOS_PER_SEC)
    }
}

/// Step direction, doubling as the PWM phase marker.
///
/// For PWM axes `Forward` starts a high phase and `Backward` starts a low phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// One timestamped actuation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    /// When the driver must act.
    pub due: Timestamp,
    /// Channel to actuate.
    pub axis: AxisId,
    /// What to do on that channel.
    pub direction: Direction,
}

impl Event {
    #[inline]
    pub const fn new(due: Timestamp, axis: AxisId, direction: Direction) -> Self {
        Self {
            due,
            axis,
            direction,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "axis {} {:?} @ {}", self.axis, self.direction, self.due)
    }
}
