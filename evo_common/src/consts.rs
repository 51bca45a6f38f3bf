//! System-wide constants for the EVO scheduler workspace.
//!
//! Single source of truth for all numeric limits and defaults.
//! Imported by all crates: no duplication permitted.

use static_assertions::const_assert;

/// Maximum number of axes addressable by the scheduler (PWM table size).
pub const MAX_AXES: usize = 64;

/// Default number of axes enabled when the config does not say otherwise.
pub const DEFAULT_AXES: usize = 16;

/// Default backpressure threshold (queued events before producers block).
pub const DEFAULT_CAPACITY: usize = 512;

/// Default number of exit handler levels.
pub const DEFAULT_EXIT_LEVELS: usize = 3;

/// Upper bound for configurable exit handler levels.
pub const MAX_EXIT_LEVELS: usize = 16;

/// Default `SCHED_FIFO` priority of the consumer thread.
pub const DEFAULT_RT_PRIORITY: i32 = 80;

/// Valid `SCHED_FIFO` priority range on Linux.
pub const RT_PRIORITY_MIN: i32 = 1;
/// Valid `SCHED_FIFO` priority range on Linux.
pub const RT_PRIORITY_MAX: i32 = 99;

/// How long a thread parked in a fatal signal handler waits for the
/// exit cascade before forcing `_exit` [ms].
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/evo/scheduler.toml";

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

const_assert!(DEFAULT_AXES <= MAX_AXES);
const_assert!(MAX_AXES <= u8::MAX as usize + 1);
const_assert!(DEFAULT_EXIT_LEVELS <= MAX_EXIT_LEVELS);
const_assert!(DEFAULT_CAPACITY > 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(MAX_AXES > 0 && MAX_AXES <= 256);
        assert!(DEFAULT_AXES > 0);
        assert!(DEFAULT_EXIT_LEVELS > 0);
        assert!((RT_PRIORITY_MIN..=RT_PRIORITY_MAX).contains(&DEFAULT_RT_PRIORITY));
        assert!(DEFAULT_SHUTDOWN_TIMEOUT_MS > 0);
    }
}
