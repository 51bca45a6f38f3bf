//! Leveled, run-once shutdown cascade.
//!
//! Handlers are registered during single-threaded setup (`&mut self`), then
//! the cascade is shared as `Arc<ExitCascade>` with every trigger source:
//! normal exit, termination signals, fatal signals and panics (see
//! [`crate::fault`]). Whoever flips the exiting flag first runs the body;
//! everyone else returns immediately.
//!
//! Levels run in ascending order, handlers within a level in registration
//! order. Put the actions that make the machine safe (heater off) at level 0.

use crate::error::{SchedError, SchedResult};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{error, info};

/// Zero-argument shutdown action.
pub type ExitHandler = Box<dyn Fn() + Send + Sync + 'static>;

/// Lifecycle of the cascade. Monotonic, never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitPhase {
    /// No trigger yet.
    Normal = 0,
    /// Body is running.
    Exiting = 1,
    /// Every handler has been invoked.
    Done = 2,
}

impl ExitPhase {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Normal,
            1 => Self::Exiting,
            _ => Self::Done,
        }
    }
}

pub struct ExitCascade {
    levels: Vec<Vec<ExitHandler>>,
    phase: AtomicU8,
}

impl ExitCascade {
    /// Create an empty cascade with `levels` priority levels.
    pub fn new(levels: usize) -> Self {
        Self {
            levels: (0..levels).map(|_| Vec::new()).collect(),
            phase: AtomicU8::new(ExitPhase::Normal as u8),
        }
    }

    /// Number of configured levels.
    #[inline]
    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    /// Handlers registered at `level` (0 for unknown levels).
    pub fn handler_count(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, Vec::len)
    }

    /// Append `handler` to `level`.
    ///
    /// # Errors
    /// `SchedError::ExitLevel` if `level >= self.levels()`; the registry is
    /// left unchanged.
    pub fn register<F>(&mut self, handler: F, level: usize) -> SchedResult<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let levels = self.levels.len();
        let slot = self
            .levels
            .get_mut(level)
            .ok_or(SchedError::ExitLevel { level, levels })?;
        slot.push(Box::new(handler));
        Ok(())
    }

    #[inline]
    pub fn phase(&self) -> ExitPhase {
        ExitPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_exiting(&self) -> bool {
        self.phase() != ExitPhase::Normal
    }

    /// Run the cascade if nobody has yet.
    ///
    /// Returns `true` if this call executed the handlers.
    ///
    /// With `panic = "unwind"` a panicking handler is logged and the cascade
    /// continues with the next one. Under `panic = "abort"` (the release
    /// profile) a panicking handler aborts the process: later handlers are
    /// skipped and the phase stays `Exiting`. Exit handlers must not panic.
    pub fn run(&self) -> bool {
        if self
            .phase
            .compare_exchange(
                ExitPhase::Normal as u8,
                ExitPhase::Exiting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        info!("Exiting: running {} exit handler levels", self.levels.len());
        for (level, handlers) in self.levels.iter().enumerate() {
            for (idx, handler) in handlers.iter().enumerate() {
                if catch_unwind(AssertUnwindSafe(|| handler())).is_err() {
                    error!("exit handler {idx} at level {level} panicked");
                }
            }
        }

        self.phase.store(ExitPhase::Done as u8, Ordering::Release);
        true
    }
}

impl std::fmt::Debug for ExitCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<usize> = self.levels.iter().map(Vec::len).collect();
        f.debug_struct("ExitCascade")
            .field("handlers_per_level", &counts)
            .field("phase", &self.phase())
            .finish()
    }
}
