//! PWM regeneration engine.
//!
//! A PWM axis is a self-sustaining chain of alternating events: every
//! consumed `Forward` event spawns a `Backward` one `high_ns` later, every
//! `Backward` spawns a `Forward` one `low_ns` later. A zero duration ends the
//! chain when that phase comes up; there is no separate timer and no cancel.
//!
//! Regeneration runs for every consumed event, so one-shot events should not
//! be scheduled on an axis that carries a PWM chain.

use crate::error::{SchedError, SchedResult};
use crate::event::{AxisId, Direction, Event, Timestamp};

/// Duty-cycle configuration of one axis. `0` disables that phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PwmState {
    /// High phase duration [ns].
    pub high_ns: u64,
    /// Low phase duration [ns].
    pub low_ns: u64,
    /// A regeneration chain currently has an event in flight.
    chain_live: bool,
}

impl PwmState {
    /// Both phases disabled.
    #[inline]
    pub const fn is_idle(&self) -> bool {
        self.high_ns == 0 && self.low_ns == 0
    }

    #[inline]
    pub const fn chain_live(&self) -> bool {
        self.chain_live
    }
}

/// Outcome of [`PwmTable::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmUpdate {
    /// No chain was running: the caller must queue this bootstrap event.
    Bootstrap(Event),
    /// A chain is in flight and picks up the new durations on its next step.
    Updated,
    /// Both durations are zero and nothing is running.
    Idle,
}

/// Per-axis PWM state, indexed by [`AxisId`].
#[derive(Debug)]
pub struct PwmTable {
    slots: Vec<PwmState>,
}

impl PwmTable {
    pub fn new(max_axes: usize) -> Self {
        Self {
            slots: vec![PwmState::default(); max_axes],
        }
    }

    #[inline]
    pub fn max_axes(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, axis: AxisId) -> Option<PwmState> {
        self.slots.get(axis as usize).copied()
    }

    /// Store new durations for `axis`, deciding whether a chain must start.
    pub fn configure(
        &mut self,
        axis: AxisId,
        high_ns: u64,
        low_ns: u64,
        now: Timestamp,
    ) -> SchedResult<PwmUpdate> {
        let max_axes = self.slots.len();
        let slot = self
            .slots
            .get_mut(axis as usize)
            .ok_or(SchedError::AxisOutOfRange { axis, max_axes })?;

        slot.high_ns = high_ns;
        slot.low_ns = low_ns;

        if slot.chain_live {
            Ok(PwmUpdate::Updated)
        } else if slot.is_idle() {
            Ok(PwmUpdate::Idle)
        } else {
            slot.chain_live = true;
            Ok(PwmUpdate::Bootstrap(Event::new(now, axis, Direction::Forward)))
        }
    }

    /// Successor of a consumed event, if the phase it starts is enabled.
    ///
    /// Clears the axis' chain flag when the chain ends here.
    pub fn successor(&mut self, event: &Event) -> Option<Event> {
        let slot = self.slots.get_mut(event.axis as usize)?;
        let phase_ns = match event.direction {
            Direction::Forward => slot.high_ns,
            Direction::Backward => slot.low_ns,
        };
        if phase_ns == 0 {
            slot.chain_live = false;
            return None;
        }
        Some(Event::new(
            event.due.offset_nanos(phase_ns),
            event.axis,
            event.direction.opposite(),
        ))
    }
}
