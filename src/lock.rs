use bitflags::bitflags;
use log::debug;
use std::collections::HashMap;

use gnss::prelude::SV;
use hifitime::Epoch;

bitflags! {
    /// Loss of lock indicator, RINEX compatible bits
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct LliFlags: u8 {
        /// Carrier phase continuity lost
        const SLIP = 0x01;
        /// Half cycle ambiguity not resolved
        const HALF_CYCLE = 0x02;
        /// Half cycle correction applied by the receiver
        const HALF_ADDED = 0x40;
    }
}

/// Lock time interpretation, specific to each receiver family
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockParams {
    /// Tolerance applied to the expected lock time growth [s]
    pub slack: f64,
    /// Lock time value at which the receiver counter saturates [s]
    pub saturation: Option<f64>,
}

impl LockParams {
    pub const fn new(slack: f64, saturation: Option<f64>) -> Self {
        Self { slack, saturation }
    }
}

impl Default for LockParams {
    fn default() -> Self {
        Self::new(0.05, None)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LockState {
    /// Last lock time and when it was observed
    lock: Option<(f64, Epoch)>,
    /// Last half cycle flag
    half_cycle: Option<bool>,
}

/// Tracks carrier phase continuity, per satellite, frequency slot
/// and signal code. Signals competing for one slot keep their own counters.
#[derive(Debug, Clone, Default)]
pub struct LockTracker {
    params: LockParams,
    states: HashMap<(SV, usize, &'static str), LockState>,
}

impl LockTracker {
    pub fn new(params: LockParams) -> Self {
        Self {
            params,
            states: Default::default(),
        }
    }

    /// Updates the lock time of this signal and returns true
    /// if a cycle slip should be declared: lock time reset to zero,
    /// decreased, or grew less than elapsed time.
    pub fn update_lock(
        &mut self,
        sv: SV,
        slot: usize,
        code: &'static str,
        lock: f64,
        t: Epoch,
    ) -> bool {
        let state = self.states.entry((sv, slot, code)).or_default();
        let slip = match state.lock {
            Some((prev, prev_t)) => {
                let dt = (t - prev_t).to_seconds();
                let saturated = self.params.saturation.is_some_and(|sat| lock >= sat);
                lock <= 0.0
                    || lock < prev
                    || (!saturated && lock - prev + self.params.slack <= dt)
            },
            None => false,
        };
        state.lock = Some((lock, t));
        if slip {
            debug!(
                "{:?} ({}) - {} cycle slip (slot #{}, lock {}s)",
                t, sv, code, slot, lock
            );
        }
        slip
    }

    /// Updates the half cycle flag of this signal and returns true
    /// when it differs from the previous one.
    pub fn update_half_cycle(
        &mut self,
        sv: SV,
        slot: usize,
        code: &'static str,
        half_cycle: bool,
    ) -> bool {
        let state = self.states.entry((sv, slot, code)).or_default();
        let toggled = state.half_cycle.is_some_and(|prev| prev != half_cycle);
        state.half_cycle = Some(half_cycle);
        if toggled {
            debug!("({}) - {} half cycle flag toggled (slot #{})", sv, code, slot);
        }
        toggled
    }

    /// Forgets all signals
    pub fn reset(&mut self) {
        self.states.clear();
    }
}
