//! Tick arithmetic and timer modes

use core::fmt;

/// Monotonic count of tick interrupts since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(u64);

impl Tick {
    /// Zero tick
    pub const ZERO: Self = Self(0);

    /// Create a new tick count
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Get the raw tick value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Advance by one tick
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Calculate elapsed ticks since a previous tick
    pub fn elapsed_since(self, previous: Tick) -> u64 {
        self.0.wrapping_sub(previous.0)
    }

    /// Check if this tick is after another tick (handles wraparound)
    pub fn is_after(self, other: Tick) -> bool {
        let delta = self.0.wrapping_sub(other.0);
        delta != 0 && delta < u64::MAX / 2
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick:{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Tick {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "tick:{}", self.0);
    }
}

/// Whether a timer is consumed on expiry or re-armed with its interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerMode {
    OneShot,
    Periodic,
}

impl TimerMode {
    pub const fn is_periodic(self) -> bool {
        matches!(self, Self::Periodic)
    }
}

/// Convert milliseconds to ticks, rounding up so a wait never ends early.
///
/// A zero-length request still costs one tick.
pub const fn ms_to_ticks(ms: u32, tick_period_ms: u32) -> u32 {
    let ticks = ms.div_ceil(tick_period_ms);
    if ticks == 0 {
        1
    } else {
        ticks
    }
}
