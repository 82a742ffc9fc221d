//! Thread priorities and the ready-priority bitmap

use core::fmt;

/// Number of priority levels the ready bitmap can represent.
pub const MAX_PRIORITIES: usize = 32;

/// Thread priority. Higher values are more urgent; `0` is the idle band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(u8);

impl Priority {
    /// Lowest priority, reserved by convention for the idle thread
    pub const IDLE: Priority = Priority(0);

    /// Highest priority the bitmap can hold
    pub const MAX: Priority = Priority(MAX_PRIORITIES as u8 - 1);

    /// Create a priority level
    pub const fn new(priority: u8) -> Self {
        Priority(priority)
    }

    /// Get the raw priority value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Index into per-priority tables
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check the priority against a configured number of levels
    pub const fn is_within(self, levels: u8) -> bool {
        self.0 < levels
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}

/// Bitmap of priorities that currently have at least one ready thread.
///
/// Uses `leading_zeros` for constant-time lookup of the most urgent level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadySet {
    bits: u32,
}

impl ReadySet {
    /// Empty set
    pub const EMPTY: Self = Self { bits: 0 };

    /// Create a new empty set
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Mark a priority as having ready threads
    pub fn insert(&mut self, priority: Priority) {
        Self::assert_range(priority);
        self.bits |= 1u32 << priority.0;
    }

    /// Clear a priority
    pub fn remove(&mut self, priority: Priority) {
        Self::assert_range(priority);
        self.bits &= !(1u32 << priority.0);
    }

    /// Check whether a priority is marked
    pub fn contains(&self, priority: Priority) -> bool {
        Self::assert_range(priority);
        (self.bits & (1u32 << priority.0)) != 0
    }

    /// Check if no priority is marked
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Most urgent marked priority
    pub fn highest(&self) -> Option<Priority> {
        if self.bits == 0 {
            None
        } else {
            Some(Priority(31 - self.bits.leading_zeros() as u8))
        }
    }

    /// Least urgent marked priority
    pub fn lowest(&self) -> Option<Priority> {
        if self.bits == 0 {
            None
        } else {
            Some(Priority(self.bits.trailing_zeros() as u8))
        }
    }

    /// Clear every priority
    pub fn clear(&mut self) {
        self.bits = 0;
    }

    fn assert_range(priority: Priority) {
        assert!(
            priority.index() < MAX_PRIORITIES,
            "priority {} exceeds supported range 0..{}",
            priority.0,
            MAX_PRIORITIES
        );
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ReadySet {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "ReadySet({=u32:b})", self.bits);
    }
}

/// Macro to create compile-time priority constants
#[macro_export]
macro_rules! priority {
    ($value:literal) => {
        $crate::Priority::new($value)
    };
}
