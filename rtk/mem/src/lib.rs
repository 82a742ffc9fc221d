#![no_std]
#![forbid(unsafe_code)]

//! # RTK Memory Management
//!
//! Fixed-capacity object arenas for the RTK kernel. Every arena is sized and
//! allocated once at boot; after that, claiming and returning a slot is an
//! O(1) relink of an index free list and never touches the allocator.

extern crate alloc;

pub mod slab;

pub use slab::*;

/// Pool statistics for debugging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of slots in the pool
    pub total: usize,
    /// Number of free slots currently available
    pub free: usize,
    /// Number of slots currently in use
    pub used: usize,
    /// Minimum number of free slots ever reached
    pub min_free: usize,
}

impl PoolStats {
    /// Create new pool statistics
    pub const fn new(total: usize) -> Self {
        Self {
            total,
            free: total,
            used: 0,
            min_free: total,
        }
    }

    /// Update statistics after a slot is claimed
    pub fn on_alloc(&mut self) {
        self.used += 1;
        self.free -= 1;
        if self.free < self.min_free {
            self.min_free = self.free;
        }
    }

    /// Update statistics after a slot is returned
    pub fn on_dealloc(&mut self) {
        if self.used > 0 {
            self.used -= 1;
            self.free += 1;
        }
    }

    /// Check if every slot is in use
    pub const fn is_exhausted(&self) -> bool {
        self.free == 0
    }

    /// Check if no slot is in use
    pub const fn is_idle(&self) -> bool {
        self.used == 0
    }

    /// Get utilization as a percentage (0-100)
    pub fn utilization(&self) -> u8 {
        if self.total == 0 {
            0
        } else {
            ((self.used * 100) / self.total) as u8
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PoolStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "PoolStats{{ total: {}, free: {}, used: {}, min_free: {} }}",
            self.total,
            self.free,
            self.used,
            self.min_free
        );
    }
}
