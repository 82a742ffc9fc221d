//! Index-addressed arena with an intrusive free list

use alloc::vec::Vec;

use crate::PoolStats;

/// Largest number of slots a [`Slab`] can address with `u16` indices.
pub const MAX_SLOTS: usize = u16::MAX as usize;

enum Slot<T> {
    Occupied(T),
    Vacant { next_free: Option<u16> },
}

/// Slot index tagged with the generation it was claimed under.
///
/// Removing a value bumps the slot's generation, so a key kept past
/// [`Slab::remove`] never matches whatever later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Key {
    index: u16,
    generation: u16,
}

impl Key {
    pub const fn new(index: u16, generation: u16) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> u16 {
        self.index
    }

    pub const fn generation(self) -> u16 {
        self.generation
    }
}

/// Fixed-capacity arena of `T` addressed by `u16` indices.
///
/// The backing storage is allocated by [`Slab::with_capacity`] and never
/// grows. Vacant slots are chained into a free list so that
/// [`insert`](Slab::insert) and [`remove`](Slab::remove) run in constant time.
pub struct Slab<T> {
    slots: Vec<Slot<T>>,
    generations: Vec<u16>,
    free_head: Option<u16>,
    stats: PoolStats,
}

impl<T> Slab<T> {
    /// Allocate every slot up front and thread them onto the free list.
    ///
    /// Capacities above [`MAX_SLOTS`] are clamped.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_SLOTS);
        let mut slots = Vec::with_capacity(capacity);
        for index in 0..capacity {
            let next_free = if index + 1 < capacity {
                Some((index + 1) as u16)
            } else {
                None
            };
            slots.push(Slot::Vacant { next_free });
        }

        Self {
            slots,
            generations: alloc::vec![0; capacity],
            free_head: if capacity > 0 { Some(0) } else { None },
            stats: PoolStats::new(capacity),
        }
    }

    /// Claim a free slot for `value`, handing the value back if the arena is full.
    pub fn insert(&mut self, value: T) -> Result<Key, T> {
        let Some(index) = self.free_head else {
            return Err(value);
        };

        let slot = &mut self.slots[index as usize];
        self.free_head = match slot {
            Slot::Vacant { next_free } => *next_free,
            Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
        };
        *slot = Slot::Occupied(value);
        self.stats.on_alloc();
        Ok(Key::new(index, self.generations[index as usize]))
    }

    /// Return a slot to the free list, yielding its value.
    ///
    /// Returns `None` if the slot is already vacant or out of range.
    pub fn remove(&mut self, index: u16) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        if matches!(slot, Slot::Vacant { .. }) {
            return None;
        }

        let previous = core::mem::replace(
            slot,
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = Some(index);
        let generation = &mut self.generations[index as usize];
        *generation = generation.wrapping_add(1);
        self.stats.on_dealloc();
        match previous {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn get(&self, index: u16) -> Option<&T> {
        match self.slots.get(index as usize)? {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn get_mut(&mut self, index: u16) -> Option<&mut T> {
        match self.slots.get_mut(index as usize)? {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn contains(&self, index: u16) -> bool {
        self.get(index).is_some()
    }

    /// Current key of an occupied slot
    pub fn key(&self, index: u16) -> Option<Key> {
        self.get(index)
            .map(|_| Key::new(index, self.generations[index as usize]))
    }

    /// Whether `key` still names the value it was issued for
    pub fn is_live(&self, key: Key) -> bool {
        self.key(key.index) == Some(key)
    }

    /// The value `key` was issued for, unless it has since been removed.
    pub fn lookup(&self, key: Key) -> Option<&T> {
        if self.generations.get(key.index as usize) != Some(&key.generation) {
            return None;
        }
        self.get(key.index)
    }

    pub fn lookup_mut(&mut self, key: Key) -> Option<&mut T> {
        if self.generations.get(key.index as usize) != Some(&key.generation) {
            return None;
        }
        self.get_mut(key.index)
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.stats.used
    }

    pub fn is_empty(&self) -> bool {
        self.stats.used == 0
    }

    pub fn is_full(&self) -> bool {
        self.free_head.is_none()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Iterate over occupied slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied(value) => Some((index as u16, value)),
                Slot::Vacant { .. } => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_until_full_then_reuse_freed_slot() {
        let mut slab = Slab::with_capacity(3);
        let a = slab.insert('a').unwrap();
        let b = slab.insert('b').unwrap();
        let c = slab.insert('c').unwrap();
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));
        assert!(slab.is_full());
        assert_eq!(slab.insert('d'), Err('d'));

        assert_eq!(slab.remove(b.index()), Some('b'));
        assert_eq!(slab.remove(b.index()), None);
        let e = slab.insert('e').unwrap();
        assert_eq!(e.index(), b.index());
        assert_eq!(slab.get(e.index()), Some(&'e'));
    }

    #[test]
    fn reused_slot_gets_a_new_generation() {
        let mut slab = Slab::with_capacity(1);
        let first = slab.insert(1u8).unwrap();
        assert!(slab.is_live(first));

        slab.remove(first.index());
        assert!(!slab.is_live(first));
        assert_eq!(slab.key(first.index()), None);

        let second = slab.insert(2u8).unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert!(!slab.is_live(first));
        assert!(slab.is_live(second));
        assert_eq!(slab.key(0), Some(second));
        assert_eq!(slab.lookup(first), None);
        assert_eq!(slab.lookup(second), Some(&2));
        if let Some(value) = slab.lookup_mut(second) {
            *value = 3;
        }
        assert_eq!(slab.get(0), Some(&3));
    }

    #[test]
    fn stats_track_low_watermark() {
        let mut slab = Slab::with_capacity(4);
        let first = slab.insert(1u32).unwrap();
        let _second = slab.insert(2u32).unwrap();
        slab.remove(first.index());

        let stats = slab.stats();
        assert_eq!(stats.used, 1);
        assert_eq!(stats.free, 3);
        assert_eq!(stats.min_free, 2);
    }

    #[test]
    fn zero_capacity_is_always_full() {
        let mut slab: Slab<u8> = Slab::with_capacity(0);
        assert!(slab.is_full());
        assert_eq!(slab.insert(1), Err(1));
        assert_eq!(slab.remove(0), None);
    }
}
