//! Bounded correlation table for in-flight calls.
//!
//! A call takes a slot with [`CallSlots::acquire`], is tagged with its wire
//! id by [`CallSlots::bind`], and is found again by [`CallSlots::resolve`]
//! when the matching response arrives. Allocation always hands out the
//! lowest free index. Slots are never shared between live calls.

use std::collections::BTreeSet;

/// Default slot capacity per connection or federation session.
pub const MAX_INFLIGHT: usize = 20;

/// Every slot is occupied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("all {capacity} call slots are in use")]
pub struct SlotsExhausted {
    /// Table capacity.
    pub capacity: usize,
}

#[derive(Debug)]
enum Slot<K, T> {
    Reserved,
    Bound { id: K, value: T },
}

/// Fixed-capacity slot table keyed by an external call id.
#[derive(Debug)]
pub struct CallSlots<K, T> {
    slots: Vec<Option<Slot<K, T>>>,
    free: BTreeSet<usize>,
}

impl<K: PartialEq, T> Default for CallSlots<K, T> {
    fn default() -> Self {
        Self::new(MAX_INFLIGHT)
    }
}

impl<K: PartialEq, T> CallSlots<K, T> {
    /// Create a table with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).collect(),
        }
    }

    /// Reserve the lowest free slot.
    pub fn acquire(&mut self) -> Result<usize, SlotsExhausted> {
        let slot = self.free.pop_first().ok_or(SlotsExhausted {
            capacity: self.capacity(),
        })?;
        self.slots[slot] = Some(Slot::Reserved);
        Ok(slot)
    }

    /// Attach a call id and its payload to a reserved slot.
    ///
    /// Returns `false` (and drops nothing) if the slot was not reserved.
    pub fn bind(&mut self, slot: usize, id: K, value: T) -> bool {
        match self.slots.get_mut(slot) {
            Some(entry @ Some(Slot::Reserved)) => {
                *entry = Some(Slot::Bound { id, value });
                true
            }
            _ => false,
        }
    }

    /// Find the slot bound to `id`.
    pub fn resolve(&self, id: &K) -> Option<usize> {
        self.slots.iter().position(|entry| {
            matches!(entry, Some(Slot::Bound { id: bound, .. }) if bound == id)
        })
    }

    /// Free a slot, returning its payload if it was bound.
    pub fn release(&mut self, slot: usize) -> Option<T> {
        let entry = self.slots.get_mut(slot)?.take()?;
        let _ = self.free.insert(slot);
        match entry {
            Slot::Bound { value, .. } => Some(value),
            Slot::Reserved => None,
        }
    }

    /// Resolve and release in one step.
    pub fn take(&mut self, id: &K) -> Option<T> {
        let slot = self.resolve(id)?;
        self.release(slot)
    }

    /// Release every slot, returning all bound payloads in slot order.
    pub fn drain(&mut self) -> Vec<T> {
        (0..self.slots.len())
            .filter_map(|slot| self.release(slot))
            .collect()
    }

    /// Whether `slot` is reserved or bound.
    pub fn is_occupied(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(Option::is_some)
    }

    /// Occupied slot count.
    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether no slot is free.
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Table capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
