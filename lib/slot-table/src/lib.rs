//! Fixed-capacity slot arena.
//!
//! A [`SlotTable`] holds at most `capacity` records. Each slot is either free
//! or occupied by exactly one record. Records are located either through the
//! [`SlotKey`] returned by [`SlotTable::insert`] or by scanning with a
//! predicate, which is how callers address records by their own identifiers
//! (file descriptors, operation ids). Keys are opaque so the layout of the
//! table stays private to this crate.

use slab::Slab;
use std::fmt;
use thiserror::Error;

/// Returned when every slot is occupied.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
#[error("slot table is full ({capacity} slots in use)")]
pub struct TableFull {
    pub capacity: usize,
}

/// Opaque reference to an occupied slot.
///
/// A key stays valid until the record it refers to is removed. After that
/// the slot may be handed to a new record, so keys must not be cached past
/// a removal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey(usize);

impl fmt::Debug for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotKey({})", self.0)
    }
}

pub struct SlotTable<T> {
    slots: Slab<T>,
    capacity: usize,
}

impl<T> SlotTable<T> {
    /// Creates an empty table that will never hold more than `capacity`
    /// records. All storage is reserved up front.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Slab::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Places `value` in a free slot.
    pub fn insert(&mut self, value: T) -> Result<SlotKey, TableFull> {
        if self.is_full() {
            return Err(TableFull {
                capacity: self.capacity,
            });
        }
        Ok(SlotKey(self.slots.insert(value)))
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.slots.get(key.0)
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.slots.get_mut(key.0)
    }

    /// Frees the slot behind `key`, handing back its record.
    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        self.slots.try_remove(key.0)
    }

    /// Returns the key of the first occupied slot whose record matches.
    pub fn position<F>(&self, mut pred: F) -> Option<SlotKey>
    where
        F: FnMut(&T) -> bool,
    {
        self.slots
            .iter()
            .find(|(_, value)| pred(value))
            .map(|(idx, _)| SlotKey(idx))
    }

    pub fn find<F>(&self, pred: F) -> Option<&T>
    where
        F: FnMut(&T) -> bool,
    {
        let key = self.position(pred)?;
        self.get(key)
    }

    pub fn find_mut<F>(&mut self, pred: F) -> Option<&mut T>
    where
        F: FnMut(&T) -> bool,
    {
        let key = self.position(pred)?;
        self.get_mut(key)
    }

    /// Removes the first record matching `pred`.
    pub fn remove_where<F>(&mut self, pred: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let key = self.position(pred)?;
        self.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots.iter().map(|(_, value)| value)
    }

    /// Drops every record, leaving all slots free.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl<T: fmt::Debug> fmt::Debug for SlotTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("capacity", &self.capacity)
            .field("len", &self.slots.len())
            .field("slots", &self.slots)
            .finish()
    }
}
