//! Storage arena — component B.
//!
//! The spec describes a single contiguous, fixed-stride byte region per
//! slot. This crate keeps the same addressing model (slots are compact
//! `u32` indices into a growable array, never reused in place except via
//! the tombstone-replace path) but represents each slot as a small set of
//! independently-locked fields rather than one raw byte stride:
//!
//! - `vector` / `original`: written once at insert (or rewritten whole on
//!   update-in-place); read far more often than written.
//! - `meta`: label, level, tombstone bit — small, infrequently written.
//! - `links`: the per-layer neighbor lists — this is the "per-slot mutex"
//!   of §4.E. It is deliberately a *separate* lock from `vector`/`meta` so
//!   that the graph core can read a neighbor's vector for a distance
//!   computation without taking the same lock used for neighbor-list
//!   mutation, which is what keeps the ascending-slot-id locking order in
//!   [`crate::graph`] deadlock-free (see DESIGN.md).
//!
//! Growing the arena replaces the whole slot table behind a single
//! `RwLock`, which is exactly the "resize is exclusive with all other
//! operations" rule in §4.B: every other arena access only ever takes a
//! short-lived read lock on that outer table to clone the `Arc`, so a
//! writer blocks everyone only for the duration of the append.

use std::sync::{Arc, RwLock};

use crate::error::{IndexError, Result, read_lock, write_lock};

/// A compact internal identifier; an index into the arena's slot table.
pub type SlotId = u32;

/// The small, infrequently-mutated fields of a slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotMeta {
    pub label: u64,
    pub level: u32,
    pub tombstone: bool,
    pub allocated: bool,
    /// Set once a slot has been reused via `replace_deleted`; carried
    /// through persistence purely for diagnostic/stat purposes.
    pub reused: bool,
}

/// One arena slot. Every field is independently lockable; see the module
/// doc for why `links` is split out from `vector`/`meta`.
pub(crate) struct Slot {
    pub(crate) vector: RwLock<Vec<f32>>,
    pub(crate) original: RwLock<Option<Vec<f32>>>,
    pub(crate) meta: RwLock<SlotMeta>,
    /// `links[layer]` is the neighbor list at that layer. Empty for layers
    /// above the slot's assigned level.
    pub(crate) links: RwLock<Vec<Vec<SlotId>>>,
}

impl Slot {
    fn empty() -> Self {
        Slot {
            vector: RwLock::new(Vec::new()),
            original: RwLock::new(None),
            meta: RwLock::new(SlotMeta::default()),
            links: RwLock::new(Vec::new()),
        }
    }
}

/// Fixed-stride slot store for vectors, link arrays, labels, and per-slot
/// metadata.
pub struct Arena {
    dim: usize,
    store_original: bool,
    slots: RwLock<Arc<Vec<Arc<Slot>>>>,
}

impl Arena {
    /// Allocates an arena with `capacity` pre-existing, unallocated slots.
    pub fn new(capacity: usize, dim: usize, store_original: bool) -> Self {
        let slots: Vec<Arc<Slot>> = (0..capacity).map(|_| Arc::new(Slot::empty())).collect();
        Arena {
            dim,
            store_original,
            slots: RwLock::new(Arc::new(slots)),
        }
    }

    /// Vector dimensionality every slot's vector must match.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Whether this arena keeps a parallel pre-normalization vector copy.
    pub fn store_original(&self) -> bool {
        self.store_original
    }

    /// A cheap, point-in-time clone of the slot table's `Arc`. Callers hold
    /// this alive for as long as they need to keep indexing into slots
    /// (e.g. while holding several `links` guards at once) — see
    /// [`crate::graph`].
    pub(crate) fn snapshot(&self) -> Result<Arc<Vec<Arc<Slot>>>> {
        Ok(read_lock(&self.slots, "arena slot table")?.clone())
    }

    /// Current capacity (number of slots, allocated or not).
    pub fn capacity(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    /// Grows the arena to `new_capacity`, preserving every existing slot.
    /// Shrinking is rejected; this is `resize`'s only failure mode.
    /// Exclusive with every other arena operation: the caller (the graph
    /// core, via the structural lock) is expected to hold out all other
    /// traffic for the duration of this call, but the lock taken here is
    /// also sufficient on its own since every other method only ever reads
    /// the table briefly to clone the `Arc`.
    pub fn resize(&self, new_capacity: usize) -> Result<()> {
        let mut table = write_lock(&self.slots, "arena slot table")?;
        let current = table.len();
        if new_capacity < current {
            return Err(IndexError::InvalidArgument(format!(
                "cannot shrink arena from {current} to {new_capacity}"
            )));
        }
        if new_capacity == current {
            return Ok(());
        }
        let mut grown: Vec<Arc<Slot>> = Vec::with_capacity(new_capacity);
        grown.extend(table.iter().cloned());
        grown.extend((current..new_capacity).map(|_| Arc::new(Slot::empty())));
        *table = Arc::new(grown);
        Ok(())
    }

    /// Clones out slot `id`'s current vector.
    pub fn vector(&self, id: SlotId) -> Result<Vec<f32>> {
        let slots = self.snapshot()?;
        Ok(read_lock(&slots[id as usize].vector, "vector")?.clone())
    }

    /// Clones out slot `id`'s stored pre-normalization vector, if any.
    pub fn original(&self, id: SlotId) -> Result<Option<Vec<f32>>> {
        let slots = self.snapshot()?;
        Ok(read_lock(&slots[id as usize].original, "original")?.clone())
    }

    /// Overwrites slot `id`'s vector (and, when `store_original` is set,
    /// its pre-normalization copy). Used both for fresh inserts and for
    /// update-in-place / tombstone-replace rewrites.
    pub fn set_vector(&self, id: SlotId, vector: Vec<f32>, original: Option<Vec<f32>>) -> Result<()> {
        let slots = self.snapshot()?;
        *write_lock(&slots[id as usize].vector, "vector")? = vector;
        *write_lock(&slots[id as usize].original, "original")? = original;
        Ok(())
    }

    /// Copies out slot `id`'s metadata.
    pub fn meta(&self, id: SlotId) -> Result<SlotMeta> {
        let slots = self.snapshot()?;
        Ok(*read_lock(&slots[id as usize].meta, "meta")?)
    }

    /// Applies `f` to slot `id`'s metadata under its write lock.
    pub fn with_meta_mut<R>(&self, id: SlotId, f: impl FnOnce(&mut SlotMeta) -> R) -> Result<R> {
        let slots = self.snapshot()?;
        let mut guard = write_lock(&slots[id as usize].meta, "meta")?;
        Ok(f(&mut guard))
    }

    /// Clones out slot `id`'s neighbor lists (all layers).
    pub fn links(&self, id: SlotId) -> Result<Vec<Vec<SlotId>>> {
        let slots = self.snapshot()?;
        Ok(read_lock(&slots[id as usize].links, "links")?.clone())
    }

    /// Returns the `Arc<Slot>` handle for `id`, letting the caller lock
    /// whichever of its fields it needs and hold that guard for as long as
    /// it likes (the guard borrows from the `Arc` the caller now owns).
    pub(crate) fn slot_handle(&self, id: SlotId) -> Result<Arc<Slot>> {
        Ok(self.snapshot()?[id as usize].clone())
    }

    /// Number of slots currently marked `allocated`.
    pub fn allocated_count(&self) -> Result<usize> {
        let slots = self.snapshot()?;
        let mut count = 0;
        for s in slots.iter() {
            if read_lock(&s.meta, "meta")?.allocated {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Number of allocated, non-tombstoned slots.
    pub fn live_count(&self) -> Result<usize> {
        let slots = self.snapshot()?;
        let mut count = 0;
        for s in slots.iter() {
            let m = read_lock(&s.meta, "meta")?;
            if m.allocated && !m.tombstone {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests;
