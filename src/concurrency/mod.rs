//! Concurrency layer — component E.
//!
//! Three coarse locks plus a pooled scratch buffer coordinate every
//! operation:
//!
//! - [`StructuralLock`]: shared by every normal operation, held exclusive
//!   only by `resize`. A `resize` in flight blocks every other op; every
//!   other op only ever contends with other shared holders.
//! - A plain `Mutex<()>` (owned by [`crate::graph::Graph`]) serializes
//!   label-directory mutations so "look up, then claim a slot if absent"
//!   is atomic across threads, which [`crate::labels::LabelDirectory`]'s
//!   own internal lock cannot guarantee by itself.
//! - Per-slot locks live on [`crate::arena::Slot`] itself (not here); see
//!   that module's doc comment for why `links` and `vector` are separate
//!   locks and how ascending-slot-id ordering is applied at the one call
//!   site that must hold several `links` locks simultaneously
//!   ([`crate::graph`]'s neighbor-linking step).
//!
//! This module also owns the [`VisitedListPool`] (§4.E's "free-list of
//! epoch-buffers").

use std::ops::{Deref, DerefMut};
use std::sync::RwLock;

use crossbeam::queue::SegQueue;

use crate::error::{Result, read_lock, write_lock};

/// Acquired shared by every operation except `resize`; acquired exclusive
/// only by `resize` (and momentarily whenever the entry point is promoted,
/// see [`crate::graph::Graph`]).
pub struct StructuralLock {
    inner: RwLock<()>,
}

impl StructuralLock {
    pub fn new() -> Self {
        StructuralLock { inner: RwLock::new(()) }
    }

    pub fn read(&self) -> Result<StructuralReadGuard<'_>> {
        Ok(StructuralReadGuard { _guard: read_lock(&self.inner, "structural")? })
    }

    pub fn write(&self) -> Result<StructuralWriteGuard<'_>> {
        Ok(StructuralWriteGuard { _guard: write_lock(&self.inner, "structural")? })
    }
}

impl Default for StructuralLock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StructuralReadGuard<'a> {
    _guard: std::sync::RwLockReadGuard<'a, ()>,
}

pub struct StructuralWriteGuard<'a> {
    _guard: std::sync::RwLockWriteGuard<'a, ()>,
}

/// A per-slot-id epoch buffer: `marks[slot] == epoch` means "visited this
/// traversal". Bumping `epoch` is an O(1) substitute for clearing the
/// whole buffer between queries/insertions.
pub struct VisitedList {
    epoch: u32,
    marks: Vec<u32>,
}

impl VisitedList {
    fn new(capacity: usize) -> Self {
        VisitedList {
            epoch: 0,
            marks: vec![0; capacity],
        }
    }

    fn ensure_capacity(&mut self, capacity: usize) {
        if self.marks.len() < capacity {
            self.marks.resize(capacity, 0);
        }
    }

    /// Starts a fresh traversal: every previously-marked slot reads as
    /// unvisited again, without touching the buffer (unless the epoch
    /// counter wraps, which is handled by a full clear).
    fn reset(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.marks.iter_mut().for_each(|m| *m = 0);
            self.epoch = 1;
        }
    }

    pub fn is_visited(&self, slot: u32) -> bool {
        self.marks[slot as usize] == self.epoch
    }

    pub fn mark(&mut self, slot: u32) {
        self.marks[slot as usize] = self.epoch;
    }
}

/// A free-list of [`VisitedList`] buffers. Every query or insertion
/// borrows one via [`VisitedListPool::acquire`], which returns a guard
/// that resets the buffer for the new traversal and returns it to the
/// pool on every exit path (including an early return or panic unwind),
/// satisfying §4.E's "guaranteed return on every exit path".
pub struct VisitedListPool {
    free: SegQueue<VisitedList>,
}

impl VisitedListPool {
    pub fn new() -> Self {
        VisitedListPool { free: SegQueue::new() }
    }

    pub fn acquire(&self, capacity: usize) -> PooledVisitedList<'_> {
        let mut list = self.free.pop().unwrap_or_else(|| VisitedList::new(capacity));
        list.ensure_capacity(capacity);
        list.reset();
        PooledVisitedList {
            pool: self,
            list: Some(list),
        }
    }
}

impl Default for VisitedListPool {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PooledVisitedList<'a> {
    pool: &'a VisitedListPool,
    list: Option<VisitedList>,
}

impl Deref for PooledVisitedList<'_> {
    type Target = VisitedList;
    fn deref(&self) -> &VisitedList {
        self.list.as_ref().expect("visited list taken before drop")
    }
}

impl DerefMut for PooledVisitedList<'_> {
    fn deref_mut(&mut self) -> &mut VisitedList {
        self.list.as_mut().expect("visited list taken before drop")
    }
}

impl Drop for PooledVisitedList<'_> {
    fn drop(&mut self) {
        if let Some(list) = self.list.take() {
            self.pool.free.push(list);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visited_list_starts_clean_each_acquire() {
        let pool = VisitedListPool::new();
        {
            let mut list = pool.acquire(4);
            assert!(!list.is_visited(2));
            list.mark(2);
            assert!(list.is_visited(2));
        }
        // Buffer was returned to the pool and is reused, but a fresh
        // acquire must not see the previous traversal's marks.
        let list = pool.acquire(4);
        assert!(!list.is_visited(2));
    }

    #[test]
    fn visited_list_grows_to_requested_capacity() {
        let pool = VisitedListPool::new();
        {
            let _list = pool.acquire(2);
        }
        let mut list = pool.acquire(10);
        list.mark(9);
        assert!(list.is_visited(9));
    }

    #[test]
    fn structural_lock_allows_concurrent_readers() {
        let lock = StructuralLock::new();
        let _a = lock.read().unwrap();
        let _b = lock.read().unwrap();
    }
}
