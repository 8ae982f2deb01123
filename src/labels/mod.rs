//! Label directory — bidirectional mapping between caller labels and
//! internal slot ids.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Result, read_lock, write_lock};

/// Concurrent label → slot map.
///
/// Reads take a shared lock; the graph core additionally serializes
/// check-then-act sequences (label lookup followed by a slot claim) behind
/// its own label mutex, since a single map operation here is not enough to
/// make "look up, then allocate if absent" atomic across threads.
pub struct LabelDirectory {
    map: RwLock<HashMap<u64, u32>>,
}

impl LabelDirectory {
    /// Creates an empty directory with room for `capacity_hint` labels.
    pub fn with_capacity(capacity_hint: usize) -> Self {
        Self {
            map: RwLock::new(HashMap::with_capacity(capacity_hint)),
        }
    }

    /// Rebuilds a directory from a flat `(label, slot)` list, as read back
    /// from a persisted image.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u64, u32)>) -> Self {
        let map: HashMap<u64, u32> = pairs.into_iter().collect();
        Self { map: RwLock::new(map) }
    }

    /// A snapshot of every `(label, slot)` binding, for persistence.
    pub fn iter_pairs(&self) -> Result<Vec<(u64, u32)>> {
        Ok(read_lock(&self.map, "label directory")?
            .iter()
            .map(|(&l, &s)| (l, s))
            .collect())
    }

    /// Resolves `label` to its current slot, if any.
    pub fn lookup(&self, label: u64) -> Result<Option<u32>> {
        Ok(read_lock(&self.map, "label directory")?.get(&label).copied())
    }

    /// Binds `label` to `slot`, returning the slot it previously pointed at
    /// (if the label already existed).
    pub fn insert_or_update(&self, label: u64, slot: u32) -> Result<Option<u32>> {
        Ok(write_lock(&self.map, "label directory")?.insert(label, slot))
    }

    /// Removes `label` entirely, returning the slot it pointed at.
    pub fn erase(&self, label: u64) -> Result<Option<u32>> {
        Ok(write_lock(&self.map, "label directory")?.remove(&label))
    }

    /// Number of labels currently bound (live slots only; a tombstoned slot
    /// whose label has not been reused still counts).
    pub fn len(&self) -> Result<usize> {
        Ok(read_lock(&self.map, "label directory")?.len())
    }

    /// Whether the directory holds no labels.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
