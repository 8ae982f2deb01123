//! Graph core — component D, the hard center of this crate.
//!
//! [`Graph`] owns the arena, the label directory, and every lock in §4.E,
//! and implements insertion, search and deletion exactly as described in
//! §4.D. It does not know about persistence or the thread-local error
//! relay; those live in [`crate::persistence`] and [`crate::index`]
//! respectively, which only ever touch `Graph` through the methods below.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::arena::{Arena, Slot, SlotId, SlotMeta};
use crate::concurrency::{StructuralLock, VisitedListPool};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result, lock_mutex, read_lock, write_lock};
use crate::labels::LabelDirectory;
use crate::space::{DistanceSpace, normalize_in_place};

#[cfg(test)]
mod tests;

/// A predicate over caller labels, evaluated once per surviving candidate
/// after a beam search closes. Mirrors the "filter functor"
/// design note in §9.
pub trait Filter: Sync {
    fn allows(&self, label: u64) -> bool;
}

/// The default, permissive filter.
pub struct NoFilter;

impl Filter for NoFilter {
    fn allows(&self, _label: u64) -> bool {
        true
    }
}

/// One concrete filter implementation: `(allow.empty() OR label ∈ allow)
/// AND (label ∉ deny)`.
pub struct AllowDenyFilter<'a> {
    pub allow: Option<&'a HashSet<u64>>,
    pub deny: Option<&'a HashSet<u64>>,
}

impl Filter for AllowDenyFilter<'_> {
    fn allows(&self, label: u64) -> bool {
        let allowed = self.allow.is_none_or(|set| set.contains(&label));
        let denied = self.deny.is_some_and(|set| set.contains(&label));
        allowed && !denied
    }
}

/// `(enter_slot, enter_level)` — the top of the graph.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint {
    pub slot: SlotId,
    pub level: u32,
}

/// A candidate during beam search / neighbor selection: `(distance,
/// slot_id)`, compared lexicographically per §4.D's tie-breaking rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub dist: f32,
    pub id: SlotId,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist).then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The in-memory HNSW graph: arena + label directory + locks + entry point.
pub struct Graph {
    pub(crate) arena: Arena,
    pub(crate) labels: LabelDirectory,
    space: DistanceSpace,
    m: usize,
    ef_construction: usize,
    ml: f64,
    seed: u64,
    cosine: bool,
    allow_replace_deleted: AtomicBool,

    ef_search: AtomicUsize,
    structural: StructuralLock,
    label_mutex: Mutex<()>,
    entry: RwLock<Option<EntryPoint>>,
    next_slot: AtomicU32,
    tombstones: Mutex<Vec<SlotId>>,
    visited_pool: VisitedListPool,
    rng: Mutex<StdRng>,
    dirty: Mutex<HashSet<SlotId>>,
}

const DEFAULT_EF_SEARCH: usize = 10;

impl Graph {
    /// Builds a fresh, empty graph from `config`. The arena
    /// starts at zero capacity; `init` immediately resizes it to the
    /// requested capacity.
    pub fn new(config: &IndexConfig) -> Self {
        Graph::from_parts(
            config,
            Arena::new(0, config.dim, config.store_original),
            LabelDirectory::with_capacity(0),
            None,
            0,
            Vec::new(),
        )
    }

    /// Rebuilds a graph from already-decoded parts (used by `Index::load`
    /// and, for a fresh `init`, by [`Graph::new`] followed by a resize).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        config: &IndexConfig,
        arena: Arena,
        labels: LabelDirectory,
        entry: Option<EntryPoint>,
        next_slot: u32,
        tombstones: Vec<SlotId>,
    ) -> Self {
        let space = DistanceSpace::from_kind(config.space);
        Graph {
            arena,
            labels,
            space,
            m: config.m,
            ef_construction: config.ef_construction,
            ml: 1.0 / (config.m as f64).ln(),
            seed: config.seed,
            cosine: config.space.normalize(),
            allow_replace_deleted: AtomicBool::new(config.allow_replace_deleted),
            ef_search: AtomicUsize::new(DEFAULT_EF_SEARCH),
            structural: StructuralLock::new(),
            label_mutex: Mutex::new(()),
            entry: RwLock::new(entry),
            next_slot: AtomicU32::new(next_slot),
            tombstones: Mutex::new(tombstones),
            visited_pool: VisitedListPool::new(),
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            dirty: Mutex::new(HashSet::new()),
        }
    }

    // ---- accessors used by the boundary and by persistence -------------

    pub fn dim(&self) -> usize {
        self.arena.dim()
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn ef_construction(&self) -> usize {
        self.ef_construction
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn cosine(&self) -> bool {
        self.cosine
    }

    pub fn allow_replace_deleted(&self) -> bool {
        self.allow_replace_deleted.load(AtomicOrdering::SeqCst)
    }

    /// Overrides the replace-deleted policy carried over from `init`/`load`
    /// (§4.G `load` takes this as an explicit caller argument rather than
    /// trusting whatever was persisted).
    pub(crate) fn set_allow_replace_deleted(&self, value: bool) {
        self.allow_replace_deleted.store(value, AtomicOrdering::SeqCst);
    }

    pub fn store_original(&self) -> bool {
        self.arena.store_original()
    }

    pub fn get_ef(&self) -> usize {
        self.ef_search.load(AtomicOrdering::SeqCst)
    }

    pub fn set_ef(&self, ef: usize) -> Result<()> {
        if ef < 1 {
            return Err(IndexError::InvalidArgument("ef_search must be >= 1".into()));
        }
        self.ef_search.store(ef, AtomicOrdering::SeqCst);
        Ok(())
    }

    /// Count of live (non-tombstoned) slots.
    pub fn len(&self) -> Result<usize> {
        self.arena.live_count()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn capacity(&self) -> Result<usize> {
        self.arena.capacity()
    }

    pub(crate) fn entry_point(&self) -> Result<Option<EntryPoint>> {
        Ok(*read_lock(&self.entry, "entry")?)
    }

    pub(crate) fn next_slot_count(&self) -> u32 {
        self.next_slot.load(AtomicOrdering::SeqCst)
    }

    pub(crate) fn tombstone_list(&self) -> Result<Vec<SlotId>> {
        Ok(lock_mutex(&self.tombstones, "tombstone set")?.clone())
    }

    pub(crate) fn label_pairs(&self) -> Result<Vec<(u64, SlotId)>> {
        self.labels.iter_pairs()
    }

    /// Drains and returns every slot id touched since the last call
    ///.
    pub(crate) fn take_dirty(&self) -> Result<Vec<SlotId>> {
        Ok(lock_mutex(&self.dirty, "dirty set")?.drain().collect())
    }

    fn mark_dirty(&self, slot: SlotId) -> Result<()> {
        lock_mutex(&self.dirty, "dirty set")?.insert(slot);
        Ok(())
    }

    /// Marks every currently-allocated slot dirty. Used right after `load`
    /// so that the very next `persist_dirty` is a correct full flush even
    /// though nothing has been mutated yet.
    pub(crate) fn mark_all_allocated_dirty(&self) -> Result<()> {
        let cap = self.arena.capacity()? as u32;
        let mut dirty = lock_mutex(&self.dirty, "dirty set")?;
        for id in 0..cap {
            if self.arena.meta(id)?.allocated {
                dirty.insert(id);
            }
        }
        Ok(())
    }

    /// Grows the underlying arena. Exclusive with every
    /// other operation via the structural lock.
    pub fn resize(&self, new_capacity: usize) -> Result<()> {
        let _structural = self.structural.write()?;
        self.arena.resize(new_capacity)
    }

    fn m_for_layer(&self, layer: u32) -> usize {
        if layer == 0 { self.m * 2 } else { self.m }
    }

    fn sample_level(&self) -> Result<u32> {
        let mut rng = lock_mutex(&self.rng, "rng")?;
        let u = loop {
            let candidate: f64 = rng.random();
            if candidate > 0.0 {
                break candidate;
            }
        };
        let level = (-u.ln() * self.ml).floor();
        Ok(if level <= 0.0 { 0 } else { level as u32 })
    }

    fn distance_to_slot(&self, query: &[f32], id: SlotId) -> Result<f32> {
        let v = self.arena.vector(id)?;
        Ok(self.space.distance(query, &v))
    }

    fn distance_between_slots(&self, a: SlotId, b: SlotId) -> Result<f32> {
        let va = self.arena.vector(a)?;
        let vb = self.arena.vector(b)?;
        Ok(self.space.distance(&va, &vb))
    }

    // ---- insertion -------------------------------------------------------

    /// `add_point`. Returns the slot the label now occupies.
    pub fn add_point(&self, label: u64, vector: &[f32], replace_deleted: bool) -> Result<SlotId> {
        if vector.len() != self.arena.dim() {
            return Err(IndexError::InvalidArgument(format!(
                "vector has dimension {} but index expects {}",
                vector.len(),
                self.arena.dim()
            )));
        }
        let mut stored = vector.to_vec();
        let original = if self.cosine {
            let keep = self.arena.store_original().then(|| stored.clone());
            normalize_in_place(&mut stored)?;
            keep
        } else {
            None
        };

        let _structural = self.structural.read()?;

        let (slot, level, is_update) = {
            let _label_guard = lock_mutex(&self.label_mutex, "label")?;
            let live_existing = match self.labels.lookup(label)? {
                Some(s) => {
                    let m = self.arena.meta(s)?;
                    if m.allocated && !m.tombstone { Some(s) } else { None }
                }
                None => None,
            };
            if let Some(slot) = live_existing {
                let level = self.arena.meta(slot)?.level;
                (slot, level, true)
            } else if replace_deleted && self.allow_replace_deleted() {
                let reused = lock_mutex(&self.tombstones, "tombstone set")?.pop();
                if let Some(slot) = reused {
                    let old_label = self.arena.meta(slot)?.label;
                    self.labels.erase(old_label)?;
                    self.labels.insert_or_update(label, slot)?;
                    let level = self.sample_level()?;
                    self.arena.with_meta_mut(slot, |m| {
                        m.label = label;
                        m.tombstone = false;
                        m.allocated = true;
                        m.reused = true;
                        m.level = level;
                    })?;
                    (slot, level, false)
                } else {
                    let slot = self.claim_fresh_slot()?;
                    self.labels.insert_or_update(label, slot)?;
                    let level = self.sample_level()?;
                    self.arena.with_meta_mut(slot, |m| {
                        m.label = label;
                        m.allocated = true;
                        m.level = level;
                    })?;
                    (slot, level, false)
                }
            } else {
                let slot = self.claim_fresh_slot()?;
                self.labels.insert_or_update(label, slot)?;
                let level = self.sample_level()?;
                self.arena.with_meta_mut(slot, |m| {
                    m.label = label;
                    m.allocated = true;
                    m.level = level;
                })?;
                (slot, level, false)
            }
        };

        if is_update {
            tracing::debug!(slot, label, "updating existing point, preserving level");
            self.detach_from_neighbors(slot)?;
            let handle = self.arena.slot_handle(slot)?;
            write_lock(&handle.links, "links")?.clear();
            // `slot` may currently be the graph's entry point. Its own links
            // are now empty, so letting `connect` traverse starting from
            // itself would search with no neighbors to expand and — since
            // it's still "live" — select itself as its own nearest
            // candidate, installing a self-loop. Point the entry elsewhere
            // first; `connect` below re-promotes `slot` if it's still the
            // highest-level live point once it has real neighbors again.
            self.repoint_entry_away_from(slot)?;
        } else {
            tracing::debug!(slot, label, level, "allocated new point");
        }

        self.arena.set_vector(slot, stored.clone(), original)?;
        self.mark_dirty(slot)?;
        self.connect(slot, &stored, level)?;
        Ok(slot)
    }

    /// If `slot` is currently the entry point, replaces it with another live
    /// slot at the highest level available (excluding `slot` itself), using
    /// the same level-descending scan `mark_deleted` uses. Leaves the entry
    /// unset if `slot` is the only live point in the graph.
    fn repoint_entry_away_from(&self, slot: SlotId) -> Result<()> {
        let mut entry = write_lock(&self.entry, "entry")?;
        let Some(current) = *entry else { return Ok(()) };
        if current.slot != slot {
            return Ok(());
        }
        let mut level = current.level;
        loop {
            if let Some(replacement) = self.find_live_slot_at_level_excluding(level, slot)? {
                *entry = Some(EntryPoint { slot: replacement, level });
                return Ok(());
            }
            if level == 0 {
                *entry = None;
                return Ok(());
            }
            level -= 1;
        }
    }

    fn claim_fresh_slot(&self) -> Result<SlotId> {
        let capacity = self.arena.capacity()? as u32;
        let slot = self.next_slot.fetch_add(1, AtomicOrdering::SeqCst);
        if slot >= capacity {
            self.next_slot.fetch_sub(1, AtomicOrdering::SeqCst);
            return Err(IndexError::CapacityExceeded { capacity: capacity as usize });
        }
        Ok(slot)
    }

    fn detach_from_neighbors(&self, slot: SlotId) -> Result<()> {
        let layers = self.arena.links(slot)?;
        for layer_links in &layers {
            for &nb in layer_links {
                if nb == slot {
                    continue;
                }
                let handle = self.arena.slot_handle(nb)?;
                let mut guard = write_lock(&handle.links, "links")?;
                for layer_list in guard.iter_mut() {
                    layer_list.retain(|&x| x != slot);
                }
            }
        }
        Ok(())
    }

    fn connect(&self, new_id: SlotId, new_vec: &[f32], level: u32) -> Result<()> {
        let entry = self.entry_point()?;
        let Some(entry) = entry else {
            self.promote_entry(new_id, level)?;
            return Ok(());
        };

        let mut visited = self.visited_pool.acquire(self.arena.capacity()?);
        let mut current = self.greedy_descend(new_vec, entry.slot, entry.level, level, &mut visited)?;

        let top_search_layer = level.min(entry.level);
        for layer in (0..=top_search_layer).rev() {
            visited.reset();
            let m_layer = self.m_for_layer(layer);
            let candidates = self.search_layer(
                new_vec,
                &[current],
                self.ef_construction.max(m_layer),
                layer,
                &mut visited,
            )?;
            let chosen = self.select_neighbors_heuristic(candidates.clone(), m_layer)?;
            self.apply_layer_links(new_id, new_vec, layer, &chosen)?;
            if let Some(best) = candidates.first() {
                current = best.id;
            }
        }

        if level > entry.level {
            self.promote_entry(new_id, level)?;
        }
        Ok(())
    }

    fn promote_entry(&self, slot: SlotId, level: u32) -> Result<()> {
        let mut entry = write_lock(&self.entry, "entry")?;
        let should_promote = entry.is_none_or(|e| level > e.level);
        if should_promote {
            tracing::debug!(slot, level, "promoting entry point");
            *entry = Some(EntryPoint { slot, level });
        }
        Ok(())
    }

    /// Single-candidate greedy descent from `(start, start_layer)` down to
    /// just above `target_layer`, exclusive.
    fn greedy_descend(
        &self,
        query: &[f32],
        start: SlotId,
        start_layer: u32,
        target_layer: u32,
        visited: &mut crate::concurrency::VisitedList,
    ) -> Result<SlotId> {
        let _ = visited; // greedy descent does not need cross-layer visited tracking
        let mut current = start;
        let mut current_dist = self.distance_to_slot(query, current)?;
        if target_layer >= start_layer {
            return Ok(current);
        }
        for layer in ((target_layer + 1)..=start_layer).rev() {
            loop {
                let neighbor_ids = {
                    let links = self.arena.links(current)?;
                    links.get(layer as usize).cloned().unwrap_or_default()
                };
                let mut improved = false;
                for nb in neighbor_ids {
                    let d = self.distance_to_slot(query, nb)?;
                    if d < current_dist {
                        current_dist = d;
                        current = nb;
                        improved = true;
                    }
                }
                if !improved {
                    break;
                }
            }
        }
        Ok(current)
    }

    /// Beam search at a single layer, width `ef` (§4.D step 5 / §4.D
    /// search step 3).
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[SlotId],
        ef: usize,
        layer: u32,
        visited: &mut crate::concurrency::VisitedList,
    ) -> Result<Vec<Candidate>> {
        use std::collections::BinaryHeap;
        use std::cmp::Reverse;

        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.is_visited(ep) {
                continue;
            }
            visited.mark(ep);
            let dist = self.distance_to_slot(query, ep)?;
            let c = Candidate { dist, id: ep };
            frontier.push(Reverse(c));
            results.push(c);
        }

        while let Some(Reverse(c)) = frontier.pop() {
            if let Some(&worst) = results.peek().as_ref() {
                if results.len() >= ef && c.dist > worst.dist {
                    break;
                }
            }
            let neighbor_ids = {
                let links = self.arena.links(c.id)?;
                links.get(layer as usize).cloned().unwrap_or_default()
            };
            for nb in neighbor_ids {
                if visited.is_visited(nb) {
                    continue;
                }
                visited.mark(nb);
                let dist = self.distance_to_slot(query, nb)?;
                let worse_than_worst = results.peek().is_some_and(|w| dist >= w.dist);
                if results.len() < ef || !worse_than_worst {
                    let cand = Candidate { dist, id: nb };
                    frontier.push(Reverse(cand));
                    results.push(cand);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<Candidate> = results.into_vec();
        out.sort();
        Ok(out)
    }

    /// Diversity-preserving neighbor selection: `candidates`
    /// must already be sorted ascending by distance to the reference point
    /// (the new point for insertion, the owner for pruning).
    fn select_neighbors_heuristic(&self, candidates: Vec<Candidate>, m: usize) -> Result<Vec<SlotId>> {
        let mut selected: Vec<Candidate> = Vec::with_capacity(m.min(candidates.len()));
        for c in candidates {
            if selected.len() >= m {
                break;
            }
            let mut dominated = false;
            for s in &selected {
                if self.distance_between_slots(c.id, s.id)? <= c.dist {
                    dominated = true;
                    break;
                }
            }
            if !dominated {
                selected.push(c);
            }
        }
        Ok(selected.into_iter().map(|c| c.id).collect())
    }

    /// Installs `new_id <-> chosen` edges at `layer`, pruning any neighbor
    /// whose list now exceeds `M_layer`. Locks every
    /// touched slot's `links` in ascending id order up front so that two
    /// concurrent inserts sharing a neighbor never deadlock.
    fn apply_layer_links(&self, new_id: SlotId, new_vec: &[f32], layer: u32, chosen: &[SlotId]) -> Result<()> {
        let m_layer = self.m_for_layer(layer);
        let mut ids: Vec<SlotId> = chosen.to_vec();
        ids.push(new_id);
        ids.sort_unstable();
        ids.dedup();

        let mut handles: Vec<(SlotId, Arc<Slot>)> = Vec::with_capacity(ids.len());
        for &id in &ids {
            handles.push((id, self.arena.slot_handle(id)?));
        }
        let mut guards: Vec<(SlotId, std::sync::RwLockWriteGuard<'_, Vec<Vec<SlotId>>>)> =
            Vec::with_capacity(handles.len());
        for (id, handle) in &handles {
            guards.push((*id, write_lock(&handle.links, "links")?));
        }

        {
            let (_, new_guard) = guards
                .iter_mut()
                .find(|(id, _)| *id == new_id)
                .expect("new_id must be locked");
            ensure_layer(new_guard, layer);
            for &nb in chosen {
                if !new_guard[layer as usize].contains(&nb) {
                    new_guard[layer as usize].push(nb);
                }
            }
        }

        for &nb in chosen {
            let nb_vec = self.arena.vector(nb)?;
            let (_, guard) = guards
                .iter_mut()
                .find(|(id, _)| *id == nb)
                .expect("neighbor must be locked");
            ensure_layer(guard, layer);
            if !guard[layer as usize].contains(&new_id) {
                guard[layer as usize].push(new_id);
            }
            if guard[layer as usize].len() > m_layer {
                let current = guard[layer as usize].clone();
                let mut cands: Vec<Candidate> = Vec::with_capacity(current.len());
                for id in current {
                    let v = if id == new_id { new_vec.to_vec() } else { self.arena.vector(id)? };
                    cands.push(Candidate { dist: self.space.distance(&nb_vec, &v), id });
                }
                cands.sort();
                let kept = self.select_neighbors_heuristic(cands, m_layer)?;
                guard[layer as usize] = kept;
            }
        }
        Ok(())
    }

    // ---- search ------------------------------------------------------

    /// `knn`. Never fabricates entries: returns
    /// `min(k, live matching results found)`.
    pub fn knn(&self, query: &[f32], k: usize, filter: &dyn Filter) -> Result<Vec<(u64, f32)>> {
        if query.len() != self.arena.dim() {
            return Err(IndexError::InvalidArgument(format!(
                "query has dimension {} but index expects {}",
                query.len(),
                self.arena.dim()
            )));
        }
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be >= 1".into()));
        }

        let mut q = query.to_vec();
        if self.cosine {
            normalize_in_place(&mut q)?;
        }

        let _structural = self.structural.read()?;
        let Some(entry) = self.entry_point()? else {
            return Ok(Vec::new());
        };

        let mut visited = self.visited_pool.acquire(self.arena.capacity()?);
        let current = self.greedy_descend(&q, entry.slot, entry.level, 0, &mut visited)?;

        let ef = self.get_ef().max(k);
        visited.reset();
        let candidates = self.search_layer(&q, &[current], ef, 0, &mut visited)?;

        let mut out = Vec::with_capacity(k.min(candidates.len()));
        for c in candidates {
            if out.len() == k {
                break;
            }
            let meta = self.arena.meta(c.id)?;
            if !meta.allocated || meta.tombstone {
                continue;
            }
            if !filter.allows(meta.label) {
                continue;
            }
            out.push((meta.label, c.dist));
        }
        Ok(out)
    }

    // ---- deletion ------------------------------------------------------

    /// `mark_deleted`. Idempotent on an already-deleted label.
    pub fn mark_deleted(&self, label: u64) -> Result<()> {
        let _structural = self.structural.read()?;
        let slot = self.labels.lookup(label)?.ok_or(IndexError::LabelNotFound(label))?;
        let outcome = self.arena.with_meta_mut(slot, |m| {
            if !m.allocated {
                return None;
            }
            if m.tombstone {
                return Some(false);
            }
            m.tombstone = true;
            Some(true)
        })?;
        match outcome {
            None => Err(IndexError::LabelNotFound(label)),
            Some(false) => Ok(()),
            Some(true) => {
                tracing::debug!(slot, label, "tombstoned slot");
                lock_mutex(&self.tombstones, "tombstone set")?.push(slot);
                self.mark_dirty(slot)?;
                self.maybe_replace_entry_point(slot)?;
                Ok(())
            }
        }
    }

    /// `unmark_deleted`.
    pub fn unmark_deleted(&self, label: u64) -> Result<()> {
        let _structural = self.structural.read()?;
        let slot = self.labels.lookup(label)?.ok_or(IndexError::LabelNotFound(label))?;
        let changed = self.arena.with_meta_mut(slot, |m| {
            if !m.allocated || !m.tombstone {
                return false;
            }
            m.tombstone = false;
            true
        })?;
        if changed {
            lock_mutex(&self.tombstones, "tombstone set")?.retain(|&x| x != slot);
            self.mark_dirty(slot)?;
        }
        Ok(())
    }

    fn maybe_replace_entry_point(&self, deleted_slot: SlotId) -> Result<()> {
        let mut entry = write_lock(&self.entry, "entry")?;
        let Some(current) = *entry else { return Ok(()) };
        if current.slot != deleted_slot {
            return Ok(());
        }
        let mut level = current.level;
        loop {
            if let Some(replacement) = self.find_live_slot_at_level(level)? {
                *entry = Some(EntryPoint { slot: replacement, level });
                return Ok(());
            }
            if level == 0 {
                *entry = None;
                return Ok(());
            }
            level -= 1;
        }
    }

    fn find_live_slot_at_level(&self, level: u32) -> Result<Option<SlotId>> {
        self.find_live_slot_at_level_excluding(level, u32::MAX)
    }

    /// As [`Graph::find_live_slot_at_level`], but never returns `exclude`
    /// (used when the slot being excluded is itself still live and would
    /// otherwise trivially satisfy the scan).
    fn find_live_slot_at_level_excluding(&self, level: u32, exclude: SlotId) -> Result<Option<SlotId>> {
        let slots = self.arena.snapshot()?;
        for (id, slot) in slots.iter().enumerate() {
            let id = id as u32;
            if id == exclude {
                continue;
            }
            let meta = *read_lock(&slot.meta, "meta")?;
            if meta.allocated && !meta.tombstone && meta.level >= level {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// `get_data_by_label`.
    pub fn get_data_by_label(&self, label: u64) -> Result<Vec<f32>> {
        let slot = self.labels.lookup(label)?.ok_or(IndexError::LabelNotFound(label))?;
        let meta = self.arena.meta(slot)?;
        if !meta.allocated {
            return Err(IndexError::LabelNotFound(label));
        }
        if meta.tombstone {
            return Err(IndexError::LabelDeleted(label));
        }
        if let Some(original) = self.arena.original(slot)? {
            return Ok(original);
        }
        self.arena.vector(slot)
    }

    /// Validates invariants 1-4 of §3 against the current in-memory state.
    pub fn check_integrity(&self) -> Result<()> {
        let result = self.check_integrity_inner();
        if let Err(ref e) = result {
            tracing::error!(error = %e, "check_integrity found a graph invariant violation");
        }
        result
    }

    fn check_integrity_inner(&self) -> Result<()> {
        let _structural = self.structural.read()?;
        let capacity = self.arena.capacity()? as u32;
        let slots = self.arena.snapshot()?;
        for (idx, slot) in slots.iter().enumerate() {
            let id = idx as u32;
            let meta = *read_lock(&slot.meta, "meta")?;
            if !meta.allocated || meta.tombstone {
                continue;
            }
            let links = read_lock(&slot.links, "links")?;
            for (layer, neighbors) in links.iter().enumerate() {
                let layer = layer as u32;
                if layer > meta.level {
                    if !neighbors.is_empty() {
                        return Err(IndexError::Corruption(format!(
                            "slot {id} has links at layer {layer} above its level {}",
                            meta.level
                        )));
                    }
                    continue;
                }
                let cap = self.m_for_layer(layer);
                if neighbors.len() > cap {
                    return Err(IndexError::Corruption(format!(
                        "slot {id} layer {layer} has {} neighbors, exceeding cap {cap}",
                        neighbors.len()
                    )));
                }
                let mut seen = HashSet::new();
                for &nb in neighbors {
                    if nb == id {
                        return Err(IndexError::Corruption(format!(
                            "slot {id} links to itself at layer {layer}"
                        )));
                    }
                    if nb >= capacity {
                        return Err(IndexError::Corruption(format!(
                            "slot {id} links to out-of-range slot {nb}"
                        )));
                    }
                    if !seen.insert(nb) {
                        return Err(IndexError::Corruption(format!(
                            "slot {id} has duplicate neighbor {nb} at layer {layer}"
                        )));
                    }
                    let nb_meta = *read_lock(&slots[nb as usize].meta, "meta")?;
                    if nb_meta.level < layer {
                        return Err(IndexError::Corruption(format!(
                            "slot {id} links to slot {nb} at layer {layer}, but {nb}'s level is only {}",
                            nb_meta.level
                        )));
                    }
                }
            }
            if self.labels.lookup(meta.label)? != Some(id) {
                return Err(IndexError::Corruption(format!(
                    "label {} does not resolve back to slot {id}",
                    meta.label
                )));
            }
        }
        if let Some(entry) = *read_lock(&self.entry, "entry")? {
            let entry_meta = *read_lock(&slots[entry.slot as usize].meta, "meta")?;
            if !entry_meta.allocated || entry_meta.tombstone {
                return Err(IndexError::Corruption("entry point slot is not live".into()));
            }
        }
        Ok(())
    }
}

fn ensure_layer(links: &mut Vec<Vec<SlotId>>, layer: u32) {
    while links.len() <= layer as usize {
        links.push(Vec::new());
    }
}
