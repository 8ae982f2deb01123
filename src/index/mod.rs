//! Boundary — component G.
//!
//! [`Index`] is the operational surface callers actually hold: it owns an
//! [`IndexConfig`] and a [`Graph`], and additionally carries the
//! thread-local "last error" relay. That relay mirrors the
//! `extern "C"` shim this crate was distilled from (`rust/index/bindings.cpp`
//! in the reference sources), which wraps every call in a try/catch, stores
//! the exception's message in a `thread_local std::string last_error`, and
//! returns a sentinel (`nullptr`/`-1`/`false`) on the other side of the FFI
//! boundary. Every public method here goes through [`relay`] so a caller
//! riding on top of this crate through a C ABI can reconstruct that exact
//! contract without this crate needing to know anything about FFI itself.
//!
//! Two bugs present in that reference shim are deliberately not reproduced:
//! `add`'s `replace_deleted` argument is honored rather than silently
//! dropped, and there is exactly one code path that constructs a [`Graph`]
//! per `Index` (the reference `create_index` builds one, discards it, then
//! builds a second).

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::Path;

use crate::config::{IndexConfig, PersistenceMode, SpaceKind};
use crate::error::{IndexError, Result};
use crate::graph::{AllowDenyFilter, Graph};
use crate::persistence;

#[cfg(test)]
mod tests;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn set_last_error(err: &IndexError) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err.to_string()));
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Reads back this thread's most recent error message, if the last call on
/// this thread failed. Cleared by the next successful
/// call on the same thread.
pub fn get_last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Runs `f`, clearing the thread-local error on success and recording it on
/// failure. Every fallible [`Index`] method is one call to this.
fn relay<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match f() {
        Ok(v) => {
            clear_last_error();
            Ok(v)
        }
        Err(err) => {
            set_last_error(&err);
            Err(err)
        }
    }
}

/// An HNSW index: geometry, the graph itself, and how (if at all) it
/// persists to disk.
///
/// There is no "uninitialized" state to model: a caller only ever holds an
/// `Index` once [`Index::init`] or [`Index::load`] has already succeeded,
/// so `AlreadyInitialized`/`NotInitialized` (kept on [`IndexError`] for a
/// language binding built on top of this crate) never need to be raised
/// from inside it.
pub struct Index {
    graph: Graph,
    config: IndexConfig,
}

impl Index {
    /// `create_index(space, dim)` followed by `init_index(...)`,
    /// collapsed into a single fallible constructor — idiomatic Rust has no
    /// use for the two-phase create-then-init split the reference shim
    /// needs to hand a raw pointer across an FFI boundary.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        dim: usize,
        space: SpaceKind,
        capacity: usize,
        m: usize,
        ef_construction: usize,
        seed: u64,
        allow_replace_deleted: bool,
        store_original: bool,
        persistence_mode: PersistenceMode,
    ) -> Result<Self> {
        relay(|| {
            if dim == 0 {
                return Err(IndexError::InvalidArgument("dim must be >= 1".into()));
            }
            if m == 0 {
                return Err(IndexError::InvalidArgument("m must be >= 1".into()));
            }
            if ef_construction == 0 {
                return Err(IndexError::InvalidArgument(
                    "ef_construction must be >= 1".into(),
                ));
            }
            let config = IndexConfig {
                dim,
                space,
                m,
                ef_construction,
                seed,
                allow_replace_deleted,
                store_original,
                persistence: persistence_mode,
            };
            let graph = Graph::new(&config);
            graph.resize(capacity)?;
            tracing::info!(dim, capacity, m, ef_construction, ?space, "index initialized");
            Ok(Index { graph, config })
        })
    }

    /// `load_index(path, allow_replace_deleted, is_persistent_index)`.
    /// `allow_replace_deleted` is the caller's explicit policy for
    /// this session and overrides whatever was persisted, matching the
    /// reference loader rather than trusting the on-disk flag. Runs
    /// `check_integrity` before handing the index back, same as the
    /// reference `load_index` does unconditionally.
    pub fn load(path: impl AsRef<Path>, allow_replace_deleted: bool, persistent: bool) -> Result<Self> {
        relay(|| {
            let path = path.as_ref();
            let (mut config, graph) = if persistent {
                persistence::load_persistent(path)?
            } else {
                persistence::load_snapshot(path, PersistenceMode::Snapshot { path: path.to_path_buf() })?
            };
            config.allow_replace_deleted = allow_replace_deleted;
            graph.set_allow_replace_deleted(allow_replace_deleted);
            graph.check_integrity()?;
            tracing::info!(path = %path.display(), persistent, "index loaded");
            Ok(Index { graph, config })
        })
    }

    /// `add_item(vec, label, replace_deleted)`.
    pub fn add(&self, vector: &[f32], label: u64, replace_deleted: bool) -> Result<()> {
        relay(|| {
            self.graph.add_point(label, vector, replace_deleted)?;
            Ok(())
        })
    }

    /// `get_data_by_label(label)`.
    pub fn get(&self, label: u64) -> Result<Vec<f32>> {
        relay(|| self.graph.get_data_by_label(label))
    }

    /// `mark_deleted(label)`.
    pub fn mark_deleted(&self, label: u64) -> Result<()> {
        relay(|| self.graph.mark_deleted(label))
    }

    /// `unmark_deleted(label)`.
    pub fn unmark_deleted(&self, label: u64) -> Result<()> {
        relay(|| self.graph.unmark_deleted(label))
    }

    /// `knn_query(query, k, allow_list, deny_list)` with an allow/deny
    /// filter functor. Results are closest-first and never exceed `k`.
    pub fn knn(
        &self,
        query: &[f32],
        k: usize,
        allow: Option<&HashSet<u64>>,
        deny: Option<&HashSet<u64>>,
    ) -> Result<Vec<(u64, f32)>> {
        relay(|| {
            let filter = AllowDenyFilter { allow, deny };
            self.graph.knn(query, k, &filter)
        })
    }

    /// Current beam width used by `knn` (`ef_`).
    pub fn get_ef(&self) -> usize {
        self.graph.get_ef()
    }

    /// `set_ef(ef)`.
    pub fn set_ef(&self, ef: usize) -> Result<()> {
        relay(|| self.graph.set_ef(ef))
    }

    /// Number of live (non-tombstoned) points.
    pub fn len(&self) -> Result<usize> {
        relay(|| self.graph.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        relay(|| self.graph.is_empty())
    }

    /// `capacity()`.
    pub fn capacity(&self) -> Result<usize> {
        relay(|| self.graph.capacity())
    }

    /// `resize_index(new_capacity)`. Rejects shrinking.
    pub fn resize(&self, new_capacity: usize) -> Result<()> {
        relay(|| self.graph.resize(new_capacity))
    }

    /// Exposes `Graph::check_integrity` as a directly callable operation,
    /// rather than only ever running it implicitly from `load`.
    pub fn check_integrity(&self) -> Result<()> {
        relay(|| self.graph.check_integrity())
    }

    /// Writes the full index image to `path`, regardless of the
    /// persistence mode the index was opened with.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        relay(|| persistence::save_snapshot(&self.graph, &self.config, path.as_ref()))
    }

    /// `persist_dirty()`. A no-op for `InMemory` indexes; writes a
    /// full snapshot for `Snapshot` mode; flushes only touched slots for
    /// `Persistent` mode.
    pub fn persist_dirty(&self) -> Result<()> {
        relay(|| match &self.config.persistence {
            PersistenceMode::InMemory => Ok(()),
            PersistenceMode::Snapshot { path } => {
                persistence::save_snapshot(&self.graph, &self.config, path)
            }
            PersistenceMode::Persistent { dir } => persistence::persist_dirty(&self.graph, &self.config, dir),
        })
    }

    pub fn dim(&self) -> usize {
        self.graph.dim()
    }

    pub fn space(&self) -> SpaceKind {
        self.config.space
    }

    pub fn allow_replace_deleted(&self) -> bool {
        self.graph.allow_replace_deleted()
    }
}

/// Opens whatever mode `config.persistence` describes and calls
/// [`Index::load`] with its own `allow_replace_deleted`. Convenience for
/// callers that already have a config on hand (e.g. re-opening after a
/// restart) rather than threading the path/mode through by hand.
pub fn open(path: impl AsRef<Path>, config: &IndexConfig) -> Result<Index> {
    let persistent = matches!(config.persistence, PersistenceMode::Persistent { .. });
    Index::load(path, config.allow_replace_deleted, persistent)
}
