//! Index configuration.
//!
//! [`IndexConfig`] groups the geometry parameters that are fixed for the
//! lifetime of an [`crate::index::Index`], one field per tunable with its
//! own doc comment, plus the persistence mode the index was opened with.

use std::path::PathBuf;

/// Which distance space the index was built for.
///
/// `Cosine` and `InnerProduct` share the same underlying transform
/// (`1 - ⟨x, y⟩`); `Cosine` additionally unit-normalizes every vector at
/// insertion and query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    /// Squared Euclidean distance.
    L2,
    /// Raw inner product, transformed to `1 - ⟨x, y⟩`.
    InnerProduct,
    /// Inner product over unit-normalized vectors.
    Cosine,
}

impl SpaceKind {
    /// Encodes the space as the on-disk flag bits (see [`crate::persistence`]).
    pub(crate) fn normalize(self) -> bool {
        matches!(self, SpaceKind::Cosine)
    }
}

/// How the index persists its slot store to disk.
#[derive(Debug, Clone)]
pub enum PersistenceMode {
    /// No backing file; `persist_dirty` is a no-op and `save`/`load` are the
    /// only way to move data to/from disk.
    InMemory,
    /// Single-file image, written in full by `save` and read in full by
    /// `load`. Simpler, but every save rewrites the whole index.
    Snapshot {
        /// Path to the snapshot file.
        path: PathBuf,
    },
    /// Paged directory with dirty-page tracking; `persist_dirty` flushes
    /// only pages touched since the last flush.
    Persistent {
        /// Directory holding the header and region files.
        dir: PathBuf,
    },
}

/// Immutable geometry and lifecycle configuration for an [`crate::index::Index`].
///
/// Constructed once at `Index::init` / `Index::load` time; every field here
/// is treated as fixed for the life of the index (see the data model's
/// "Geometry parameters" note).
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Vector dimensionality. Every inserted or queried vector must match.
    pub dim: usize,

    /// Distance space.
    pub space: SpaceKind,

    /// Max neighbors per slot at layers above 0 (`M_0 = 2*m` is used at
    /// layer 0).
    pub m: usize,

    /// Beam width used while inserting.
    pub ef_construction: usize,

    /// Seed for level sampling; two indexes built with the same seed and
    /// insertion order produce the same graph shape.
    pub seed: u64,

    /// Whether `add(.., replace_deleted = true)` is permitted to reuse
    /// tombstoned slots at all. When `false`, every insert must allocate a
    /// fresh slot regardless of what the caller passes.
    pub allow_replace_deleted: bool,

    /// When the space is `Cosine`, additionally retain the pre-normalization
    /// vector so `get` can return the caller's original values.
    pub store_original: bool,

    /// Persistence backing.
    pub persistence: PersistenceMode,
}

impl IndexConfig {
    /// `M_0`, the layer-0 neighbor cap (`2 * m`).
    pub(crate) fn m0(&self) -> usize {
        self.m * 2
    }
}
