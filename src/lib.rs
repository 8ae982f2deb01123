//! # hnswdb
//!
//! An embeddable **Hierarchical Navigable Small World (HNSW)** vector
//! index. Approximate nearest-neighbor search over L2, raw inner-product,
//! or cosine distance, with soft deletes, slot reuse, and a snapshot or
//! paged on-disk format.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       Index (boundary)                   │
//! │        init / load / add / knn / mark_deleted / ...      │
//! │        thread-local last-error relay                     │
//! └───────────────────────────┬────────────────────────────────┘
//!                             │
//! ┌───────────────────────────▼────────────────────────────────┐
//! │                         Graph                               │
//! │  entry point · greedy descent · beam search ·               │
//! │  heuristic neighbor selection · soft delete                 │
//! └──────┬──────────────┬──────────────┬────────────┬──────────┘
//!        │              │              │            │
//! ┌──────▼─────┐ ┌──────▼──────┐ ┌─────▼──────┐ ┌───▼────────┐
//! │   Arena     │ │   Labels    │ │   Space    │ │ Concurrency │
//! │ slots, links│ │ label→slot  │ │ distance   │ │ locks, the  │
//! │ + metadata  │ │ directory   │ │ functions   │ │ visited-list│
//! │             │ │             │ │            │ │ pool        │
//! └─────────────┘ └─────────────┘ └────────────┘ └─────────────┘
//!
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Persistence                          │
//! │   CRC-checksummed header + 4 regions, snapshot or paged    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`index`] | The operational surface — `init`, `load`, `add`, `knn`, deletes, persistence, error relay |
//! | [`graph`] | The HNSW algorithm: insertion, beam search, neighbor selection, soft delete, integrity checks |
//! | [`arena`] | Slot storage: per-slot vector, metadata, and per-layer neighbor lists |
//! | [`labels`] | Caller-facing `u64` label to internal slot id directory |
//! | [`space`] | L2 / inner-product / cosine distance functions and vector normalization |
//! | [`concurrency`] | The structural read/write lock and the pooled visited-list allocator |
//! | [`persistence`] | On-disk image encode/decode, snapshot and paged (directory) modes |
//! | [`config`] | `IndexConfig`, `SpaceKind`, `PersistenceMode` |
//! | [`error`] | The crate-wide `IndexError` / `Result` |
//! | [`encoding`] | Hand-rolled deterministic binary encode/decode used by persistence |
//!
//! ## Key Features
//!
//! - **Probabilistic multi-layer graph** — level sampling with
//!   `mL = 1 / ln(M)`, greedy descent from the entry point, and
//!   `ef_construction`/`ef_search`-bounded beam search at each layer.
//! - **Heuristic neighbor selection** — prunes to a diverse neighbor set
//!   rather than simply keeping the `M` closest, the way the reference
//!   algorithm avoids clustering all edges on one side of a point.
//! - **Soft delete with optional slot reuse** — `mark_deleted` tombstones a
//!   label without touching the graph's edges; `add(.., replace_deleted =
//!   true)` may reclaim a tombstoned slot once the arena is full.
//! - **Block-level CRC32 integrity** — the on-disk header and every region
//!   (metadata, vectors/links, label directory, original vectors) carries
//!   its own checksum.
//! - **Two persistence modes** — a single-file snapshot, or a directory
//!   pair (`header.bin` + `regions.bin`) that `persist_dirty` can flush
//!   incrementally.
//! - **`check_integrity`** — walks every invariant in the data model (no
//!   links above level, link counts within cap, no self-links, no
//!   dangling label bindings) and reports the first violation found.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hnswdb::config::{PersistenceMode, SpaceKind};
//! use hnswdb::index::Index;
//!
//! let index = Index::init(
//!     /* dim */ 128,
//!     SpaceKind::Cosine,
//!     /* capacity */ 10_000,
//!     /* m */ 16,
//!     /* ef_construction */ 200,
//!     /* seed */ 42,
//!     /* allow_replace_deleted */ true,
//!     /* store_original */ true,
//!     PersistenceMode::InMemory,
//! ).unwrap();
//!
//! let vector = vec![0.0f32; 128];
//! index.add(&vector, /* label */ 1, false).unwrap();
//!
//! let hits = index.knn(&vector, 10, None, None).unwrap();
//! assert_eq!(hits[0].0, 1);
//!
//! index.mark_deleted(1).unwrap();
//! assert!(index.get(1).is_err());
//! ```

#![allow(dead_code)]

pub mod arena;
pub mod concurrency;
pub mod config;
pub mod encoding;
pub mod error;
pub mod graph;
pub mod index;
pub mod labels;
pub mod persistence;
pub mod space;

pub use config::{IndexConfig, PersistenceMode, SpaceKind};
pub use error::{IndexError, Result};
pub use index::Index;
