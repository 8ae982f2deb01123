//! Crate-wide error type.
//!
//! Mirrors the layering used across the storage subsystems: each concern
//! that can fail on its own (encoding, persistence I/O) gets its own
//! [`thiserror::Error`] enum, and [`IndexError`] composes them with `#[from]`
//! conversions so callers deal with a single error type at the boundary.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::encoding::EncodingError;
use thiserror::Error;

/// Errors returned by every fallible operation on [`crate::index::Index`].
#[derive(Debug, Error)]
pub enum IndexError {
    /// `add` was called without `replace_deleted` while the arena is full.
    #[error("capacity exceeded: index is full at {capacity} elements")]
    CapacityExceeded {
        /// Current arena capacity.
        capacity: usize,
    },

    /// `get` / `mark_deleted` / `unmark_deleted` referenced a label that was
    /// never inserted.
    #[error("label {0} not found")]
    LabelNotFound(u64),

    /// `get` referenced a label whose slot is tombstoned.
    #[error("label {0} is deleted")]
    LabelDeleted(u64),

    /// Malformed caller input: dimension mismatch, zero-norm cosine vector,
    /// `ef < 1`, `k == 0`, an unknown space name, or a `resize` to a smaller
    /// capacity.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `init` called on an index that already has geometry.
    #[error("index already initialized")]
    AlreadyInitialized,

    /// An operation that requires geometry was called before `init`/`load`.
    #[error("index not initialized")]
    NotInitialized,

    /// Persistence I/O failure (missing file, permission, disk full).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A region of the on-disk image failed to decode.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A stable on-disk invariant did not hold on load, or `check_integrity`
    /// found a graph invariant violated in memory. The caller should treat
    /// the index as untrustworthy.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Internal invariant violation or poisoned lock. A lock is poisoned
    /// when some other thread panicked while holding it; rather than
    /// propagating that panic to every other thread sharing the same
    /// structural/entry/label lock, it is surfaced here as a recoverable
    /// error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Acquires `lock` for reading, mapping a poisoned lock to
/// [`IndexError::Internal`] instead of panicking the calling thread.
pub(crate) fn read_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> Result<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| {
        tracing::error!(what, "RwLock poisoned");
        IndexError::Internal(format!("{what} lock poisoned"))
    })
}

/// Acquires `lock` for writing, mapping a poisoned lock to
/// [`IndexError::Internal`] instead of panicking the calling thread.
pub(crate) fn write_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> Result<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| {
        tracing::error!(what, "RwLock poisoned");
        IndexError::Internal(format!("{what} lock poisoned"))
    })
}

/// Acquires `lock`, mapping a poisoned mutex to [`IndexError::Internal`]
/// instead of panicking the calling thread.
pub(crate) fn lock_mutex<'a, T>(lock: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    lock.lock().map_err(|_| {
        tracing::error!(what, "Mutex poisoned");
        IndexError::Internal(format!("{what} lock poisoned"))
    })
}
