//! Distance space.
//!
//! The space is a tagged variant rather than a `dyn Trait` object: the hot
//! path (every candidate expansion during insertion and search) calls
//! [`DistanceSpace::distance`], and monomorphizing on a two-variant enum
//! avoids a vtable indirection on a call made millions of times per query.

use crate::config::SpaceKind;
use crate::error::{IndexError, Result};

/// Smaller-is-closer distance over fixed-dimension `f32` vectors.
#[derive(Debug, Clone, Copy)]
pub enum DistanceSpace {
    /// Squared Euclidean distance.
    L2,
    /// `1 - ⟨x, y⟩`. `normalize` is `true` for cosine spaces, where callers
    /// must have already unit-normalized both operands.
    InnerProduct {
        /// Whether vectors passed to this space are expected pre-normalized.
        normalize: bool,
    },
}

impl DistanceSpace {
    /// Builds the space's runtime representation from its configuration tag.
    pub fn from_kind(kind: SpaceKind) -> Self {
        match kind {
            SpaceKind::L2 => DistanceSpace::L2,
            SpaceKind::InnerProduct => DistanceSpace::InnerProduct { normalize: false },
            SpaceKind::Cosine => DistanceSpace::InnerProduct { normalize: true },
        }
    }

    /// Whether vectors must be unit-normalized before being handed to this
    /// space (true only for cosine).
    pub fn normalizes(&self) -> bool {
        matches!(self, DistanceSpace::InnerProduct { normalize: true })
    }

    /// Computes `d(a, b)`. Both slices must have equal length; the caller
    /// (the graph core) is responsible for dimension validation, since it
    /// already has the configured `dim` on hand and can produce a better
    /// error message than this hot-path function should.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            DistanceSpace::L2 => l2_squared(a, b),
            DistanceSpace::InnerProduct { .. } => 1.0 - dot(a, b),
        }
    }
}

#[inline]
fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Unit-normalizes `v` in place. Returns [`IndexError::InvalidArgument`] for
/// a zero (or near-zero) vector, which has no well-defined direction.
pub fn normalize_in_place(v: &mut [f32]) -> Result<()> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return Err(IndexError::InvalidArgument(
            "cannot normalize a zero-norm vector under a cosine space".into(),
        ));
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(())
}
