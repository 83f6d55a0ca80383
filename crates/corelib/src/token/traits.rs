//! Core token trait definitions.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A position on the hash ring.
///
/// Tokens are immutable, totally ordered coordinates. The ring is the closed
/// interval `[MIN, MAX]` with `MAX` wrapping back to `MIN`.
pub trait Token: Copy + Ord + Hash + Send + Sync + Debug + Display + 'static {
    /// Minimum token value (start of ring).
    const MIN: Self;
    /// Maximum token value (end of ring).
    const MAX: Self;

    /// Position normalised to `[0, 1)`.
    fn fraction(&self) -> f64;

    /// Inverse of [`fraction`](Token::fraction). Returns `None` when
    /// `fraction` is not a finite value in `[0, 1)`.
    fn from_fraction(fraction: f64) -> Option<Self>;
}

/// Returns `true` when `fraction` can be mapped onto the ring.
#[inline]
pub(crate) fn in_unit_range(fraction: f64) -> bool {
    fraction.is_finite() && (0.0..1.0).contains(&fraction)
}
