//! Numeric helpers for box arithmetic.

/// Small constant added to IoU denominators so zero-area unions stay finite.
pub(crate) const IOU_EPS: f64 = 1e-6;

/// Rounds to the nearest integer, resolving ties to the even neighbour.
#[inline]
pub(crate) fn round_even(value: f64) -> f64 {
    value.round_ties_even()
}

/// Returns `true` when every value is finite.
#[inline]
pub(crate) fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}
