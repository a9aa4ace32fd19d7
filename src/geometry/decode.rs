//! Regression-delta decoding.
//!
//! A delta `(tx, ty, tw, th)` shifts a box center by a fraction of its extent
//! and scales the extent exponentially:
//!
//! ```text
//! cx1 = tx * w + cx        w1 = exp(tw) * w
//! cy1 = ty * h + cy        h1 = exp(th) * h
//! ```
//!
//! The result is returned in top-left form with every component rounded to
//! the nearest integer (ties to even). When any intermediate value is not
//! finite, typically `exp` overflowing, the input box is handed back unchanged
//! as [`Decoded::Fallback`].

use ndarray::{ArrayView3, ArrayViewMut3, Axis, Zip};

use crate::geometry::CenterBox;
use crate::util::math::{all_finite, round_even};
use crate::util::{RpnRoiError, RpnRoiResult};

/// Center-form regression delta predicted for one anchor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegressionDelta {
    pub tx: f64,
    pub ty: f64,
    pub tw: f64,
    pub th: f64,
}

impl RegressionDelta {
    pub fn new(tx: f64, ty: f64, tw: f64, th: f64) -> Self {
        Self { tx, ty, tw, th }
    }

    /// Divides each component by its standard-deviation scale.
    pub fn unscale(self, std_scaling: [f64; 4]) -> Self {
        Self {
            tx: self.tx / std_scaling[0],
            ty: self.ty / std_scaling[1],
            tw: self.tw / std_scaling[2],
            th: self.th / std_scaling[3],
        }
    }
}

/// Outcome of decoding one box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decoded {
    /// The delta was applied.
    Refined(CenterBox),
    /// The arithmetic produced a non-finite value; holds the input box.
    Fallback(CenterBox),
}

impl Decoded {
    /// Returns the box regardless of outcome.
    pub fn into_box(self) -> CenterBox {
        match self {
            Decoded::Refined(b) | Decoded::Fallback(b) => b,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Decoded::Fallback(_))
    }
}

/// Applies `delta` to `anchor`.
pub fn apply_regr(anchor: CenterBox, delta: RegressionDelta) -> Decoded {
    let (cx, cy) = anchor.center();
    let cx1 = delta.tx * anchor.w + cx;
    let cy1 = delta.ty * anchor.h + cy;
    let w1 = delta.tw.exp() * anchor.w;
    let h1 = delta.th.exp() * anchor.h;
    let x1 = cx1 - w1 / 2.0;
    let y1 = cy1 - h1 / 2.0;

    if !all_finite(&[cx1, cy1, w1, h1, x1, y1]) {
        return Decoded::Fallback(anchor);
    }

    Decoded::Refined(CenterBox::new(
        round_even(x1),
        round_even(y1),
        round_even(w1),
        round_even(h1),
    ))
}

/// Per-grid decode counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Cells whose delta was applied.
    pub refined: usize,
    /// Cells left at their undecoded value.
    pub fallback: usize,
}

impl DecodeStats {
    /// Sums two sets of counts.
    pub fn merge(self, other: DecodeStats) -> DecodeStats {
        DecodeStats {
            refined: self.refined + other.refined,
            fallback: self.fallback + other.fallback,
        }
    }
}

/// Decodes a whole `(4, rows, cols)` grid of center-form boxes in place.
///
/// Axis 0 of `boxes` holds `(x, y, w, h)` and axis 0 of `deltas` holds
/// `(tx, ty, tw, th)`. Each cell is decoded exactly as [`apply_regr`] would;
/// a cell that falls back keeps its input value without affecting its
/// neighbours.
pub fn apply_regr_grid(
    mut boxes: ArrayViewMut3<'_, f64>,
    deltas: ArrayView3<'_, f64>,
) -> RpnRoiResult<DecodeStats> {
    if boxes.len_of(Axis(0)) != 4 {
        return Err(RpnRoiError::ShapeMismatch {
            context: "box grid components",
            expected: 4,
            got: boxes.len_of(Axis(0)),
        });
    }
    if boxes.shape() != deltas.shape() {
        return Err(RpnRoiError::InvalidInput(
            "box grid and delta grid must have the same shape",
        ));
    }

    let mut stats = DecodeStats::default();
    Zip::from(boxes.lanes_mut(Axis(0)))
        .and(deltas.lanes(Axis(0)))
        .for_each(|mut cell, delta| {
            let anchor = CenterBox::new(cell[0], cell[1], cell[2], cell[3]);
            let delta = RegressionDelta::new(delta[0], delta[1], delta[2], delta[3]);
            match apply_regr(anchor, delta) {
                Decoded::Refined(decoded) => {
                    for (dst, src) in cell.iter_mut().zip(decoded.to_array()) {
                        *dst = src;
                    }
                    stats.refined += 1;
                }
                Decoded::Fallback(_) => stats.fallback += 1,
            }
        });

    Ok(stats)
}
