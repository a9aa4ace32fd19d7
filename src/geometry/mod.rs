//! Box representations and the per-box arithmetic of the proposal pipeline.
//!
//! Two box encodings flow through the pipeline and are kept as distinct types:
//! [`CenterBox`] (top-left plus extent, used while decoding regression deltas)
//! and [`CornerBox`] (two corners, produced by clipping and consumed by
//! suppression). Conversion happens in exactly one place, [`CenterBox::to_corner`].

pub mod clip;
pub mod decode;

pub use clip::{finalize_box, GridExtent};
pub use decode::{apply_regr, apply_regr_grid, DecodeStats, Decoded, RegressionDelta};

use crate::util::math::IOU_EPS;

/// Box stored as top-left corner plus width and height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CenterBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub w: f64,
    /// Height.
    pub h: f64,
}

impl CenterBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Returns the box center.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Converts to corner form by adding the extent onto the origin.
    pub fn to_corner(self) -> CornerBox {
        CornerBox {
            x1: self.x,
            y1: self.y,
            x2: self.x + self.w,
            y2: self.y + self.h,
        }
    }

    pub(crate) fn to_array(self) -> [f64; 4] {
        [self.x, self.y, self.w, self.h]
    }
}

/// Box stored as top-left and bottom-right corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl CornerBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Area of the box; only meaningful for non-degenerate boxes.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns `true` when `x1 < x2` and `y1 < y2`.
    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    /// Intersection area with `other`, zero when the boxes are disjoint.
    pub fn intersection(&self, other: &CornerBox) -> f64 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        w * h
    }

    /// Intersection over union with a small epsilon in the denominator.
    pub fn iou(&self, other: &CornerBox) -> f64 {
        let inter = self.intersection(other);
        let union = self.area() + other.area() - inter;
        inter / (union + IOU_EPS)
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}
