//! Minimum-size enforcement and clipping to the feature grid.

use crate::geometry::{CenterBox, CornerBox};

/// Smallest width or height a decoded anchor may have, in grid cells.
pub const MIN_BOX_SIDE: f64 = 1.0;

/// Spatial extent of the feature grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridExtent {
    pub rows: usize,
    pub cols: usize,
}

impl GridExtent {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of cells per anchor channel.
    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.cells() == 0
    }

    /// Largest valid x coordinate.
    pub fn max_x(&self) -> f64 {
        self.cols as f64 - 1.0
    }

    /// Largest valid y coordinate.
    pub fn max_y(&self) -> f64 {
        self.rows as f64 - 1.0
    }
}

/// Raises width and height to at least [`MIN_BOX_SIDE`].
pub fn clamp_min_size(b: CenterBox) -> CenterBox {
    CenterBox::new(b.x, b.y, b.w.max(MIN_BOX_SIDE), b.h.max(MIN_BOX_SIDE))
}

/// Clips the top-left corner to be non-negative and the bottom-right corner
/// to the last grid row/column.
///
/// Each corner is only clipped on one side, so a box lying entirely outside
/// the grid comes out degenerate and is dropped later by flattening.
pub fn clip_to_grid(b: CornerBox, extent: GridExtent) -> CornerBox {
    CornerBox::new(
        b.x1.max(0.0),
        b.y1.max(0.0),
        b.x2.min(extent.max_x()),
        b.y2.min(extent.max_y()),
    )
}

/// Turns a decoded center-form box into the clipped corner-form box stored in
/// the anchor accumulator.
pub fn finalize_box(b: CenterBox, extent: GridExtent) -> CornerBox {
    clip_to_grid(clamp_min_size(b).to_corner(), extent)
}
