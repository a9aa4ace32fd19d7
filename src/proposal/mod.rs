//! Turning raw RPN output into region proposals.
//!
//! [`rpn_to_roi`] runs the whole pipeline for one image: anchors are tiled
//! over the feature grid, refined by the regression map, clipped, flattened
//! alongside the objectness map and reduced by greedy suppression.

mod pipeline;

pub use pipeline::rpn_to_roi;

use ndarray::Array2;

use crate::candidate::Roi;
use crate::geometry::DecodeStats;
use crate::util::{RpnRoiError, RpnRoiResult};

/// Axis layout of the input tensors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DimOrdering {
    /// `(batch, rows, cols, channels)`.
    #[default]
    ChannelsLast,
    /// `(batch, channels, rows, cols)`.
    ChannelsFirst,
}

/// Call-time options for [`rpn_to_roi`].
#[derive(Clone, Debug, PartialEq)]
pub struct ProposalConfig {
    /// Apply the regression map to the anchors.
    pub use_regr: bool,
    /// Maximum number of proposals returned.
    pub max_boxes: usize,
    /// IoU above which lower-scoring proposals are suppressed.
    pub overlap_thresh: f64,
    /// Layout of the score and regression tensors.
    pub dim_ordering: DimOrdering,
    /// Fill anchor channels concurrently (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            use_regr: true,
            max_boxes: 5,
            overlap_thresh: 0.99,
            dim_ordering: DimOrdering::ChannelsLast,
            parallel: false,
        }
    }
}

impl ProposalConfig {
    pub fn validate(&self) -> RpnRoiResult<()> {
        if self.max_boxes == 0 {
            return Err(RpnRoiError::InvalidConfig {
                reason: "max_boxes must be at least 1",
            });
        }
        if !(0.0..=1.0).contains(&self.overlap_thresh) {
            return Err(RpnRoiError::InvalidConfig {
                reason: "overlap_thresh must lie in [0, 1]",
            });
        }
        Ok(())
    }
}

/// Proposals for one image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Proposals {
    /// Selected boxes in pick order.
    pub rois: Vec<Roi>,
    /// Number of non-degenerate candidates that entered suppression.
    pub num_candidates: usize,
    /// Regression decode outcome counts.
    pub decode: DecodeStats,
}

impl Proposals {
    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    /// Returns a `(k, 5)` table of `x1, y1, x2, y2, class_id` rows.
    ///
    /// The last column holds derived class indices, not objectness scores.
    pub fn to_table(&self) -> Array2<f64> {
        let mut table = Array2::zeros((self.rois.len(), 5));
        for (mut row, roi) in table.outer_iter_mut().zip(&self.rois) {
            let [x1, y1, x2, y2] = roi.bbox.to_array();
            row[0] = x1;
            row[1] = y1;
            row[2] = x2;
            row[3] = y2;
            row[4] = roi.class_id as f64;
        }
        table
    }
}
