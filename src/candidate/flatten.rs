//! Flattening of the anchor accumulator into scored candidates.

use ndarray::{ArrayView3, Axis};

use crate::anchor::AnchorAccumulator;
use crate::candidate::ScoredBox;
use crate::util::{RpnRoiError, RpnRoiResult};

/// Pairs every accumulator box with its score and drops degenerate boxes.
///
/// `scores` is the `(rows, cols, channels)` objectness map. Boxes and scores
/// are both visited channel-major, then by row, then by column, so the
/// `source_index` of a candidate identifies its anchor channel and cell.
/// Boxes with `x1 >= x2` or `y1 >= y2` are discarded.
pub fn flatten_and_filter(
    acc: &AnchorAccumulator,
    scores: ArrayView3<'_, f32>,
) -> RpnRoiResult<Vec<ScoredBox>> {
    let extent = acc.extent();
    if scores.len_of(Axis(0)) != extent.rows || scores.len_of(Axis(1)) != extent.cols {
        return Err(RpnRoiError::InvalidInput(
            "score map grid differs from the anchor grid",
        ));
    }
    if scores.len_of(Axis(2)) != acc.num_channels() {
        return Err(RpnRoiError::ShapeMismatch {
            context: "score channels",
            expected: acc.num_channels(),
            got: scores.len_of(Axis(2)),
        });
    }

    let flat_scores = scores.permuted_axes([2, 0, 1]);
    let out = acc
        .iter_boxes()
        .zip(flat_scores.iter())
        .enumerate()
        .filter(|(_, (bbox, _))| bbox.is_valid())
        .map(|(idx, (bbox, &score))| ScoredBox::new(bbox, f64::from(score), idx))
        .collect();
    Ok(out)
}
