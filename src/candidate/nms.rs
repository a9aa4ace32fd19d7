//! Greedy IoU non-maximum suppression with class-index derivation.

use crate::candidate::{Roi, ScoredBox};
use crate::trace::{trace_event, trace_span};
use crate::util::{RpnRoiError, RpnRoiResult};

/// Suppression threshold used when the caller does not pick one.
pub const DEFAULT_OVERLAP_THRESH: f64 = 0.9;
/// Pick cap used when the caller does not pick one.
pub const DEFAULT_MAX_BOXES: usize = 300;

/// Parameters for [`non_max_suppression`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NmsParams {
    /// Cells per anchor channel (`rows * cols`).
    pub num_rectangle: usize,
    /// Boxes whose IoU with a pick exceeds this are removed.
    pub overlap_thresh: f64,
    /// Maximum number of picks.
    pub max_boxes: usize,
    /// Anchors per region, used by class derivation.
    pub num_anchors: usize,
}

impl NmsParams {
    pub fn new(num_rectangle: usize, num_anchors: usize) -> Self {
        Self {
            num_rectangle,
            overlap_thresh: DEFAULT_OVERLAP_THRESH,
            max_boxes: DEFAULT_MAX_BOXES,
            num_anchors,
        }
    }

    pub fn validate(&self) -> RpnRoiResult<()> {
        if self.num_rectangle == 0 {
            return Err(RpnRoiError::InvalidConfig {
                reason: "num_rectangle must be at least 1",
            });
        }
        if self.num_anchors == 0 {
            return Err(RpnRoiError::InvalidConfig {
                reason: "num_anchors must be at least 1",
            });
        }
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

/// Maps a candidate position to a class index.
///
/// `class_num = position / num_rectangle`; positions whose `class_num - 1`
/// falls below `num_anchors` map to class 0, the rest to
/// `(class_num - 1) / num_anchors`. This mixes anchor-channel and class
/// semantics and is kept as-is so existing consumers see the same labels.
pub fn derive_class_id(position: usize, num_rectangle: usize, num_anchors: usize) -> usize {
    let class_num = position / num_rectangle;
    match class_num.checked_sub(1) {
        Some(shifted) if shifted >= num_anchors => shifted / num_anchors,
        _ => 0,
    }
}

/// Greedy suppression over `candidates`.
///
/// Candidates are ordered by ascending score (stable, so among equal scores
/// the later one is picked first). The highest remaining candidate is picked
/// and every remaining candidate whose IoU with it exceeds
/// `overlap_thresh` is dropped, until nothing remains or `max_boxes` picks
/// are made. Each pick is labelled with [`derive_class_id`] of its position
/// in `candidates`. Output is in pick order.
///
/// # Panics
///
/// Panics if any candidate has `x1 >= x2` or `y1 >= y2`; such boxes must be
/// removed before suppression.
pub fn non_max_suppression(
    candidates: &[ScoredBox],
    params: &NmsParams,
) -> RpnRoiResult<Vec<Roi>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    params.validate()?;

    for (idx, cand) in candidates.iter().enumerate() {
        let b = cand.bbox;
        assert!(
            b.is_valid(),
            "degenerate box at candidate {idx}: ({}, {}, {}, {})",
            b.x1,
            b.y1,
            b.x2,
            b.y2
        );
    }

    let _span = trace_span!("greedy_nms", candidates = candidates.len()).entered();

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    remaining.sort_by(|&a, &b| candidates[a].score.total_cmp(&candidates[b].score));

    let mut picks = Vec::new();
    while let Some(best) = remaining.pop() {
        picks.push(best);
        let best_box = candidates[best].bbox;
        remaining.retain(|&other| best_box.iou(&candidates[other].bbox) <= params.overlap_thresh);
        if picks.len() >= params.max_boxes {
            break;
        }
    }

    trace_event!("nms_picks", picks = picks.len());

    Ok(picks
        .into_iter()
        .map(|idx| Roi {
            bbox: candidates[idx].bbox,
            class_id: derive_class_id(idx, params.num_rectangle, params.num_anchors),
            score: candidates[idx].score,
            candidate_index: idx,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{derive_class_id, non_max_suppression, NmsParams};
    use crate::candidate::ScoredBox;
    use crate::geometry::CornerBox;
    use crate::util::RpnRoiError;

    fn scored(x1: f64, y1: f64, x2: f64, y2: f64, score: f64, idx: usize) -> ScoredBox {
        ScoredBox::new(CornerBox::new(x1, y1, x2, y2), score, idx)
    }

    #[test]
    fn class_id_for_small_positions_is_zero() {
        assert_eq!(derive_class_id(0, 6, 3), 0);
        assert_eq!(derive_class_id(5, 6, 3), 0);
        assert_eq!(derive_class_id(23, 6, 3), 0);
    }

    #[test]
    fn class_id_divides_shifted_channel() {
        assert_eq!(derive_class_id(24, 6, 3), 1);
        assert_eq!(derive_class_id(41, 6, 3), 1);
        assert_eq!(derive_class_id(42, 6, 3), 2);
    }

    #[test]
    fn equal_scores_pick_later_candidate_first() {
        let cands = vec![
            scored(0.0, 0.0, 1.0, 1.0, 0.5, 0),
            scored(5.0, 5.0, 6.0, 6.0, 0.5, 1),
        ];
        let rois = non_max_suppression(&cands, &NmsParams::new(1, 1)).unwrap();
        let order: Vec<usize> = rois.iter().map(|r| r.candidate_index).collect();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn threshold_is_exclusive() {
        // identical boxes have IoU just under 1, so a threshold of 1 keeps both
        let cands = vec![
            scored(0.0, 0.0, 2.0, 2.0, 0.9, 0),
            scored(0.0, 0.0, 2.0, 2.0, 0.1, 1),
        ];
        let params = NmsParams {
            overlap_thresh: 1.0,
            ..NmsParams::new(1, 1)
        };
        assert_eq!(non_max_suppression(&cands, &params).unwrap().len(), 2);
    }

    #[test]
    fn invalid_params_are_rejected_for_non_empty_input() {
        let cands = vec![scored(0.0, 0.0, 1.0, 1.0, 0.5, 0)];
        let err = non_max_suppression(&cands, &NmsParams::new(0, 1)).unwrap_err();
        assert_eq!(
            err,
            RpnRoiError::InvalidConfig {
                reason: "num_rectangle must be at least 1",
            }
        );
        assert!(non_max_suppression(&[], &NmsParams::new(0, 1)).unwrap().is_empty());
    }

    #[test]
    #[should_panic(expected = "degenerate box")]
    fn degenerate_candidate_panics() {
        let cands = vec![scored(2.0, 0.0, 2.0, 1.0, 0.5, 0)];
        let _ = non_max_suppression(&cands, &NmsParams::new(1, 1));
    }
}
