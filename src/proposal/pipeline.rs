use ndarray::{ArrayView4, Axis};

use crate::anchor::{generate_anchors, AnchorAccumulator, RpnConfig};
use crate::candidate::flatten::flatten_and_filter;
use crate::candidate::nms::{non_max_suppression, NmsParams};
use crate::geometry::GridExtent;
use crate::proposal::{DimOrdering, ProposalConfig, Proposals};
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::{RpnRoiError, RpnRoiResult};

fn channels_last<'a>(tensor: ArrayView4<'a, f32>, ordering: DimOrdering) -> ArrayView4<'a, f32> {
    match ordering {
        DimOrdering::ChannelsLast => tensor,
        DimOrdering::ChannelsFirst => tensor.permuted_axes([0, 2, 3, 1]),
    }
}

/// Converts one image's RPN output into at most `params.max_boxes` proposals.
///
/// `rpn` holds one objectness score per anchor channel and cell, `regr` the
/// matching `(tx, ty, tw, th)` groups, four consecutive channels per anchor
/// channel. Anchor channels follow [`RpnConfig::anchor_specs`] order.
///
/// A grid with no cells yields empty proposals. Tensors whose channel counts
/// disagree with `cfg` are rejected with [`RpnRoiError::ShapeMismatch`].
///
/// # Panics
///
/// Panics if either tensor has a batch dimension other than 1.
pub fn rpn_to_roi(
    rpn: ArrayView4<'_, f32>,
    regr: ArrayView4<'_, f32>,
    cfg: &RpnConfig,
    params: &ProposalConfig,
) -> RpnRoiResult<Proposals> {
    cfg.validate()?;
    params.validate()?;

    let rpn = channels_last(rpn, params.dim_ordering);
    let regr = channels_last(regr, params.dim_ordering);
    assert_eq!(rpn.len_of(Axis(0)), 1, "score tensor batch size must be 1");
    assert_eq!(regr.len_of(Axis(0)), 1, "regression tensor batch size must be 1");

    let extent = GridExtent::new(rpn.len_of(Axis(1)), rpn.len_of(Axis(2)));
    if regr.len_of(Axis(1)) != extent.rows || regr.len_of(Axis(2)) != extent.cols {
        return Err(RpnRoiError::InvalidInput(
            "score and regression tensors cover different grids",
        ));
    }

    let _span = trace_span!(
        "rpn_to_roi",
        rows = extent.rows,
        cols = extent.cols,
        use_regr = params.use_regr
    )
    .entered();

    if extent.is_empty() {
        return Ok(Proposals::default());
    }

    let specs = cfg.anchor_specs();
    let channels = rpn.len_of(Axis(3));
    if channels != specs.len() {
        return Err(RpnRoiError::ShapeMismatch {
            context: "score channels",
            expected: specs.len(),
            got: channels,
        });
    }
    if regr.len_of(Axis(3)) != 4 * channels {
        return Err(RpnRoiError::ShapeMismatch {
            context: "regression channels",
            expected: 4 * channels,
            got: regr.len_of(Axis(3)),
        });
    }

    let scores = rpn.index_axis_move(Axis(0), 0);
    let deltas = regr.index_axis_move(Axis(0), 0);

    let mut acc = AnchorAccumulator::new(channels, extent);
    let decode = generate_anchors(
        &mut acc,
        &specs,
        cfg,
        params.use_regr.then_some(deltas),
        params.parallel,
    )?;
    if decode.fallback > 0 {
        trace_event!("regression_fallback", cells = decode.fallback);
    }

    trace_debug!(
        "objectness",
        count = scores.len(),
        max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    );

    let candidates = flatten_and_filter(&acc, scores)?;
    trace_event!("candidates", kept = candidates.len(), total = acc.len());

    let nms = NmsParams {
        num_rectangle: extent.cells(),
        overlap_thresh: params.overlap_thresh,
        max_boxes: params.max_boxes,
        num_anchors: cfg.num_anchors,
    };
    let rois = non_max_suppression(&candidates, &nms)?;

    Ok(Proposals {
        rois,
        num_candidates: candidates.len(),
        decode,
    })
}

#[cfg(test)]
mod tests {
    use super::rpn_to_roi;
    use crate::anchor::RpnConfig;
    use crate::proposal::{DimOrdering, ProposalConfig};
    use crate::util::RpnRoiError;
    use ndarray::Array4;

    fn single_channel() -> RpnConfig {
        RpnConfig {
            rpn_stride: 16.0,
            std_scaling: [1.0; 4],
            anchor_box_scales: vec![48.0],
            anchor_box_ratios: vec![[1.0, 1.0]],
            num_regions: 1,
            num_anchors: 1,
        }
    }

    #[test]
    fn empty_grid_yields_no_proposals() {
        let rpn = Array4::<f32>::zeros((1, 0, 0, 1));
        let regr = Array4::<f32>::zeros((1, 0, 0, 4));
        let out = rpn_to_roi(rpn.view(), regr.view(), &single_channel(), &ProposalConfig::default())
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(out.to_table().shape(), &[0, 5]);
    }

    #[test]
    fn channel_count_must_match_anchor_specs() {
        let rpn = Array4::<f32>::zeros((1, 3, 3, 2));
        let regr = Array4::<f32>::zeros((1, 3, 3, 8));
        let err = rpn_to_roi(rpn.view(), regr.view(), &single_channel(), &ProposalConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            RpnRoiError::ShapeMismatch {
                context: "score channels",
                expected: 1,
                got: 2,
            }
        );
    }

    #[test]
    fn channels_first_matches_channels_last() {
        let (rows, cols) = (4, 5);
        let mut rpn = Array4::<f32>::zeros((1, rows, cols, 1));
        let mut regr = Array4::<f32>::zeros((1, rows, cols, 4));
        for r in 0..rows {
            for c in 0..cols {
                rpn[[0, r, c, 0]] = (r * cols + c) as f32 / 20.0;
                regr[[0, r, c, 0]] = 0.1 * c as f32;
                regr[[0, r, c, 2]] = 0.05 * r as f32;
            }
        }
        let params = ProposalConfig {
            max_boxes: 10,
            overlap_thresh: 0.5,
            ..ProposalConfig::default()
        };
        let last = rpn_to_roi(rpn.view(), regr.view(), &single_channel(), &params).unwrap();

        let rpn_first = rpn.view().permuted_axes([0, 3, 1, 2]).to_owned();
        let regr_first = regr.view().permuted_axes([0, 3, 1, 2]).to_owned();
        let params_first = ProposalConfig {
            dim_ordering: DimOrdering::ChannelsFirst,
            ..params
        };
        let first =
            rpn_to_roi(rpn_first.view(), regr_first.view(), &single_channel(), &params_first)
                .unwrap();

        assert!(!last.is_empty());
        assert_eq!(last, first);
    }

    #[test]
    #[should_panic(expected = "batch size must be 1")]
    fn batch_of_two_panics() {
        let rpn = Array4::<f32>::zeros((2, 2, 2, 1));
        let regr = Array4::<f32>::zeros((2, 2, 2, 4));
        let _ = rpn_to_roi(rpn.view(), regr.view(), &single_channel(), &ProposalConfig::default());
    }
}
