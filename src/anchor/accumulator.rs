//! Channel-major arena holding one decoded, clipped box per anchor and cell.
//!
//! The buffer is laid out as `(channel, component, row, col)`. Each anchor
//! channel owns a contiguous `(4, rows, cols)` slot, so channels can be filled
//! independently (and in parallel with the `rayon` feature), and flattening
//! in row-major order yields boxes ordered by channel, then row, then column.

use ndarray::{s, Array3, Array4, ArrayView3, ArrayViewMut3, Axis, Zip};

use crate::anchor::{AnchorSpec, RpnConfig};
use crate::geometry::{
    apply_regr_grid, finalize_box, CenterBox, CornerBox, DecodeStats, GridExtent, RegressionDelta,
};
use crate::trace::{trace_event, trace_span};
use crate::util::{RpnRoiError, RpnRoiResult};

/// Per-call buffer of corner-form boxes for every anchor channel.
pub struct AnchorAccumulator {
    boxes: Array4<f64>,
    extent: GridExtent,
}

impl AnchorAccumulator {
    /// Allocates a zeroed buffer for `num_channels` channels over `extent`.
    pub fn new(num_channels: usize, extent: GridExtent) -> Self {
        Self {
            boxes: Array4::zeros((num_channels, 4, extent.rows, extent.cols)),
            extent,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.boxes.len_of(Axis(0))
    }

    pub fn extent(&self) -> GridExtent {
        self.extent
    }

    /// Total number of boxes, one per channel and cell.
    pub fn len(&self) -> usize {
        self.num_channels() * self.extent.cells()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the stored box for `(channel, row, col)`.
    pub fn box_at(&self, channel: usize, row: usize, col: usize) -> Option<CornerBox> {
        if channel >= self.num_channels() || row >= self.extent.rows || col >= self.extent.cols {
            return None;
        }
        let slot = self.boxes.index_axis(Axis(0), channel);
        Some(CornerBox::new(
            slot[[0, row, col]],
            slot[[1, row, col]],
            slot[[2, row, col]],
            slot[[3, row, col]],
        ))
    }

    /// Iterates all boxes in flat order: channel, then row, then column.
    pub fn iter_boxes(&self) -> impl Iterator<Item = CornerBox> + '_ {
        let GridExtent { rows, cols } = self.extent;
        self.boxes.outer_iter().flat_map(move |slot| {
            (0..rows).flat_map(move |r| {
                (0..cols).map(move |c| {
                    CornerBox::new(
                        slot[[0, r, c]],
                        slot[[1, r, c]],
                        slot[[2, r, c]],
                        slot[[3, r, c]],
                    )
                })
            })
        })
    }
}

/// Extracts the `(4, rows, cols)` delta grid for `channel` from a
/// `(rows, cols, 4 * channels)` regression map, dividing by `std_scaling`.
pub fn channel_deltas(
    regr: ArrayView3<'_, f32>,
    channel: usize,
    std_scaling: [f64; 4],
) -> RpnRoiResult<Array3<f64>> {
    let start = 4 * channel;
    if start + 4 > regr.len_of(Axis(2)) {
        return Err(RpnRoiError::ShapeMismatch {
            context: "regression channels",
            expected: start + 4,
            got: regr.len_of(Axis(2)),
        });
    }
    let group = regr.slice(s![.., .., start..start + 4]);
    let mut out = Array3::<f64>::zeros((4, group.len_of(Axis(0)), group.len_of(Axis(1))));
    Zip::from(out.lanes_mut(Axis(0)))
        .and(group.lanes(Axis(2)))
        .for_each(|mut dst, src| {
            let delta = RegressionDelta::new(
                f64::from(src[0]),
                f64::from(src[1]),
                f64::from(src[2]),
                f64::from(src[3]),
            )
            .unscale(std_scaling);
            dst[0] = delta.tx;
            dst[1] = delta.ty;
            dst[2] = delta.tw;
            dst[3] = delta.th;
        });
    Ok(out)
}

fn fill_channel(
    mut slot: ArrayViewMut3<'_, f64>,
    spec: &AnchorSpec,
    cfg: &RpnConfig,
    extent: GridExtent,
    regr: Option<ArrayView3<'_, f32>>,
) -> RpnRoiResult<DecodeStats> {
    Zip::indexed(slot.lanes_mut(Axis(0))).for_each(|(row, col), mut cell| {
        let anchor = spec.base_box(cfg.rpn_stride, col, row);
        cell[0] = anchor.x;
        cell[1] = anchor.y;
        cell[2] = anchor.w;
        cell[3] = anchor.h;
    });

    let stats = match regr {
        Some(regr) => {
            let deltas = channel_deltas(regr, spec.channel, cfg.std_scaling)?;
            apply_regr_grid(slot.view_mut(), deltas.view())?
        }
        None => DecodeStats::default(),
    };

    Zip::from(slot.lanes_mut(Axis(0))).for_each(|mut cell| {
        let decoded = CenterBox::new(cell[0], cell[1], cell[2], cell[3]);
        let corner = finalize_box(decoded, extent);
        cell[0] = corner.x1;
        cell[1] = corner.y1;
        cell[2] = corner.x2;
        cell[3] = corner.y2;
    });

    Ok(stats)
}

/// Fills every channel slot of `acc` with anchors for `specs`.
///
/// Each slot receives the base anchors of its spec, decoded against the
/// matching regression group when `regr` is given (a `(rows, cols,
/// 4 * channels)` map), then clamped to a minimum size and clipped to the
/// grid. With `parallel` set and the `rayon` feature enabled, channels are
/// processed concurrently; the result is identical either way.
pub fn generate_anchors(
    acc: &mut AnchorAccumulator,
    specs: &[AnchorSpec],
    cfg: &RpnConfig,
    regr: Option<ArrayView3<'_, f32>>,
    parallel: bool,
) -> RpnRoiResult<DecodeStats> {
    if specs.len() != acc.num_channels() {
        return Err(RpnRoiError::ShapeMismatch {
            context: "anchor channels",
            expected: acc.num_channels(),
            got: specs.len(),
        });
    }
    let extent = acc.extent();
    if let Some(regr) = regr {
        let shape = regr.shape();
        if shape[0] != extent.rows || shape[1] != extent.cols {
            return Err(RpnRoiError::InvalidInput(
                "regression map grid differs from the anchor grid",
            ));
        }
        if shape[2] != 4 * specs.len() {
            return Err(RpnRoiError::ShapeMismatch {
                context: "regression channels",
                expected: 4 * specs.len(),
                got: shape[2],
            });
        }
    }

    let _span = trace_span!(
        "generate_anchors",
        channels = specs.len(),
        rows = extent.rows,
        cols = extent.cols
    )
    .entered();

    #[cfg(feature = "rayon")]
    if parallel {
        use ndarray::parallel::prelude::*;

        let results: Vec<RpnRoiResult<DecodeStats>> = acc
            .boxes
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(specs.par_iter())
            .map(|(slot, spec)| fill_channel(slot, spec, cfg, extent, regr))
            .collect();
        let mut stats = DecodeStats::default();
        for result in results {
            stats = stats.merge(result?);
        }
        trace_event!("anchors_decoded", refined = stats.refined, fallback = stats.fallback);
        return Ok(stats);
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    let mut stats = DecodeStats::default();
    for (slot, spec) in acc.boxes.outer_iter_mut().zip(specs) {
        stats = stats.merge(fill_channel(slot, spec, cfg, extent, regr)?);
    }
    trace_event!("anchors_decoded", refined = stats.refined, fallback = stats.fallback);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::{channel_deltas, generate_anchors, AnchorAccumulator};
    use crate::anchor::RpnConfig;
    use crate::geometry::{CornerBox, GridExtent};
    use crate::util::RpnRoiError;
    use ndarray::Array3;

    fn unit_config() -> RpnConfig {
        RpnConfig {
            rpn_stride: 16.0,
            std_scaling: [1.0; 4],
            anchor_box_scales: vec![32.0],
            anchor_box_ratios: vec![[1.0, 1.0], [2.0, 1.0]],
            num_regions: 1,
            num_anchors: 2,
        }
    }

    #[test]
    fn channel_deltas_unscale_the_right_group() {
        let mut regr = Array3::<f32>::zeros((1, 2, 8));
        for k in 0..4 {
            regr[[0, 1, 4 + k]] = 2.0 * (k as f32 + 1.0);
        }
        let deltas = channel_deltas(regr.view(), 1, [2.0, 2.0, 4.0, 4.0]).unwrap();
        assert_eq!(deltas.shape(), &[4, 1, 2]);
        assert_eq!(deltas[[0, 0, 1]], 1.0);
        assert_eq!(deltas[[1, 0, 1]], 2.0);
        assert_eq!(deltas[[2, 0, 1]], 1.5);
        assert_eq!(deltas[[3, 0, 1]], 2.0);
        assert_eq!(deltas[[0, 0, 0]], 0.0);

        let err = channel_deltas(regr.view(), 2, [1.0; 4]).unwrap_err();
        assert_eq!(
            err,
            RpnRoiError::ShapeMismatch {
                context: "regression channels",
                expected: 12,
                got: 8,
            }
        );
    }

    #[test]
    fn anchors_without_regression_are_clipped_base_boxes() {
        let cfg = unit_config();
        let specs = cfg.anchor_specs();
        let mut acc = AnchorAccumulator::new(specs.len(), GridExtent::new(3, 4));
        let stats = generate_anchors(&mut acc, &specs, &cfg, None, false).unwrap();
        assert_eq!(stats.refined, 0);

        // channel 0: 2x2 anchor at (col 2, row 1) -> (1, 0, 3, 2)
        assert_eq!(acc.box_at(0, 1, 2), Some(CornerBox::new(1.0, 0.0, 3.0, 2.0)));
        // channel 1: 4x2 anchor at (col 0, row 0) -> (-2, -1, 2, 1) clipped
        assert_eq!(acc.box_at(1, 0, 0), Some(CornerBox::new(0.0, 0.0, 2.0, 1.0)));
        // channel 1 at (col 3, row 2) -> (1, 1, 5, 3) clipped to (1, 1, 3, 2)
        assert_eq!(acc.box_at(1, 2, 3), Some(CornerBox::new(1.0, 1.0, 3.0, 2.0)));
        assert_eq!(acc.box_at(2, 0, 0), None);
    }

    #[test]
    fn iteration_order_is_channel_row_col() {
        let cfg = unit_config();
        let specs = cfg.anchor_specs();
        let mut acc = AnchorAccumulator::new(specs.len(), GridExtent::new(2, 3));
        generate_anchors(&mut acc, &specs, &cfg, None, false).unwrap();

        let flat: Vec<CornerBox> = acc.iter_boxes().collect();
        assert_eq!(flat.len(), acc.len());
        for ch in 0..2 {
            for r in 0..2 {
                for c in 0..3 {
                    assert_eq!(Some(flat[ch * 6 + r * 3 + c]), acc.box_at(ch, r, c));
                }
            }
        }
    }

    #[test]
    fn regression_shifts_anchor_before_clipping() {
        let cfg = unit_config();
        let specs = cfg.anchor_specs();
        let extent = GridExtent::new(4, 4);
        let mut acc = AnchorAccumulator::new(specs.len(), extent);
        let mut regr = Array3::<f32>::zeros((4, 4, 8));
        // channel 0 at (row 1, col 1): base (0, 0, 2, 2); tx = 0.5 shifts by one cell
        regr[[1, 1, 0]] = 0.5;

        let stats = generate_anchors(&mut acc, &specs, &cfg, Some(regr.view()), false).unwrap();
        assert_eq!(stats.refined, 32);
        assert_eq!(stats.fallback, 0);
        assert_eq!(acc.box_at(0, 1, 1), Some(CornerBox::new(1.0, 0.0, 3.0, 2.0)));
    }

    #[test]
    fn overflowing_delta_keeps_base_anchor() {
        let cfg = unit_config();
        let specs = cfg.anchor_specs();
        let mut acc = AnchorAccumulator::new(specs.len(), GridExtent::new(4, 4));
        let mut regr = Array3::<f32>::zeros((4, 4, 8));
        regr[[2, 2, 2]] = f32::MAX;

        let stats = generate_anchors(&mut acc, &specs, &cfg, Some(regr.view()), false).unwrap();
        assert_eq!(stats.fallback, 1);
        assert_eq!(acc.box_at(0, 2, 2), Some(CornerBox::new(1.0, 1.0, 3.0, 3.0)));
    }

    #[test]
    fn generate_rejects_mismatched_regression_map() {
        let cfg = unit_config();
        let specs = cfg.anchor_specs();
        let mut acc = AnchorAccumulator::new(specs.len(), GridExtent::new(2, 2));
        let regr = Array3::<f32>::zeros((2, 2, 4));
        let err = generate_anchors(&mut acc, &specs, &cfg, Some(regr.view()), false).unwrap_err();
        assert_eq!(
            err,
            RpnRoiError::ShapeMismatch {
                context: "regression channels",
                expected: 8,
                got: 4,
            }
        );
    }
}
