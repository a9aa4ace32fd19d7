//! Anchor geometry and the per-call RPN configuration.
//!
//! Every combination of anchor size, aspect ratio and region index is one
//! anchor channel. Channels are enumerated size-major, then ratio, then
//! region; that order fixes the channel index used by the score tensor, the
//! regression tensor and the flattened candidate list.

mod accumulator;

pub use accumulator::{channel_deltas, generate_anchors, AnchorAccumulator};

use crate::geometry::CenterBox;
use crate::util::{RpnRoiError, RpnRoiResult};

/// Read-only parameters taken from the detector configuration on each call.
#[derive(Clone, Debug, PartialEq)]
pub struct RpnConfig {
    /// Input pixels per feature-grid cell.
    pub rpn_stride: f64,
    /// Divisors applied to `(tx, ty, tw, th)` before decoding.
    pub std_scaling: [f64; 4],
    /// Anchor side lengths in input pixels.
    pub anchor_box_scales: Vec<f64>,
    /// Anchor aspect ratios as `(x, y)` multipliers.
    pub anchor_box_ratios: Vec<[f64; 2]>,
    /// Regions per size/ratio combination.
    pub num_regions: usize,
    /// Anchors per region, used when deriving class indices.
    pub num_anchors: usize,
}

impl Default for RpnConfig {
    fn default() -> Self {
        let r = std::f64::consts::SQRT_2;
        Self {
            rpn_stride: 16.0,
            std_scaling: [4.0; 4],
            anchor_box_scales: vec![128.0, 256.0, 512.0],
            anchor_box_ratios: vec![[1.0, 1.0], [1.0 / r, 2.0 / r], [2.0 / r, 1.0 / r]],
            num_regions: 1,
            num_anchors: 9,
        }
    }
}

impl RpnConfig {
    pub fn validate(&self) -> RpnRoiResult<()> {
        if !self.rpn_stride.is_finite() || self.rpn_stride <= 0.0 {
            return Err(RpnRoiError::InvalidConfig {
                reason: "rpn_stride must be finite and positive",
            });
        }
        if self.std_scaling.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(RpnRoiError::InvalidConfig {
                reason: "std_scaling entries must be finite and non-zero",
            });
        }
        if self.anchor_box_scales.is_empty() {
            return Err(RpnRoiError::InvalidConfig {
                reason: "anchor_box_scales must not be empty",
            });
        }
        if self
            .anchor_box_scales
            .iter()
            .any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(RpnRoiError::InvalidConfig {
                reason: "anchor_box_scales entries must be finite and positive",
            });
        }
        if self.anchor_box_ratios.is_empty() {
            return Err(RpnRoiError::InvalidConfig {
                reason: "anchor_box_ratios must not be empty",
            });
        }
        if self
            .anchor_box_ratios
            .iter()
            .flatten()
            .any(|r| !r.is_finite() || *r <= 0.0)
        {
            return Err(RpnRoiError::InvalidConfig {
                reason: "anchor_box_ratios entries must be finite and positive",
            });
        }
        if self.num_regions == 0 {
            return Err(RpnRoiError::InvalidConfig {
                reason: "num_regions must be at least 1",
            });
        }
        if self.num_anchors == 0 {
            return Err(RpnRoiError::InvalidConfig {
                reason: "num_anchors must be at least 1",
            });
        }
        Ok(())
    }

    /// Number of anchor channels the score tensor must carry.
    pub fn num_channels(&self) -> usize {
        self.anchor_box_scales.len() * self.anchor_box_ratios.len() * self.num_regions
    }

    /// Enumerates anchor channels in tensor order.
    pub fn anchor_specs(&self) -> Vec<AnchorSpec> {
        let mut specs = Vec::with_capacity(self.num_channels());
        for &size in &self.anchor_box_scales {
            for &ratio in &self.anchor_box_ratios {
                for region_index in 0..self.num_regions {
                    let channel = specs.len();
                    specs.push(AnchorSpec {
                        size,
                        ratio,
                        region_index,
                        channel,
                    });
                }
            }
        }
        specs
    }
}

/// One anchor channel: a size, an aspect ratio and a region slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorSpec {
    pub size: f64,
    pub ratio: [f64; 2],
    pub region_index: usize,
    /// Position in the size, ratio, region enumeration.
    pub channel: usize,
}

impl AnchorSpec {
    /// Anchor width and height in grid cells.
    pub fn extent(&self, stride: f64) -> (f64, f64) {
        (
            self.size * self.ratio[0] / stride,
            self.size * self.ratio[1] / stride,
        )
    }

    /// Base anchor centred on grid cell `(col, row)`.
    pub fn base_box(&self, stride: f64, col: usize, row: usize) -> CenterBox {
        let (w, h) = self.extent(stride);
        CenterBox::new(col as f64 - w / 2.0, row as f64 - h / 2.0, w, h)
    }
}
