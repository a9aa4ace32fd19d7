//! rpnroi turns region-proposal network output into a short list of
//! non-overlapping candidate boxes.
//!
//! The pipeline tiles anchors over the feature grid, refines them with the
//! predicted regression deltas, clips them to the grid, pairs them with their
//! objectness scores and runs greedy IoU suppression. The whole call is
//! synchronous and allocation-local; anchor channels can optionally be filled
//! in parallel via the `rayon` feature.

pub mod anchor;
mod candidate;
pub mod geometry;
pub mod proposal;
mod trace;
pub mod util;

pub use anchor::{AnchorAccumulator, AnchorSpec, RpnConfig};
pub use candidate::flatten::flatten_and_filter;
pub use candidate::nms::{
    derive_class_id, non_max_suppression, NmsParams, DEFAULT_MAX_BOXES, DEFAULT_OVERLAP_THRESH,
};
pub use candidate::{Roi, ScoredBox};
pub use geometry::{
    apply_regr, apply_regr_grid, CenterBox, CornerBox, DecodeStats, Decoded, GridExtent,
    RegressionDelta,
};
pub use proposal::{rpn_to_roi, DimOrdering, ProposalConfig, Proposals};
pub use util::{RpnRoiError, RpnRoiResult};
