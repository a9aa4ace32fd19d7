//! Candidate assembly and suppression.
//!
//! Flattening turns the anchor accumulator and the objectness map into a
//! list of scored boxes; greedy IoU suppression then picks the final
//! proposals and labels them with a derived class index.

pub(crate) mod flatten;
pub(crate) mod nms;

use crate::geometry::CornerBox;

/// Non-degenerate box paired with its objectness score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoredBox {
    pub bbox: CornerBox,
    pub score: f64,
    /// Position in the unfiltered `(channel, row, col)` flat order.
    pub source_index: usize,
}

impl ScoredBox {
    pub fn new(bbox: CornerBox, score: f64, source_index: usize) -> Self {
        Self {
            bbox,
            score,
            source_index,
        }
    }
}

/// A selected proposal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Roi {
    pub bbox: CornerBox,
    /// Class index derived from the box's candidate position.
    pub class_id: usize,
    /// Objectness score the box was selected with.
    pub score: f64,
    /// Position of the box in the candidate list handed to suppression.
    pub candidate_index: usize,
}
