//! Error types for rpnroi.

use thiserror::Error;

/// Result alias for rpnroi operations.
pub type RpnRoiResult<T> = std::result::Result<T, RpnRoiError>;

/// Errors that can occur when turning RPN output into proposals.
///
/// Caller contract breaches that indicate a broken pipeline (a batch size
/// other than one, a degenerate box reaching suppression) are not represented
/// here; those panic.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RpnRoiError {
    /// A configuration value is outside its valid range.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },
    /// A tensor dimension disagrees with the configuration or a sibling tensor.
    #[error("shape mismatch for {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    /// The input data is invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}
