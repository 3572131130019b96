//! Error types for baseline fitting and the baseline cache.

use thiserror::Error;

/// Failures raised by the AsLS solver and the baseline manager.
///
/// Numerical breakdown inside an iteration (`Singular`) is recovered by the
/// solver itself; everything else is structural and reaches the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BaselineError {
    /// Too few points for the second-difference penalty.
    #[error("Degenerate input: need at least {min} points, got {len}")]
    DegenerateInput { len: usize, min: usize },

    /// NaN or infinity in the intensity values.
    #[error("Non-finite intensity at index {index}")]
    NonFinite { index: usize },

    #[error("Invalid baseline parameter: {0}")]
    InvalidParams(String),

    /// Banded factorisation hit a non-positive or non-finite pivot.
    #[error("Singular system at row {row}")]
    Singular { row: usize },

    /// A baseline does not line up with the channel it is applied to.
    #[error("Length mismatch for '{channel}': expected {expected}, got {got}")]
    LengthMismatch {
        channel: String,
        expected: usize,
        got: usize,
    },
}

/// Result type alias for baseline operations.
pub type Result<T> = std::result::Result<T, BaselineError>;
