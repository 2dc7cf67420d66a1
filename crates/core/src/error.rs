//! Error types for the blobfield core.
//!
//! Nothing here is fatal. Configuration operations return these errors after
//! leaving the system untouched, and the tick path never produces one.

use thiserror::Error;

/// Errors produced by configuration operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// A width or height of zero, a cell count above
    /// [`MAX_GRID_CELLS`](crate::params::MAX_GRID_CELLS), or data of the wrong
    /// length for the dimensions.
    #[error(
        "invalid dimensions: width and height must be non-zero, match the data and span at most {} cells",
        crate::params::MAX_GRID_CELLS
    )]
    InvalidDimensions,

    /// A NaN or infinite value for a named parameter.
    #[error("{0} must be a finite number")]
    NonFinite(&'static str),

    /// Particle memory (history depth) must be strictly positive.
    #[error("invalid memory {0}: memory must be greater than zero")]
    InvalidMemory(i64),

    /// Free particle capacity must be non-negative.
    #[error("invalid capacity {0}: maximum number of free particles must be positive or zero")]
    InvalidCapacity(i64),

    /// Threshold floor above its ceiling, or a negative bound.
    #[error("invalid threshold ({min}, {max}): expected 0 <= min <= max")]
    InvalidThreshold { min: f64, max: f64 },

    /// No magnet is registered at this index.
    #[error("there is no magnet n°{0}")]
    UnknownMagnet(usize),

    /// A brush resize targeted a brush of the other kind.
    #[error("blob n°{index} has no {expected} brush")]
    BrushMismatch { index: usize, expected: String },

    /// A brush kind name could not be recognized.
    #[error("unknown brush type: {0}")]
    UnknownBrush(String),

    /// An edge policy code outside Stop/Bounce/Wrap.
    #[error("unknown edge policy: {0}")]
    UnknownEdgePolicy(i64),

    /// A line with both direction coefficients equal to zero.
    #[error("degenerate line: coefficients a and b cannot both be zero")]
    DegenerateLine,
}

/// Reports a rejected configuration through the log facade and hands the
/// error back so callers can still propagate it with `?`.
pub(crate) fn reject<T>(err: SimError) -> Result<T, SimError> {
    log::info!("{err}");
    Err(err)
}
