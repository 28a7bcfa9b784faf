//! Error types for hillas-core.

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result type alias for hillas operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structural errors: bad setup, bad configuration, or programmer error.
///
/// These are never caused by the content of a single event and are
/// propagated to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Telescope index or id not known to the run.
    #[error("invalid telescope: {0}")]
    InvalidTelescope(u32),

    /// Pixel index outside the camera.
    #[error("pixel index {pixel} out of range (camera has {count} pixels)")]
    PixelOutOfRange { pixel: usize, count: usize },

    /// Two buffers that must describe the same camera disagree in size.
    #[error("buffer size mismatch for {what}: expected {expected}, found {found}")]
    BufferMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Neighbor lists were requested before they were built.
    #[error("neighbor graph for telescope {0} has not been built")]
    MissingNeighborGraph(u32),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// A declared but unimplemented processing strategy was selected.
    #[error("strategy not implemented: {0}")]
    UnimplementedStrategy(&'static str),

    /// Neither raw nor pre-calibrated data is available.
    #[error("no usable data for telescope {0}")]
    MissingData(u32),
}

/// Data conditions that make a single image unusable.
///
/// Recoverable: the image is marked unknown and processing continues.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ImageError {
    /// Fewer than two pixels survived cleaning.
    #[error("image has too few pixels: {found}")]
    TooFewPixels { found: usize },

    /// Summed amplitude below one photo-electron.
    #[error("image amplitude too small: {total:.3} p.e.")]
    InsufficientAmplitude { total: f64 },

    /// No pixel timing (or no peak-position slot) is available.
    #[error("no pixel timing available")]
    NoTiming,

    /// Time gradient fit is undetermined.
    #[error("time gradient undetermined ({used} usable pixels)")]
    UndeterminedSlope { used: usize },
}

/// Data conditions that prevent a stereo reconstruction.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReconstructionError {
    /// Fewer than two usable images.
    #[error("not enough images for stereo reconstruction: {found}")]
    TooFewImages { found: usize },

    /// All pairwise intersections had zero weight.
    #[error("no usable pairwise intersection of image axes")]
    NoIntersections,
}
