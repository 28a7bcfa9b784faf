//! Reconstructed shower geometry.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Direction reconstructed.
pub const RESULT_DIRECTION: u32 = 1 << 0;
/// Direction error estimated.
pub const RESULT_DIRECTION_ERROR: u32 = 1 << 1;
/// Core position reconstructed.
pub const RESULT_CORE: u32 = 1 << 2;
/// Core position error estimated.
pub const RESULT_CORE_ERROR: u32 = 1 << 3;

/// Shower direction and impact point from two or more images.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArrayShowerEstimate {
    /// Shower azimuth [rad], in `[0, 2π)`.
    pub azimuth: f64,
    /// Shower altitude [rad].
    pub altitude: f64,
    /// Core position x at ground level [m].
    pub x_core: f64,
    /// Core position y at ground level [m].
    pub y_core: f64,
    /// Spread of pairwise intersections in the tangent plane [rad²] (0 for two images).
    pub var_direction: f64,
    /// Spread of pairwise intersections in the shower plane [m²] (0 for two images).
    pub var_core: f64,
    /// Per-axis direction error estimate [rad], more than two images only.
    pub err_direction: Option<f64>,
    /// Per-axis core error estimate [m], more than two images only.
    pub err_core: Option<f64>,
    /// Number of triggered telescopes considered.
    pub num_triggered: usize,
    /// Ids of telescopes whose images were used.
    pub telescopes: Vec<u32>,
    /// Combination of the `RESULT_*` bits.
    pub result_bits: u32,
}

impl ArrayShowerEstimate {
    /// Number of images used.
    #[must_use]
    pub fn num_images(&self) -> usize {
        self.telescopes.len()
    }

    /// Returns true if the core position was reconstructed.
    #[must_use]
    pub fn has_core(&self) -> bool {
        self.result_bits & RESULT_CORE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_bits() {
        let estimate = ArrayShowerEstimate {
            result_bits: RESULT_DIRECTION | RESULT_CORE,
            telescopes: vec![1, 4],
            ..Default::default()
        };
        assert!(estimate.has_core());
        assert_eq!(estimate.num_images(), 2);
        assert_eq!(estimate.result_bits, 5);
    }
}
