//! Calibration constants and calibrated pixel amplitudes.

use crate::error::{Error, Result};
use crate::waveform::Gain;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-pixel, per-gain pedestals and conversion factors.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationConstants {
    /// Per gain: pedestal of the full-trace sum [ADC counts].
    pub pedestal: Vec<Vec<f64>>,
    /// Per gain: mean photo-electrons per pedestal-subtracted ADC count.
    pub factor: Vec<Vec<f64>>,
}

impl CalibrationConstants {
    /// Uniform constants for every pixel (mostly useful in tests and simulations).
    #[must_use]
    pub fn uniform(num_pixels: usize, pedestal: &[f64], factor: &[f64]) -> Self {
        Self {
            pedestal: pedestal.iter().map(|&p| vec![p; num_pixels]).collect(),
            factor: factor.iter().map(|&f| vec![f; num_pixels]).collect(),
        }
    }

    /// Pedestal of the full-trace sum.
    #[inline]
    #[must_use]
    pub fn pedestal(&self, gain: Gain, pixel: usize) -> f64 {
        self.pedestal[gain.index()][pixel]
    }

    /// Pedestal of a single sample.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sample_pedestal(&self, gain: Gain, pixel: usize, num_samples: usize) -> f64 {
        self.pedestal(gain, pixel) / num_samples.max(1) as f64
    }

    /// Conversion factor to mean p.e.
    #[inline]
    #[must_use]
    pub fn factor(&self, gain: Gain, pixel: usize) -> f64 {
        self.factor[gain.index()][pixel]
    }

    /// Checks the constants cover `num_gains` channels of `num_pixels` pixels.
    pub fn validate(&self, num_pixels: usize, num_gains: usize) -> Result<()> {
        for (what, table) in [("pedestals", &self.pedestal), ("calibration factors", &self.factor)] {
            if table.len() < num_gains {
                return Err(Error::BufferMismatch {
                    what,
                    expected: num_gains,
                    found: table.len(),
                });
            }
            for column in table.iter().take(num_gains) {
                if column.len() != num_pixels {
                    return Err(Error::BufferMismatch {
                        what,
                        expected: num_pixels,
                        found: column.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Pre-calibrated pixel amplitudes delivered instead of raw data.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelCalibrated {
    /// Amplitude [peak p.e.].
    pub pixel_pe: Vec<f64>,
    /// Amplitude was measured.
    pub significant: Vec<bool>,
}

/// Calibrated amplitudes of all pixels of one telescope in one event.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelAmplitudes {
    /// Amplitude [peak p.e.]; zero for unmeasured or disabled pixels.
    pub amplitude: Vec<f64>,
    /// Distinguishes a measured zero from "no measurement".
    pub significant: Vec<bool>,
    /// Number of pixels clipped at the configured maximum amplitude.
    pub saturated: usize,
}

impl PixelAmplitudes {
    /// All pixels zero and insignificant.
    #[must_use]
    pub fn zeroed(num_pixels: usize) -> Self {
        Self {
            amplitude: vec![0.0; num_pixels],
            significant: vec![false; num_pixels],
            saturated: 0,
        }
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.amplitude.len()
    }

    /// Returns true if there are no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.amplitude.is_empty()
    }

    /// Amplitude of one pixel.
    #[inline]
    #[must_use]
    pub fn get(&self, pixel: usize) -> f64 {
        self.amplitude[pixel]
    }

    /// Sum over all pixels.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.amplitude.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_constants() {
        let cal = CalibrationConstants::uniform(4, &[400.0, 380.0], &[0.1, 1.5]);
        assert!(cal.validate(4, 2).is_ok());
        assert!((cal.pedestal(Gain::Low, 3) - 380.0).abs() < f64::EPSILON);
        assert!((cal.sample_pedestal(Gain::High, 0, 20) - 20.0).abs() < f64::EPSILON);
        assert!(cal.validate(5, 2).is_err());
        assert!(cal.validate(4, 3).is_err());
    }

    #[test]
    fn test_amplitude_total() {
        let mut amps = PixelAmplitudes::zeroed(3);
        amps.amplitude[0] = 2.0;
        amps.amplitude[2] = 3.5;
        assert!((amps.total() - 5.5).abs() < f64::EPSILON);
        assert_eq!(amps.len(), 3);
    }
}
