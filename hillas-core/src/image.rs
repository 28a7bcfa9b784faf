//! Cleaned images and their second-moment (Hillas) parameters.

use crate::calibration::PixelAmplitudes;
use crate::error::ImageError;
use crate::telescope::Pointing;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cut id of the classical two-level tail-cut image.
pub const CUT_ID_TAILCUT: u8 = 1;
/// Cut id of the image built from timing-based pulse sums.
pub const CUT_ID_TIMING: u8 = 2;

/// Ordered subset of pixel indices forming the shower image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CleanedImage {
    /// Pixel indices, in cleaning order (or sorted by amplitude after truncation).
    pub pixels: Vec<usize>,
}

impl CleanedImage {
    /// Creates an image from a pixel list.
    #[must_use]
    pub fn new(pixels: Vec<usize>) -> Self {
        Self { pixels }
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Returns true if no pixel survived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Returns true if the pixel is part of the image.
    #[must_use]
    pub fn contains(&self, pixel: usize) -> bool {
        self.pixels.contains(&pixel)
    }

    /// Iterates over the pixel indices.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.pixels.iter().copied()
    }

    /// Summed amplitude of the image pixels.
    #[must_use]
    pub fn amplitude(&self, amplitudes: &PixelAmplitudes) -> f64 {
        self.iter().map(|p| amplitudes.get(p)).sum()
    }
}

impl FromIterator<usize> for CleanedImage {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            pixels: iter.into_iter().collect(),
        }
    }
}

/// Summary of pixel timing within an image (times in ns).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimingParameters {
    /// Peak time gradient along the major axis [ns/rad].
    pub slope: f64,
    /// Weighted r.m.s. of the gradient fit residuals [ns].
    pub residual: f64,
    /// Mean pulse width at 50% of peak (or above threshold) [ns].
    pub width1: f64,
    /// Mean pulse width at 20% of peak [ns].
    pub width2: f64,
    /// Mean rise time from 20% to 80% of peak [ns].
    pub rise_time: f64,
}

/// Second-moment parameters of one image.
///
/// Angles and angular extents are in radians; camera rotation is applied.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HillasParameters {
    /// Which cleaning / amplitude source produced these parameters.
    pub cut_id: u8,
    /// Summed amplitude [peak p.e.].
    pub amplitude: f64,
    /// Number of image pixels.
    pub pixels: usize,
    /// Centroid x.
    pub x: f64,
    /// Centroid y.
    pub y: f64,
    /// R.m.s. extent along the minor axis.
    pub width: f64,
    /// R.m.s. extent along the major axis.
    pub length: f64,
    /// Distance of the centroid from the camera centre.
    pub distance: f64,
    /// Distance of the major axis from the camera centre.
    pub miss: f64,
    /// Angle between major axis and the line centroid–centre.
    pub alpha: f64,
    /// Polar angle of the centroid.
    pub orientation: f64,
    /// Angle of the major axis (head–tail resolved).
    pub direction: f64,
    /// Third standardized moment along the major axis.
    pub skewness: f64,
    /// Fourth standardized moment along the major axis, minus 3.
    pub kurtosis: f64,
    /// Number of clipped pixels in the camera.
    pub num_saturated: usize,
    /// Clip amplitude in effect (0 if none).
    pub clip_amplitude: f64,
    /// Up to five brightest image pixels as `(pixel, amplitude)`.
    pub hot_pixels: Vec<(usize, f64)>,
    /// Amplitude summed over all camera pixels, before cleaning.
    pub total_amplitude: Option<f64>,
    /// Time gradient results, if pixel timing was available.
    pub timing: Option<TimingParameters>,
}

impl HillasParameters {
    /// `1 - width/length` if the image is elongated, `1e-3` otherwise.
    #[must_use]
    pub fn disp(&self) -> f64 {
        if self.length > 0.0 && self.length > self.width {
            1.0 - self.width / self.length
        } else {
            1e-3
        }
    }

    /// Distance of the centroid from the camera centre, recomputed from x/y.
    #[must_use]
    pub fn centroid_radius(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Result of image analysis for one telescope in one event.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelescopeImage {
    /// Telescope id.
    pub tel_id: u32,
    /// Telescope pointing at the time of the event.
    pub pointing: Pointing,
    /// Calibrated amplitudes the image was derived from.
    pub amplitudes: PixelAmplitudes,
    /// Pixels surviving cleaning.
    pub image: CleanedImage,
    /// Parameter sets (amplitude-based first, optionally timing-based second).
    pub parameters: Vec<HillasParameters>,
    /// Why the first parameter set is missing, if it is.
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: Option<ImageError>,
}

impl TelescopeImage {
    /// Returns true if at least one parameter set was derived.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !self.parameters.is_empty()
    }

    /// Parameter set with exactly this cut id.
    #[must_use]
    pub fn by_cut_id(&self, cut_id: u8) -> Option<&HillasParameters> {
        self.parameters.iter().find(|p| p.cut_id == cut_id)
    }

    /// Parameter set for the requested cut id; generic ids (0, 1) fall back
    /// to the first available set.
    #[must_use]
    pub fn select(&self, cut_id: u8) -> Option<&HillasParameters> {
        self.by_cut_id(cut_id).or_else(|| {
            if cut_id <= CUT_ID_TAILCUT {
                self.parameters.first()
            } else {
                None
            }
        })
    }
}
