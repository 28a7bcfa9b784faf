//! Second-moment (Hillas) parameters of cleaned images.
//!
//! Moments are accumulated in focal-plane metres and converted to angles
//! with the camera's angular scale. The camera rotation is added to
//! `direction` and `orientation` and applied to the centroid; `distance`,
//! `miss` and `alpha` do not depend on it.
#![allow(clippy::cast_precision_loss, clippy::similar_names)]

use std::f64::consts::{FRAC_PI_2, PI};

use hillas_core::{CameraGeometry, CleanedImage, HillasParameters, ImageError, PixelAmplitudes};

/// Number of brightest pixels reported per image.
pub const MAX_HOT_PIXELS: usize = 5;

/// Minimum number of image pixels.
pub const MIN_IMAGE_PIXELS: usize = 2;

/// Minimum image amplitude [p.e.].
pub const MIN_IMAGE_AMPLITUDE: f64 = 1.0;

/// Relative size below which a covariance term counts as zero.
const NEGLIGIBLE: f64 = 1e-8;

/// Extent substituted for a zero or undefined length or width, in units of
/// the angular scale.
const FLOOR_EXTENT: f64 = 1e-3;

/// Slope standing in for a vertical major axis.
const VERTICAL_SLOPE: f64 = 1e5;

/// Amplitude-weighted moments of an image, in metres.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Moments {
    sum: f64,
    x: f64,
    y: f64,
    xx: f64,
    xy: f64,
    yy: f64,
}

/// Major axis `y = a + b x` and extents, in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Axis {
    a: f64,
    b: f64,
    length: f64,
    width: f64,
}

impl Moments {
    fn axis(&self) -> Axis {
        let (sxx, sxy, syy) = (self.xx, self.xy, self.yy);
        if sxy.abs() > NEGLIGIBLE * sxx.abs() && sxy.abs() > NEGLIGIBLE * syy.abs() {
            let p1 = syy - sxx;
            let p2 = sxy * sxy;
            let q = if p2 > NEGLIGIBLE * p1 * p1 {
                p1 + (p1 * p1 + 4.0 * p2).sqrt()
            } else {
                2.0 * p2
            };
            let b = 0.5 * q / sxy;
            let r1 = syy + 2.0 * p2 / q;
            let r2 = sxx - 2.0 * p2 / q;
            return Axis {
                a: self.y - b * self.x,
                b,
                length: if r1 > 0.0 { r1.sqrt() } else { 0.0 },
                width: if r2 > 0.0 { r2.sqrt() } else { 0.0 },
            };
        }

        let mut sxx = sxx;
        let mut syy = syy;
        if syy.abs() < NEGLIGIBLE * sxx.abs() {
            syy = 0.0;
        } else if sxx.abs() < NEGLIGIBLE * syy.abs() {
            sxx = 0.0;
        }
        if sxx > syy && syy >= 0.0 {
            Axis {
                a: self.y,
                b: 0.0,
                length: sxx.sqrt(),
                width: syy.sqrt(),
            }
        } else if syy >= 0.0 && sxx >= 0.0 {
            Axis {
                a: self.y - VERTICAL_SLOPE * self.x,
                b: VERTICAL_SLOPE,
                length: syy.sqrt(),
                width: sxx.sqrt(),
            }
        } else {
            Axis {
                a: 0.0,
                b: 0.0,
                length: f64::NAN,
                width: f64::NAN,
            }
        }
    }
}

/// Computes Hillas parameters for the images of one camera.
#[derive(Debug, Clone, Copy)]
pub struct HillasAnalyzer<'a> {
    camera: &'a CameraGeometry,
    clip_amplitude: f64,
}

impl<'a> HillasAnalyzer<'a> {
    /// Creates an analyzer for one camera.
    #[must_use]
    pub fn new(camera: &'a CameraGeometry) -> Self {
        Self {
            camera,
            clip_amplitude: 0.0,
        }
    }

    /// Records the clip amplitude the amplitudes were calibrated with.
    #[must_use]
    pub fn with_clip_amplitude(mut self, clip: f64) -> Self {
        self.clip_amplitude = clip;
        self
    }

    /// Brightest image pixels, brightest first; ties keep image order.
    #[must_use]
    pub fn hot_pixels(image: &CleanedImage, amplitudes: &PixelAmplitudes) -> Vec<(usize, f64)> {
        let mut hot: Vec<(usize, f64)> = image.iter().map(|p| (p, amplitudes.get(p))).collect();
        hot.sort_by(|a, b| b.1.total_cmp(&a.1));
        hot.truncate(MAX_HOT_PIXELS);
        hot
    }

    fn moments(&self, image: &CleanedImage, amplitudes: &PixelAmplitudes) -> Moments {
        let mut m = Moments::default();
        for p in image.iter() {
            let a = amplitudes.get(p);
            let (x, y) = (self.camera.x[p], self.camera.y[p]);
            m.sum += a;
            m.x += a * x;
            m.y += a * y;
            m.xx += a * x * x;
            m.xy += a * x * y;
            m.yy += a * y * y;
        }
        m.x /= m.sum;
        m.y /= m.sum;
        m.xx = m.xx / m.sum - m.x * m.x;
        m.xy = m.xy / m.sum - m.x * m.y;
        m.yy = m.yy / m.sum - m.y * m.y;
        m
    }

    /// Second moments, orientation and head-tail asymmetry of an image.
    ///
    /// Fails for fewer than two pixels or less than 1 p.e. in total.
    pub fn second_moments(
        &self,
        image: &CleanedImage,
        amplitudes: &PixelAmplitudes,
        cut_id: u8,
    ) -> Result<HillasParameters, ImageError> {
        if image.len() < MIN_IMAGE_PIXELS {
            return Err(ImageError::TooFewPixels { found: image.len() });
        }
        let total = image.amplitude(amplitudes);
        if total < MIN_IMAGE_AMPLITUDE {
            return Err(ImageError::InsufficientAmplitude { total });
        }

        let scale = self.camera.angular_scale();
        let rotation = self.camera.rotation;
        let m = self.moments(image, amplitudes);
        let axis = m.axis();
        let floor = FLOOR_EXTENT * scale;
        let extent = |e: f64| if e > 0.0 { scale * e } else { floor };
        let (length, width) = (extent(axis.length), extent(axis.width));

        // Half-axis pointing away from the camera centre.
        let mut beta = axis.b.atan();
        if beta.cos() * m.x + beta.sin() * m.y < 0.0 {
            beta += PI;
        }
        let (sb, cb) = beta.sin_cos();
        let mut distance = scale * m.x.hypot(m.y);
        if distance <= 0.0 {
            distance = floor;
        }
        let miss = scale * axis.a.abs() / (axis.b * axis.b + 1.0).sqrt();
        let mut alpha = if miss / distance <= 1.0 {
            (miss / distance).asin()
        } else {
            FRAC_PI_2
        };
        let mut direction = beta + rotation;
        let orientation = m.y.atan2(m.x) + rotation;
        let (sr, cr) = rotation.sin_cos();
        let x = scale * (cr * m.x - sr * m.y);
        let y = scale * (sr * m.x + cr * m.y);

        let (mut s2, mut s3, mut s4) = (0.0, 0.0, 0.0);
        for p in image.iter() {
            let a = amplitudes.get(p);
            let xp = cb * (self.camera.x[p] - m.x) + sb * (self.camera.y[p] - m.y);
            let w = a * xp * xp;
            s2 += w;
            s3 += w * xp;
            s4 += w * xp * xp;
        }
        let (s2, s3, s4) = (s2 / m.sum, s3 / m.sum, s4 / m.sum);
        let (skewness, kurtosis) = if s2 > 0.0 {
            (s3 / s2.powf(1.5), s4 / (s2 * s2) - 3.0)
        } else {
            (0.0, 0.0)
        };
        if skewness < 0.0 {
            alpha = PI - alpha;
            direction += PI;
        }

        Ok(HillasParameters {
            cut_id,
            amplitude: m.sum,
            pixels: image.len(),
            x,
            y,
            width,
            length,
            distance,
            miss,
            alpha,
            orientation,
            direction,
            skewness,
            kurtosis,
            num_saturated: amplitudes.saturated,
            clip_amplitude: self.clip_amplitude,
            hot_pixels: Self::hot_pixels(image, amplitudes),
            total_amplitude: None,
            timing: None,
        })
    }
}
