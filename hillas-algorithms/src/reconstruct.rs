//! Stereo reconstruction of shower direction and core position from the
//! major axes of two or more images.
//!
//! Image axes are moved into the tangent plane around a common reference
//! direction and intersected pairwise. Each intersection is weighted with
//! `(A_red · sin θ · disp_i · disp_j)²`, where `A_red = A_i·A_j/(A_i+A_j)`
//! and `θ` is the crossing angle. The same weighting is repeated with the
//! axes placed at the telescope positions projected onto the shower plane
//! to find the core.
#![allow(clippy::cast_precision_loss)]

use hillas_core::shower::{
    RESULT_CORE, RESULT_CORE_ERROR, RESULT_DIRECTION, RESULT_DIRECTION_ERROR,
};
use hillas_core::{
    ArrayShowerEstimate, HillasParameters, Pointing, ReconstructionConfig, ReconstructionError,
    TelescopeImage,
};
use log::{debug, trace};

use crate::geometry::{
    camera_to_reference, intersect_lines, offset_to_angles, shower_transformation_matrix,
    wrap_azimuth, ImageLine, Intersection,
};

/// Weight sums below this mean no usable intersection.
const MIN_WEIGHT_SUM: f64 = 1e-10;

/// Per-telescope image selection limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSelection {
    /// Minimum image amplitude [p.e.].
    pub min_amplitude: f64,
    /// Minimum number of image pixels.
    pub min_pixels: usize,
    /// Largest accepted centroid distance from the camera centre [rad].
    pub max_centroid_radius: f64,
}

/// One image axis entering the reconstruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelescopeLine {
    /// Telescope id.
    pub tel_id: u32,
    /// Image amplitude [p.e.].
    pub amplitude: f64,
    /// Centroid and orientation in the camera.
    pub line: ImageLine,
    /// Elongation weight `1 - width/length`.
    pub disp: f64,
    /// Telescope position [m].
    pub position: [f64; 3],
    /// Telescope pointing.
    pub pointing: Pointing,
    /// Rotation still to be applied to the line [rad].
    pub camera_rotation: f64,
    /// Focal length in units of the line coordinates.
    pub focal_length: f64,
}

impl TelescopeLine {
    /// Line from image parameters that are already angular and rotated.
    #[must_use]
    pub fn from_parameters(
        tel_id: u32,
        params: &HillasParameters,
        position: [f64; 3],
        pointing: Pointing,
    ) -> Self {
        Self {
            tel_id,
            amplitude: params.amplitude,
            line: ImageLine::new(params.x, params.y, params.direction),
            disp: params.disp(),
            position,
            pointing,
            camera_rotation: 0.0,
            focal_length: 1.0,
        }
    }
}

/// Weighted sums of intersection points.
#[derive(Debug, Clone, Copy, Default)]
struct WeightedPoints {
    w: f64,
    wx: f64,
    wy: f64,
    wxx: f64,
    wyy: f64,
}

impl WeightedPoints {
    fn add(&mut self, x: f64, y: f64, w: f64) {
        self.w += w;
        self.wx += w * x;
        self.wy += w * y;
        self.wxx += w * x * x;
        self.wyy += w * y * y;
    }

    fn mean(&self) -> Option<(f64, f64)> {
        (self.w.abs() >= MIN_WEIGHT_SUM).then(|| (self.wx / self.w, self.wy / self.w))
    }

    /// Summed variance of x and y around the mean.
    fn variance(&self) -> f64 {
        let (mx, my) = (self.wx / self.w, self.wy / self.w);
        (self.wxx / self.w - mx * mx) + (self.wyy / self.w - my * my)
    }
}

/// Pairwise weighted intersections of a set of lines.
///
/// Coincident pairs are only used if no pair crosses.
fn weighted_intersection(lines: &[ImageLine], amplitudes: &[f64], disp: &[f64]) -> WeightedPoints {
    let mut crossing = WeightedPoints::default();
    let mut coincident = WeightedPoints::default();
    for i in 0..lines.len() {
        for j in 0..i {
            let reduced = amplitudes[i] * amplitudes[j] / (amplitudes[i] + amplitudes[j]);
            let elongation = reduced * disp[i] * disp[j];
            match intersect_lines(lines[i], lines[j]) {
                Intersection::Point { x, y, angle } => {
                    let w = (elongation * angle.sin()).powi(2);
                    trace!("pair ({i}, {j}) crosses at ({x:.5}, {y:.5}), weight {w:.3e}");
                    crossing.add(x, y, w);
                }
                Intersection::Coincident { x, y } => coincident.add(x, y, elongation.powi(2)),
                Intersection::Parallel => {}
            }
        }
    }
    if crossing.mean().is_none() && coincident.mean().is_some() {
        debug!("only coincident image axes, using their midpoints");
        return coincident;
    }
    crossing
}

/// Shower direction and core from the image axes of several telescopes.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowerGeometryReconstructor {
    config: ReconstructionConfig,
    reference: Pointing,
}

impl ShowerGeometryReconstructor {
    /// Creates a reconstructor working in the tangent plane around `reference`.
    #[must_use]
    pub fn new(config: ReconstructionConfig, reference: Pointing) -> Self {
        Self { config, reference }
    }

    /// Reference direction of the common frame.
    #[must_use]
    pub fn reference(&self) -> Pointing {
        self.reference
    }

    /// Picks the parameter set of `image` used for reconstruction, if the
    /// image passes the selection.
    #[must_use]
    pub fn select_line(
        &self,
        image: &TelescopeImage,
        position: [f64; 3],
        selection: &ImageSelection,
    ) -> Option<TelescopeLine> {
        let params = image.select(self.config.cut_id)?;
        if params.amplitude < selection.min_amplitude {
            trace!(
                "telescope {}: amplitude {:.1} below {:.1}",
                image.tel_id,
                params.amplitude,
                selection.min_amplitude
            );
            return None;
        }
        if params.pixels < selection.min_pixels {
            trace!("telescope {}: only {} pixels", image.tel_id, params.pixels);
            return None;
        }
        if params.centroid_radius() > selection.max_centroid_radius {
            trace!("telescope {}: centroid too far out", image.tel_id);
            return None;
        }
        Some(TelescopeLine::from_parameters(
            image.tel_id,
            params,
            position,
            image.pointing,
        ))
    }

    /// Reconstructs direction and, if possible, core position.
    ///
    /// `num_triggered` is recorded with the result. Lines at or below the
    /// configured amplitude floor are ignored.
    pub fn reconstruct(
        &self,
        num_triggered: usize,
        lines: &[TelescopeLine],
    ) -> Result<ArrayShowerEstimate, ReconstructionError> {
        if lines.len() < 2 {
            return Err(ReconstructionError::TooFewImages { found: lines.len() });
        }
        let used: Vec<&TelescopeLine> = lines
            .iter()
            .filter(|l| l.amplitude > self.config.min_line_amplitude)
            .collect();

        let amplitudes: Vec<f64> = used.iter().map(|l| l.amplitude).collect();
        let disp: Vec<f64> = used.iter().map(|l| l.disp).collect();
        let reference_lines: Vec<ImageLine> = used
            .iter()
            .map(|l| {
                camera_to_reference(
                    l.line,
                    l.camera_rotation,
                    l.pointing,
                    self.reference,
                    l.focal_length,
                )
            })
            .collect();

        let directions = weighted_intersection(&reference_lines, &amplitudes, &disp);
        let (mx, my) = directions
            .mean()
            .ok_or(ReconstructionError::NoIntersections)?;
        let shower = offset_to_angles(mx, my, self.reference, 1.0);
        let shower = Pointing::new(wrap_azimuth(shower.azimuth), shower.altitude);

        let mut estimate = ArrayShowerEstimate {
            azimuth: shower.azimuth,
            altitude: shower.altitude,
            num_triggered,
            telescopes: lines.iter().map(|l| l.tel_id).collect(),
            result_bits: RESULT_DIRECTION,
            ..Default::default()
        };
        let stereo = lines.len() > 2;
        if stereo {
            estimate.var_direction = directions.variance();
            estimate.err_direction = Some(error_estimate(estimate.var_direction, lines.len()));
            estimate.result_bits |= RESULT_DIRECTION_ERROR;
        }

        let frame = if self.config.use_reference_direction_for_core {
            self.reference
        } else {
            shower
        };
        let t = shower_transformation_matrix(frame);
        let ground_lines: Vec<ImageLine> = used
            .iter()
            .zip(&reference_lines)
            .map(|(l, r)| {
                let p = l.position;
                ImageLine::new(
                    t[0][0] * p[0] + t[0][1] * p[1] + t[0][2] * p[2],
                    t[1][0] * p[0] + t[1][1] * p[1] + t[1][2] * p[2],
                    r.phi,
                )
            })
            .collect();

        let cores = weighted_intersection(&ground_lines, &amplitudes, &disp);
        let Some((xs, ys)) = cores.mean() else {
            debug!("direction only: no usable intersection in the shower plane");
            return Ok(estimate);
        };
        let xh = t[0][0] * xs + t[1][0] * ys;
        let yh = t[0][1] * xs + t[1][1] * ys;
        let zh = t[0][2] * xs + t[1][2] * ys;
        estimate.x_core = xh - t[2][0] * zh / t[2][2];
        estimate.y_core = yh - t[2][1] * zh / t[2][2];
        estimate.result_bits |= RESULT_CORE;
        if stereo {
            estimate.var_core = cores.variance();
            estimate.err_core = Some(error_estimate(estimate.var_core, lines.len()));
            estimate.result_bits |= RESULT_CORE_ERROR;
        }
        Ok(estimate)
    }
}

/// Per-axis error from a summed variance over `n` images.
fn error_estimate(variance: f64, n: usize) -> f64 {
    (variance.max(0.0) / (n - 2) as f64 / 2.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    const ZENITH: Pointing = Pointing {
        azimuth: 0.0,
        altitude: FRAC_PI_2,
    };

    fn line(tel_id: u32, x: f64, y: f64, phi: f64, position: [f64; 3]) -> TelescopeLine {
        TelescopeLine {
            tel_id,
            amplitude: 200.0,
            line: ImageLine::new(x, y, phi),
            disp: 0.5,
            position,
            pointing: ZENITH,
            camera_rotation: 0.0,
            focal_length: 1.0,
        }
    }

    #[test]
    fn test_two_crossing_axes() {
        let reco = ShowerGeometryReconstructor::new(ReconstructionConfig::default(), ZENITH);
        // Both axes pass through the camera centre.
        let lines = [
            line(1, 0.02, 0.0, 0.0, [100.0, 0.0, 0.0]),
            line(2, 0.0, 0.02, FRAC_PI_2, [0.0, 100.0, 0.0]),
        ];
        let estimate = reco.reconstruct(2, &lines).unwrap();
        assert_relative_eq!(estimate.altitude, FRAC_PI_2, epsilon = 1e-9);
        assert_relative_eq!(estimate.var_direction, 0.0);
        assert_eq!(estimate.result_bits, RESULT_DIRECTION | RESULT_CORE);
        assert_eq!(estimate.telescopes, vec![1, 2]);
        assert!(estimate.err_direction.is_none());
    }

    #[test]
    fn test_too_few_images() {
        let reco = ShowerGeometryReconstructor::new(ReconstructionConfig::default(), ZENITH);
        let lines = [line(1, 0.0, 0.0, 0.0, [0.0; 3])];
        assert_eq!(
            reco.reconstruct(3, &lines),
            Err(ReconstructionError::TooFewImages { found: 1 })
        );
    }

    #[test]
    fn test_faint_images_do_not_intersect() {
        let reco = ShowerGeometryReconstructor::new(ReconstructionConfig::default(), ZENITH);
        let mut lines = [
            line(1, 0.0, 0.0, 0.0, [0.0; 3]),
            line(2, 0.0, 0.0, 1.0, [50.0, 0.0, 0.0]),
        ];
        lines[1].amplitude = 10.0;
        assert_eq!(
            reco.reconstruct(2, &lines),
            Err(ReconstructionError::NoIntersections)
        );
    }

    #[test]
    fn test_parallel_axes_fail() {
        let reco = ShowerGeometryReconstructor::new(ReconstructionConfig::default(), ZENITH);
        let lines = [
            line(1, 0.0, 0.0, 0.2, [0.0; 3]),
            line(2, 0.0, 0.01, 0.2, [50.0, 0.0, 0.0]),
        ];
        assert_eq!(
            reco.reconstruct(2, &lines),
            Err(ReconstructionError::NoIntersections)
        );
    }

    #[test]
    fn test_error_estimate() {
        assert_relative_eq!(error_estimate(8.0, 4), 2.0);
        assert_relative_eq!(error_estimate(-1e-18, 3), 0.0);
    }
}
