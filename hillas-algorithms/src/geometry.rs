//! Coordinate tools for stereo reconstruction.
//!
//! Angles are in radians. Camera offsets are in units of the focal length
//! passed in; with a focal length of one they are tangent-plane offsets.
#![allow(clippy::similar_names, clippy::many_single_char_names)]

use std::f64::consts::{PI, TAU};

use hillas_core::Pointing;

/// Determinants below this are treated as zero.
const LINE_EPSILON: f64 = 1e-14;

/// Rotations smaller than this are skipped.
const MIN_ROTATION: f64 = 1e-14;

/// A straight line in a plane, through `(x, y)` at angle `phi` to the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImageLine {
    /// Point on the line, x.
    pub x: f64,
    /// Point on the line, y.
    pub y: f64,
    /// Orientation [rad].
    pub phi: f64,
}

impl ImageLine {
    /// Creates a line.
    #[must_use]
    pub fn new(x: f64, y: f64, phi: f64) -> Self {
        Self { x, y, phi }
    }
}

/// Outcome of intersecting two lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intersection {
    /// The lines cross at `(x, y)`; `angle` is the crossing angle in `[0, π]`.
    Point { x: f64, y: f64, angle: f64 },
    /// Both lines are the same; `(x, y)` is the midpoint of the two points.
    Coincident { x: f64, y: f64 },
    /// Parallel, distinct lines.
    Parallel,
}

/// Distance of `point` from the line through `origin` along `direction`.
///
/// Returns `None` if `direction` has zero length.
#[must_use]
pub fn line_point_distance(origin: [f64; 3], direction: [f64; 3], point: [f64; 3]) -> Option<f64> {
    let [cx, cy, cz] = direction;
    let dx = origin[0] - point[0];
    let dy = origin[1] - point[1];
    let dz = origin[2] - point[2];
    let a = (dy * cz - dz * cy).powi(2) + (dz * cx - dx * cz).powi(2) + (dx * cy - dy * cx).powi(2);
    let b = cx * cx + cy * cy + cz * cz;
    if a < 0.0 || b <= 0.0 {
        return None;
    }
    Some((a / b).sqrt())
}

/// Offset of `object` in the focal plane of a telescope pointing at
/// `telescope`, as `(x, y)`.
#[must_use]
pub fn angles_to_offset(object: Pointing, telescope: Pointing, focal_length: f64) -> (f64, f64) {
    let daz = object.azimuth - telescope.azimuth;
    let (sin_daz, cos_daz) = daz.sin_cos();
    let (sin_alt, cos_alt) = object.altitude.sin_cos();
    let xp0 = -cos_daz * cos_alt;
    let yp0 = sin_daz * cos_alt;
    let zp0 = sin_alt;

    let (cx, sx) = telescope.altitude.sin_cos();
    let xp1 = cx * xp0 + sx * zp0;
    let yp1 = yp0;
    let zp1 = -sx * xp0 + cx * zp0;

    if xp1.hypot(yp1) <= 0.0 {
        return (0.0, 0.0);
    }
    let s = focal_length / zp1;
    (s * xp1, s * yp1)
}

/// Direction seen at focal-plane offset `(x, y)` of a telescope pointing at
/// `telescope`. The azimuth is wrapped into `[0, 2π)`.
#[must_use]
pub fn offset_to_angles(x: f64, y: f64, telescope: Pointing, focal_length: f64) -> Pointing {
    let d = x.hypot(y);
    if d <= 0.0 {
        return telescope;
    }
    let q = (d / focal_length).atan();
    let (sin_q, cos_q) = q.sin_cos();
    let xp1 = x * sin_q / d;
    let yp1 = y * sin_q / d;
    let zp1 = cos_q;

    let (cx, sx) = telescope.altitude.sin_cos();
    let xp0 = cx * xp1 - sx * zp1;
    let yp0 = yp1;
    let zp0 = sx * xp1 + cx * zp1;

    Pointing::new(
        wrap_azimuth(yp0.atan2(-xp0) + telescope.azimuth),
        zp0.clamp(-1.0, 1.0).asin(),
    )
}

/// Rotation from ground coordinates into the frame whose z axis points
/// along `direction`.
///
/// Rows are the x, y, z axes of the new frame in ground coordinates.
#[must_use]
pub fn shower_transformation_matrix(direction: Pointing) -> [[f64; 3]; 3] {
    let (sin_az, cos_az) = direction.azimuth.sin_cos();
    // Zenith angle from altitude.
    let (cos_z, sin_z) = direction.altitude.sin_cos();
    [
        [cos_z * cos_az, -cos_z * sin_az, -sin_z],
        [sin_az, cos_az, 0.0],
        [sin_z * cos_az, -sin_z * sin_az, cos_z],
    ]
}

/// Transforms an image axis from the camera of a telescope pointing at
/// `telescope` into the tangent plane around `reference`.
///
/// `camera_rotation` is applied to the line first. The returned line has a
/// unit focal length.
#[must_use]
pub fn camera_to_reference(
    line: ImageLine,
    camera_rotation: f64,
    telescope: Pointing,
    reference: Pointing,
    focal_length: f64,
) -> ImageLine {
    let (mut x, mut y) = (line.x, line.y);
    if camera_rotation.abs() > MIN_ROTATION {
        let (s, c) = camera_rotation.sin_cos();
        (x, y) = (x * c + y * s, y * c - x * s);
    }

    let image = offset_to_angles(x, y, telescope, focal_length);
    let sin_alt = image.altitude.sin();
    let dphi1 = -((image.azimuth - telescope.azimuth).tan() * sin_alt).atan();
    let (xr, yr) = angles_to_offset(image, reference, 1.0);
    let dphi2 = -((image.azimuth - reference.azimuth).tan() * sin_alt).atan();

    ImageLine::new(xr, yr, line.phi + camera_rotation + (dphi2 - dphi1))
}

/// Intersects two lines given in Hesse normal form.
#[must_use]
pub fn intersect_lines(first: ImageLine, second: ImageLine) -> Intersection {
    let (s1, c1) = first.phi.sin_cos();
    let (s2, c2) = second.phi.sin_cos();
    let (a1, b1, k1) = (s1, -c1, first.y * c1 - first.x * s1);
    let (a2, b2, k2) = (s2, -c2, second.y * c2 - second.x * s2);

    let det_ab = a1 * b2 - a2 * b1;
    let det_bc = b1 * k2 - b2 * k1;
    let det_ca = k1 * a2 - k2 * a1;

    if det_ab.abs() < LINE_EPSILON {
        if det_bc.abs() < LINE_EPSILON && det_ca.abs() < LINE_EPSILON {
            return Intersection::Coincident {
                x: 0.5 * (first.x + second.x),
                y: 0.5 * (first.y + second.y),
            };
        }
        return Intersection::Parallel;
    }

    let x = det_bc / det_ab;
    let y = det_ca / det_ab;

    let (dx1, dy1) = (first.x - x, first.y - y);
    let (dx2, dy2) = (second.x - x, second.y - y);
    let dr = dx1.hypot(dy1) * dx2.hypot(dy2);
    let angle = if dr > 0.0 {
        ((dx1 * dx2 + dy1 * dy2) / dr).clamp(-1.0, 1.0).acos()
    } else {
        // A point sits on the crossing; only the line directions are left.
        (first.phi - second.phi).sin().abs().asin()
    };
    Intersection::Point { x, y, angle }
}

/// Angle between two directions.
#[must_use]
pub fn angle_between(a: Pointing, b: Pointing) -> f64 {
    let unit = |p: Pointing| {
        let (sin_alt, cos_alt) = p.altitude.sin_cos();
        [
            p.azimuth.cos() * cos_alt,
            (-p.azimuth).sin() * cos_alt,
            sin_alt,
        ]
    };
    let (u, v) = (unit(a), unit(b));
    (u[0] * v[0] + u[1] * v[1] + u[2] * v[2])
        .clamp(-1.0, 1.0)
        .acos()
}

/// Wraps an azimuth into `[0, 2π)`.
#[must_use]
pub fn wrap_azimuth(azimuth: f64) -> f64 {
    let wrapped = azimuth.rem_euclid(TAU);
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Folds an angle into `(-π, π]`.
#[must_use]
pub fn fold_angle(angle: f64) -> f64 {
    let folded = angle.rem_euclid(TAU);
    if folded > PI {
        folded - TAU
    } else {
        folded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_crossed_lines_at_shared_centroid() {
        let a = ImageLine::new(0.01, -0.02, FRAC_PI_4);
        let b = ImageLine::new(0.01, -0.02, -FRAC_PI_4);
        match intersect_lines(a, b) {
            Intersection::Point { x, y, angle } => {
                assert_relative_eq!(x, 0.01, epsilon = 1e-12);
                assert_relative_eq!(y, -0.02, epsilon = 1e-12);
                assert_relative_eq!(angle, FRAC_PI_2, epsilon = 1e-12);
            }
            other => panic!("expected a crossing, got {other:?}"),
        }
    }

    #[test]
    fn test_crossing_angle_from_points() {
        let a = ImageLine::new(-1.0, 0.0, 0.0);
        let b = ImageLine::new(1.0, 1.0, FRAC_PI_2);
        let Intersection::Point { x, y, angle } = intersect_lines(a, b) else {
            panic!("lines must cross");
        };
        assert_relative_eq!(x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(angle, FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_parallel_and_coincident() {
        let a = ImageLine::new(0.0, 0.0, 0.3);
        let shifted = ImageLine::new(0.0, 1.0, 0.3);
        assert_eq!(intersect_lines(a, shifted), Intersection::Parallel);

        let (s, c) = 0.3f64.sin_cos();
        let along = ImageLine::new(2.0 * c, 2.0 * s, 0.3 + PI);
        match intersect_lines(a, along) {
            Intersection::Coincident { x, y } => {
                assert_relative_eq!(x, c, epsilon = 1e-12);
                assert_relative_eq!(y, s, epsilon = 1e-12);
            }
            other => panic!("expected coincident lines, got {other:?}"),
        }
    }

    #[test]
    fn test_offset_round_trip() {
        let telescope = Pointing::new(0.4, 1.1);
        let object = offset_to_angles(0.02, -0.015, telescope, 1.0);
        let (x, y) = angles_to_offset(object, telescope, 1.0);
        assert_relative_eq!(x, 0.02, epsilon = 1e-12);
        assert_relative_eq!(y, -0.015, epsilon = 1e-12);
        assert_relative_eq!(
            angle_between(object, telescope),
            (0.02f64.hypot(0.015)).atan(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_pointing_direction_is_centre() {
        let telescope = Pointing::new(5.0, 0.9);
        let (x, y) = angles_to_offset(telescope, telescope, 16.0);
        assert!(x.abs() < 1e-12 && y.abs() < 1e-12);
        assert_eq!(offset_to_angles(0.0, 0.0, telescope, 16.0), telescope);
    }

    #[test]
    fn test_camera_to_reference_same_pointing() {
        let pointing = Pointing::new(1.0, 1.2);
        let line = ImageLine::new(0.01, 0.005, 0.7);
        let out = camera_to_reference(line, 0.0, pointing, pointing, 1.0);
        assert_relative_eq!(out.x, line.x, epsilon = 1e-12);
        assert_relative_eq!(out.y, line.y, epsilon = 1e-12);
        assert_relative_eq!(out.phi, line.phi, epsilon = 1e-12);
    }

    #[test]
    fn test_transformation_matrix_is_rotation() {
        let t = shower_transformation_matrix(Pointing::new(0.7, 1.0));
        for i in 0..3 {
            for j in 0..3 {
                let dot: f64 = (0..3).map(|k| t[i][k] * t[j][k]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(dot, expected, epsilon = 1e-12);
            }
        }
        // Vertical showers look straight down the z axis.
        let vertical = shower_transformation_matrix(Pointing::new(0.0, FRAC_PI_2));
        assert_relative_eq!(vertical[2][2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_line_point_distance() {
        let d = line_point_distance([0.0, 0.0, 0.0], [0.0, 0.0, 2.0], [3.0, 4.0, 7.0]);
        assert_relative_eq!(d.unwrap(), 5.0, epsilon = 1e-12);
        assert_eq!(line_point_distance([0.0; 3], [0.0; 3], [1.0, 0.0, 0.0]), None);
    }

    #[test]
    fn test_angle_helpers() {
        assert_relative_eq!(wrap_azimuth(-0.5), TAU - 0.5, epsilon = 1e-12);
        assert_relative_eq!(fold_angle(1.5 * PI), -0.5 * PI, epsilon = 1e-12);
        assert_relative_eq!(
            angle_between(Pointing::new(0.0, 0.0), Pointing::new(FRAC_PI_2, 0.0)),
            FRAC_PI_2,
            epsilon = 1e-12
        );
    }
}
