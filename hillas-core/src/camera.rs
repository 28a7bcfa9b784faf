//! Camera geometry types.
#![allow(clippy::cast_precision_loss)]

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pixel (tessellation) shape of a camera.
///
/// The discriminants are the legacy numeric shape ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PixelShape {
    /// Round pixels (typically on a hexagonal grid).
    Circular = 0,
    /// Hexagons with a vertex on top; neighbors at 0°, 60°, 120°.
    HexPointed = 1,
    /// Square pixels; neighbors at 0° and 90°.
    Square = 2,
    /// Hexagons with a flat top; neighbors at 30°, 90°, 150°.
    HexFlat = 3,
    /// Not declared and not yet inferred.
    #[default]
    Unknown = -1,
}

impl PixelShape {
    /// Returns the legacy numeric shape id.
    #[must_use]
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Converts a legacy numeric shape id.
    #[must_use]
    pub fn from_id(id: i32) -> Self {
        match id {
            0 => Self::Circular,
            1 => Self::HexPointed,
            2 => Self::Square,
            3 => Self::HexFlat,
            _ => Self::Unknown,
        }
    }

    /// Expected ratio of pixel area to size squared.
    #[must_use]
    pub fn area_ratio(self) -> Option<f64> {
        match self {
            Self::Circular => Some(std::f64::consts::FRAC_PI_4),
            Self::HexPointed | Self::HexFlat => Some(3.0_f64.sqrt() / 2.0),
            Self::Square => Some(1.0),
            Self::Unknown => None,
        }
    }
}

/// Geometry of one telescope camera, stored column-wise.
///
/// Pixel positions and sizes are in the focal plane (metres); angular
/// offsets are obtained by dividing by the focal length.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraGeometry {
    /// Pixel x positions.
    pub x: Vec<f64>,
    /// Pixel y positions.
    pub y: Vec<f64>,
    /// Pixel linear size (flat-to-flat or diameter).
    pub size: Vec<f64>,
    /// Pixel area.
    pub area: Vec<f64>,
    /// Declared pixel shape ([`PixelShape::Unknown`] if not declared).
    #[cfg_attr(feature = "serde", serde(default))]
    pub shape: PixelShape,
    /// Effective focal length.
    pub focal_length: f64,
    /// Camera rotation angle [rad].
    #[cfg_attr(feature = "serde", serde(default))]
    pub rotation: f64,
}

impl CameraGeometry {
    /// Creates a camera with pre-allocated pixel columns.
    #[must_use]
    pub fn with_capacity(capacity: usize, focal_length: f64) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            size: Vec::with_capacity(capacity),
            area: Vec::with_capacity(capacity),
            shape: PixelShape::Unknown,
            focal_length,
            rotation: 0.0,
        }
    }

    /// Appends a pixel.
    pub fn push(&mut self, x: f64, y: f64, size: f64, area: f64) {
        self.x.push(x);
        self.y.push(y);
        self.size.push(size);
        self.area.push(area);
    }

    /// Sets the declared pixel shape.
    #[must_use]
    pub fn with_shape(mut self, shape: PixelShape) -> Self {
        self.shape = shape;
        self
    }

    /// Sets the camera rotation angle [rad].
    #[must_use]
    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    /// Returns the number of pixels.
    #[must_use]
    pub fn num_pixels(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the camera has no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Conversion from focal-plane distance to angle [rad per length unit].
    #[must_use]
    pub fn angular_scale(&self) -> f64 {
        1.0 / self.focal_length
    }

    /// Distance of a pixel centre from the camera centre.
    #[must_use]
    pub fn radius(&self, pixel: usize) -> f64 {
        self.x[pixel].hypot(self.y[pixel])
    }

    /// Checks that all pixel columns agree in length and the focal length is usable.
    pub fn validate(&self) -> Result<()> {
        let n = self.x.len();
        for (what, len) in [
            ("pixel y", self.y.len()),
            ("pixel size", self.size.len()),
            ("pixel area", self.area.len()),
        ] {
            if len != n {
                return Err(Error::BufferMismatch {
                    what,
                    expected: n,
                    found: len,
                });
            }
        }
        if !(self.focal_length > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "focal length must be positive, got {}",
                self.focal_length
            )));
        }
        Ok(())
    }

    /// Checks that a pixel index lies inside the camera.
    pub fn check_pixel(&self, pixel: usize) -> Result<()> {
        if pixel < self.num_pixels() {
            Ok(())
        } else {
            Err(Error::PixelOutOfRange {
                pixel,
                count: self.num_pixels(),
            })
        }
    }
}

/// Angular size of the active part of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraRadius {
    /// 1.5 times the mean radius of active pixels [rad].
    pub effective: f64,
    /// Largest radius of an active pixel [rad].
    pub max: f64,
    /// Number of active pixels.
    pub active_pixels: usize,
}

impl CameraRadius {
    /// Computes the camera radius over all pixels not flagged in `disabled`.
    ///
    /// Returns `None` for cameras with fewer than two pixels or no active pixel.
    #[must_use]
    pub fn compute(camera: &CameraGeometry, disabled: &[bool]) -> Option<Self> {
        if camera.num_pixels() < 2 {
            return None;
        }
        let mut sum_r = 0.0;
        let mut max_r = 0.0_f64;
        let mut active = 0usize;
        for pixel in 0..camera.num_pixels() {
            if disabled.get(pixel).copied().unwrap_or(false) {
                continue;
            }
            let r = camera.radius(pixel);
            sum_r += r;
            max_r = max_r.max(r);
            active += 1;
        }
        if active == 0 {
            return None;
        }
        Some(Self {
            effective: 1.5 * sum_r / active as f64 / camera.focal_length,
            max: max_r / camera.focal_length,
            active_pixels: active,
        })
    }
}
