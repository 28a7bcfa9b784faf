//! Disabled-pixel masks and the active camera radius.
#![allow(clippy::missing_errors_doc)]

use hillas_core::{CameraGeometry, CameraRadius, Error, Result, TelescopeConfig, TelescopeSetup};
use log::{debug, info};
use rand::Rng;

/// Per-pixel disabled flags of one telescope, fixed for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisabledPixels {
    mask: Vec<bool>,
    count: usize,
}

impl DisabledPixels {
    /// No pixel disabled.
    #[must_use]
    pub fn none(num_pixels: usize) -> Self {
        Self {
            mask: vec![false; num_pixels],
            count: 0,
        }
    }

    /// Builds the mask from HV-off pixels, the clipping radius and random breakage.
    ///
    /// A pixel is clipped if `r + size/2 >= tan(clip) * focal_length`.
    pub fn build<R: Rng + ?Sized>(
        setup: &TelescopeSetup,
        config: &TelescopeConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let camera = &setup.camera;
        let npix = camera.num_pixels();
        let mut disabled = Self::none(npix);

        let clip_radius = config.camera_clipping_deg.to_radians().tan() * camera.focal_length;
        let fraction = config.broken_pixel_fraction;
        for pixel in 0..npix {
            let clipped = clip_radius > 0.0
                && camera.radius(pixel) + 0.5 * camera.size[pixel] >= clip_radius;
            let broken = fraction > 0.0 && rng.random::<f64>() < fraction;
            if clipped || broken {
                disabled.disable(pixel);
            }
        }
        for &pixel in &setup.hv_disabled {
            camera.check_pixel(pixel)?;
            disabled.disable(pixel);
        }

        if disabled.count > 0 {
            debug!(
                "telescope {}: {} of {} pixels disabled",
                setup.tel_id, disabled.count, npix
            );
        }
        Ok(disabled)
    }

    /// Marks one pixel disabled.
    pub fn disable(&mut self, pixel: usize) {
        if !self.mask[pixel] {
            self.mask[pixel] = true;
            self.count += 1;
        }
    }

    /// Returns true if the pixel is disabled.
    #[inline]
    #[must_use]
    pub fn is_disabled(&self, pixel: usize) -> bool {
        self.mask.get(pixel).copied().unwrap_or(false)
    }

    /// Number of disabled pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns true if any pixel is disabled.
    #[must_use]
    pub fn any(&self) -> bool {
        self.count > 0
    }

    /// Flags as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.mask
    }
}

/// Computes and logs the radius of the active camera area.
pub fn camera_radius(
    tel_id: u32,
    camera: &CameraGeometry,
    disabled: &DisabledPixels,
) -> Result<CameraRadius> {
    let radius = CameraRadius::compute(camera, disabled.as_slice()).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "telescope {tel_id}: camera needs at least two active pixels"
        ))
    })?;
    info!(
        "CT{} with {} pixels ({} active) has effective radius {:5.3} deg, max. radius {:5.3} deg",
        tel_id,
        camera.num_pixels(),
        radius.active_pixels,
        radius.effective.to_degrees(),
        radius.max.to_degrees()
    );
    Ok(radius)
}
