//! Per-run context and the event pipeline: integration, calibration,
//! cleaning, image parameters and stereo geometry.
#![allow(clippy::missing_errors_doc)]

use std::sync::OnceLock;

use hillas_core::image::{CUT_ID_TAILCUT, CUT_ID_TIMING};
use hillas_core::{
    AmplitudeSource, AnalysisConfig, ArrayEvent, ArrayShowerEstimate, CalibrationConfig,
    CameraRadius, CleanedImage, Error, Gain, HillasParameters, ImageError, PixelAmplitudes,
    Pointing, ReconstructionError, Result, RunSetup, TelescopeConfig, TelescopeEvent,
    TelescopeImage, TelescopeSetup,
};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::calibrate::{apply_calibration_error, revoke_disabled_trigger, PixelCalibrator};
use crate::cleaning::ImageCleaner;
use crate::disabled::{camera_radius, DisabledPixels};
use crate::hillas::HillasAnalyzer;
use crate::integration::{integrator_for, IntegrationContext, PulseIntegrator};
use crate::neighbors::NeighborGraph;
use crate::reconstruct::{ImageSelection, ShowerGeometryReconstructor};
use crate::timing::pixel_timing_analysis;

/// State of one telescope that is fixed for a run.
pub struct CameraContext {
    index: usize,
    setup: TelescopeSetup,
    config: TelescopeConfig,
    disabled: DisabledPixels,
    radius: CameraRadius,
    integrator: Option<Box<dyn PulseIntegrator>>,
    neighbors: OnceLock<Result<NeighborGraph>>,
    correction: OnceLock<[f64; 2]>,
}

impl std::fmt::Debug for CameraContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraContext")
            .field("tel_id", &self.setup.tel_id)
            .field("disabled", &self.disabled.count())
            .field("radius", &self.radius)
            .field("integrator", &self.integrator.as_ref().map(|i| i.name()))
            .finish_non_exhaustive()
    }
}

impl CameraContext {
    fn new(
        index: usize,
        setup: TelescopeSetup,
        config: TelescopeConfig,
        rng: &mut StdRng,
    ) -> Result<Self> {
        setup.camera.validate()?;
        let disabled = DisabledPixels::build(&setup, &config, rng)?;
        let radius = camera_radius(setup.tel_id, &setup.camera, &disabled)?;
        let integrator = integrator_for(&config.integration);
        Ok(Self {
            index,
            setup,
            config,
            disabled,
            radius,
            integrator,
            neighbors: OnceLock::new(),
            correction: OnceLock::new(),
        })
    }

    /// Telescope id.
    #[must_use]
    pub fn tel_id(&self) -> u32 {
        self.setup.tel_id
    }

    /// Run setup of the telescope.
    #[must_use]
    pub fn setup(&self) -> &TelescopeSetup {
        &self.setup
    }

    /// Settings for this telescope's type.
    #[must_use]
    pub fn config(&self) -> &TelescopeConfig {
        &self.config
    }

    /// Disabled pixels.
    #[must_use]
    pub fn disabled(&self) -> &DisabledPixels {
        &self.disabled
    }

    /// Radius of the active camera area.
    #[must_use]
    pub fn radius(&self) -> CameraRadius {
        self.radius
    }

    /// Neighbor relations, built on first use.
    pub fn neighbors(&self) -> Result<&NeighborGraph> {
        self.neighbors
            .get_or_init(|| NeighborGraph::build(&self.setup.camera, &self.config.neighbors))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Per-gain integration correction, computed on first use.
    ///
    /// Zero (no correction) unless rescaling is enabled or the scheme needs it.
    #[must_use]
    pub fn correction(&self) -> [f64; 2] {
        *self.correction.get_or_init(|| {
            let Some(integrator) = self.integrator.as_ref() else {
                return [0.0; 2];
            };
            if !(self.config.integration.rescale || integrator.requires_correction()) {
                return [0.0; 2];
            }
            let Some(pulse) = self.setup.reference_pulse.as_ref() else {
                debug!(
                    "telescope {}: no reference pulse, sums are not rescaled",
                    self.setup.tel_id
                );
                return [0.0; 2];
            };
            let correction = Gain::ALL.map(|gain| integrator.correction(pulse, gain));
            debug!(
                "telescope {}: {} correction {:.4} (high gain), {:.4} (low gain)",
                self.setup.tel_id,
                integrator.name(),
                correction[0],
                correction[1]
            );
            correction
        })
    }

    fn selection(&self, max_cog_fraction: f64) -> ImageSelection {
        ImageSelection {
            min_amplitude: self.config.min_amplitude(),
            min_pixels: self.config.min_pixels,
            max_centroid_radius: max_cog_fraction * self.radius.effective,
        }
    }
}

/// Amplitudes, image and parameters (or why there are none) of one set.
type ImageSet = (
    PixelAmplitudes,
    CleanedImage,
    std::result::Result<HillasParameters, ImageError>,
);

/// Results for one event.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventResult {
    /// Event number.
    pub event_id: u64,
    /// Images of all telescopes that were analysed.
    pub images: Vec<TelescopeImage>,
    /// Stereo result, if it succeeded.
    pub shower: Option<ArrayShowerEstimate>,
    /// Why there is no stereo result.
    #[cfg_attr(feature = "serde", serde(default))]
    pub shower_status: Option<ReconstructionError>,
}

/// Everything fixed for one run, shared read-only between events.
#[derive(Debug)]
pub struct RunContext {
    run_id: u32,
    config: AnalysisConfig,
    cameras: Vec<CameraContext>,
    reconstructor: ShowerGeometryReconstructor,
}

impl RunContext {
    /// Sets up all telescopes of a run: calibration error (if simulated),
    /// disabled pixels, camera radius and the pulse integrator.
    pub fn new(run: RunSetup, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let cameras = run
            .telescopes
            .into_iter()
            .enumerate()
            .map(|(index, mut setup)| {
                let sigma = config.calibration_error;
                apply_calibration_error(&mut setup.calibration, sigma, &mut rng)?;
                let tel_config = config.for_type(setup.tel_type).clone();
                CameraContext::new(index, setup, tel_config, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            "run {}: {} telescopes, reference direction az {:.2} deg, alt {:.2} deg",
            run.run_id,
            cameras.len(),
            run.reference.azimuth.to_degrees(),
            run.reference.altitude.to_degrees()
        );
        let reconstructor =
            ShowerGeometryReconstructor::new(config.reconstruction.clone(), run.reference);
        Ok(Self {
            run_id: run.run_id,
            config,
            cameras,
            reconstructor,
        })
    }

    /// Run number.
    #[must_use]
    pub fn run_id(&self) -> u32 {
        self.run_id
    }

    /// Reference direction of the run.
    #[must_use]
    pub fn reference(&self) -> Pointing {
        self.reconstructor.reference()
    }

    /// Analysis configuration.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// All telescopes, in run order.
    #[must_use]
    pub fn cameras(&self) -> &[CameraContext] {
        &self.cameras
    }

    /// Telescope context by id.
    pub fn camera(&self, tel_id: u32) -> Result<&CameraContext> {
        self.cameras
            .iter()
            .find(|c| c.tel_id() == tel_id)
            .ok_or(Error::InvalidTelescope(tel_id))
    }

    /// Integrates (if configured) and calibrates the data of one telescope,
    /// then derives the image and its parameter sets.
    ///
    /// Image-level failures are recorded in the returned status; setup
    /// problems are returned as errors.
    pub fn analyze_telescope(
        &self,
        camera: &CameraContext,
        event: &mut TelescopeEvent,
    ) -> Result<TelescopeImage> {
        let neighbors = camera.neighbors()?;
        if let (Some(integrator), Some(adc)) = (camera.integrator.as_ref(), event.adc.as_mut()) {
            let ctx = IntegrationContext {
                pedestals: &camera.setup.calibration,
                neighbors,
                correction: camera.correction(),
            };
            integrator.integrate(&ctx, adc, &mut event.timing)?;
            trace!("telescope {}: {} integration done", event.tel_id, integrator.name());
        }

        let calibration = &camera.config.calibration;
        let primary = if self.config.timing_image {
            calibration.clone().with_source(AmplitudeSource::AdcSum)
        } else {
            calibration.clone()
        };
        let mut result = TelescopeImage {
            tel_id: event.tel_id,
            pointing: event.tracking.pointing(),
            ..Default::default()
        };
        let (amplitudes, image, params) =
            self.image_set(camera, neighbors, event, &primary, CUT_ID_TAILCUT)?;
        result.amplitudes = amplitudes;
        result.image = image;
        match params {
            Ok(mut params) => {
                match pixel_timing_analysis(
                    &camera.setup.camera,
                    &camera.disabled,
                    &result.image,
                    &result.amplitudes,
                    &params,
                    event.timing.as_ref(),
                ) {
                    Ok(timing) => params.timing = Some(timing),
                    Err(err) => trace!("telescope {}: {err}", event.tel_id),
                }
                result.parameters.push(params);
            }
            Err(err) => {
                debug!("telescope {}: no image ({err})", event.tel_id);
                result.status = Some(err);
                return Ok(result);
            }
        }

        if self.config.timing_image {
            if event.timing.is_some() {
                let source = match calibration.source {
                    AmplitudeSource::AdcSum => AmplitudeSource::TimingLocal,
                    other => other,
                };
                let secondary = calibration.clone().with_source(source);
                let (_, _, params) =
                    self.image_set(camera, neighbors, event, &secondary, CUT_ID_TIMING)?;
                match params {
                    Ok(params) => result.parameters.push(params),
                    Err(err) => trace!("telescope {}: no timing image ({err})", event.tel_id),
                }
            } else {
                trace!("telescope {}: no timing for second image", event.tel_id);
            }
        }
        Ok(result)
    }

    /// Calibration, cleaning and second moments with one amplitude source.
    fn image_set(
        &self,
        camera: &CameraContext,
        neighbors: &NeighborGraph,
        event: &TelescopeEvent,
        calibration: &CalibrationConfig,
        cut_id: u8,
    ) -> Result<ImageSet> {
        let calibrator =
            PixelCalibrator::new(&camera.setup.calibration, &camera.disabled, calibration);
        let amplitudes = calibrator.calibrate(event.tel_id, event)?;
        let cleaner =
            ImageCleaner::new(neighbors, &camera.disabled, camera.config.cleaning.clone())?;
        let image = cleaner.clean(&amplitudes);
        let analyzer = HillasAnalyzer::new(&camera.setup.camera)
            .with_clip_amplitude(calibration.clip_amplitude);
        let params = analyzer
            .second_moments(&image, &amplitudes, cut_id)
            .map(|mut params| {
                if self.config.total_amplitude {
                    params.total_amplitude = Some(amplitudes.total());
                }
                params
            });
        Ok((amplitudes, image, params))
    }

    /// Runs the full pipeline on one event.
    pub fn reconstruct_event(&self, mut event: ArrayEvent) -> Result<EventResult> {
        let ArrayEvent {
            event_id,
            central,
            telescopes,
        } = &mut event;

        let mut images = Vec::with_capacity(telescopes.len());
        let mut lines = Vec::new();
        for tel_event in telescopes.iter_mut() {
            let camera = self.camera(tel_event.tel_id)?;
            revoke_disabled_trigger(
                tel_event,
                central,
                camera.index,
                &camera.disabled,
                camera.setup.min_pixel_multiplicity,
            );
            if !tel_event.known {
                continue;
            }
            if tel_event.adc.is_none() && tel_event.calibrated.is_none() {
                warn!(
                    "event {event_id}: telescope {} has neither raw nor calibrated data",
                    tel_event.tel_id
                );
                continue;
            }
            let image = self.analyze_telescope(camera, tel_event)?;
            if image.is_known() {
                let selection = camera.selection(self.config.reconstruction.max_cog_fraction);
                if let Some(line) =
                    self.reconstructor
                        .select_line(&image, camera.setup.position, &selection)
                {
                    lines.push(line);
                }
            }
            images.push(image);
        }

        let num_triggered = images.iter().filter(|i| i.is_known()).count();
        let (shower, shower_status) = match self.reconstructor.reconstruct(num_triggered, &lines)
        {
            Ok(shower) => {
                debug!(
                    "event {event_id}: shower az {:.3} deg, alt {:.3} deg from {} images",
                    shower.azimuth.to_degrees(),
                    shower.altitude.to_degrees(),
                    shower.num_images()
                );
                (Some(shower), None)
            }
            Err(err) => {
                debug!("event {event_id}: {err}");
                (None, Some(err))
            }
        };
        Ok(EventResult {
            event_id: *event_id,
            images,
            shower,
            shower_status,
        })
    }
}

/// Processes independent events in parallel; results keep the input order.
pub fn process_events(ctx: &RunContext, events: Vec<ArrayEvent>) -> Result<Vec<EventResult>> {
    let results = events
        .into_par_iter()
        .map(|event| ctx.reconstruct_event(event))
        .collect::<Result<Vec<_>>>()?;
    let showers = results.iter().filter(|r| r.shower.is_some()).count();
    info!(
        "run {}: {} events processed, {} with shower geometry",
        ctx.run_id,
        results.len(),
        showers
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hillas_core::{AdcData, CalibrationConstants, CameraGeometry, Tracking};

    /// A small hexagonal-ish patch: a row of 5 pixels.
    fn run() -> RunSetup {
        let mut camera = CameraGeometry::with_capacity(5, 10.0);
        for i in 0..5 {
            camera.push(f64::from(i) * 0.05 - 0.1, 0.0, 0.05, 0.0025);
        }
        RunSetup {
            run_id: 7,
            reference: Pointing::new(0.0, 1.2),
            telescopes: vec![TelescopeSetup {
                tel_id: 3,
                camera,
                calibration: CalibrationConstants::uniform(5, &[100.0], &[1.0]),
                ..Default::default()
            }],
        }
    }

    fn event(sums: [f64; 5]) -> TelescopeEvent {
        let mut adc = AdcData::new(5, 1);
        adc.sums[0] = sums.to_vec();
        TelescopeEvent {
            tel_id: 3,
            known: true,
            adc: Some(adc),
            tracking: Tracking {
                raw: Pointing::new(0.0, 1.2),
                corrected: None,
            },
            ..Default::default()
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::default().with_telescope(
            TelescopeConfig::default()
                .with_calibration(CalibrationConfig::default().with_calib_scale(1.0)),
        )
    }

    #[test]
    fn test_unknown_telescope_is_an_error() {
        let ctx = RunContext::new(run(), config()).unwrap();
        assert_eq!(ctx.camera(9).unwrap_err(), Error::InvalidTelescope(9));
    }

    #[test]
    fn test_calibration_error_is_seeded() {
        let factors = |seed: u64| {
            let config = config().with_calibration_error(0.2).with_seed(seed);
            let ctx = RunContext::new(run(), config).unwrap();
            ctx.camera(3).unwrap().setup().calibration.factor[0].clone()
        };
        assert_eq!(factors(5), factors(5));
        assert_ne!(factors(5), factors(6));
        assert!(factors(5).iter().any(|&f| (f - 1.0).abs() > 1e-6));
    }

    #[test]
    fn test_analyze_telescope() {
        let ctx = RunContext::new(run(), config().with_total_amplitude(true)).unwrap();
        let camera = ctx.camera(3).unwrap();
        let mut tel = event([100.0, 130.0, 180.0, 120.0, 101.0]);
        let image = ctx.analyze_telescope(camera, &mut tel).unwrap();
        assert_eq!(image.image.pixels, vec![1, 2, 3]);
        let params = &image.parameters[0];
        assert_eq!(params.cut_id, CUT_ID_TAILCUT);
        assert!((params.amplitude - 130.0).abs() < 1e-9);
        assert_eq!(params.total_amplitude, Some(131.0));
        assert!(image.status.is_none());
    }

    #[test]
    fn test_empty_image_is_recorded() {
        let ctx = RunContext::new(run(), config()).unwrap();
        let camera = ctx.camera(3).unwrap();
        let mut tel = event([100.0; 5]);
        let image = ctx.analyze_telescope(camera, &mut tel).unwrap();
        assert!(!image.is_known());
        assert_eq!(image.status, Some(ImageError::TooFewPixels { found: 0 }));
    }

    #[test]
    fn test_single_telescope_has_no_shower() {
        let ctx = RunContext::new(run(), config()).unwrap();
        let event = ArrayEvent {
            event_id: 11,
            telescopes: vec![event([100.0, 130.0, 180.0, 120.0, 101.0])],
            ..Default::default()
        };
        let results = process_events(&ctx, vec![event]).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].event_id, 11);
        assert_eq!(results[0].images.len(), 1);
        assert!(results[0].shower.is_none());
        assert_eq!(
            results[0].shower_status,
            Some(ReconstructionError::TooFewImages { found: 1 })
        );
    }
}
