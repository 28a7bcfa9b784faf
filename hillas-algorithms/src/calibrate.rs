//! Conversion of pulse sums into calibrated pixel amplitudes.
//!
//! Amplitudes are first computed in mean photo-electrons from the
//! pedestal-subtracted high-gain sum, falling back to low gain outside the
//! high-gain range, and then converted to peak photo-electrons with the
//! calibration scale.
#![allow(clippy::missing_errors_doc, clippy::similar_names)]

use hillas_core::{
    AdcData, AmplitudeSource, CalibrationConfig, CalibrationConstants, CentralTrigger,
    ChannelSelection, Error, Gain, PixelAmplitudes, PixelCalibrated, PixelTiming, Result,
    TelescopeEvent,
};
use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::disabled::DisabledPixels;

/// High-gain range (exclusive) for single samples, pedestal subtracted.
pub const SAMPLE_HIGH_GAIN_RANGE: (f64, f64) = (-300.0, 2000.0);

/// Calibrates one telescope with fixed constants and disabled mask.
#[derive(Debug, Clone, Copy)]
pub struct PixelCalibrator<'a> {
    constants: &'a CalibrationConstants,
    disabled: &'a DisabledPixels,
    config: &'a CalibrationConfig,
}

struct ChannelState {
    hg_known: bool,
    lg_known: bool,
}

impl<'a> PixelCalibrator<'a> {
    /// Creates a calibrator.
    #[must_use]
    pub fn new(
        constants: &'a CalibrationConstants,
        disabled: &'a DisabledPixels,
        config: &'a CalibrationConfig,
    ) -> Self {
        Self {
            constants,
            disabled,
            config,
        }
    }

    fn channels(&self, adc: &AdcData, pixel: usize) -> ChannelState {
        let two_gains = adc.num_gains >= 2;
        let hg_known = if self.config.channels == ChannelSelection::LowGainOnly && two_gains {
            false
        } else {
            adc.has_gain(Gain::High) && adc.known[Gain::High.index()][pixel]
        };
        let lg_known = two_gains
            && self.config.channels != ChannelSelection::HighGainOnly
            && adc.known[Gain::Low.index()][pixel];
        ChannelState { hg_known, lg_known }
    }

    fn select(
        &self,
        range: (f64, f64),
        channels: &ChannelState,
        num_gains: usize,
        sig_hg: f64,
        npe_hg: f64,
        npe_lg: f64,
    ) -> f64 {
        if channels.hg_known && sig_hg > range.0 && sig_hg < range.1 {
            npe_hg
        } else if num_gains >= 2 {
            npe_lg
        } else {
            npe_hg
        }
    }

    /// Calibrates all pixels of one telescope event.
    ///
    /// Raw data is preferred; without it the pre-calibrated amplitudes are
    /// used. Disabled pixels are always zero and insignificant.
    pub fn calibrate(&self, tel_id: u32, event: &TelescopeEvent) -> Result<PixelAmplitudes> {
        match (&event.adc, &event.calibrated) {
            (Some(adc), _) => self.calibrate_raw(adc, event.timing.as_ref()),
            (None, Some(calibrated)) => Ok(self.calibrate_precalibrated(calibrated)),
            (None, None) => Err(Error::MissingData(tel_id)),
        }
    }

    /// Output always covers the camera; pixels missing from the input stay zero.
    fn calibrate_precalibrated(&self, calibrated: &PixelCalibrated) -> PixelAmplitudes {
        let npix = self.disabled.as_slice().len();
        let mut amps = PixelAmplitudes::zeroed(npix);
        let usable = npix
            .min(calibrated.pixel_pe.len())
            .min(calibrated.significant.len());
        if usable < npix || calibrated.pixel_pe.len() != calibrated.significant.len() {
            debug!(
                "pre-calibrated data covers {usable} of {npix} pixels ({} amplitudes, {} flags)",
                calibrated.pixel_pe.len(),
                calibrated.significant.len()
            );
        }
        let pixels = calibrated.pixel_pe[..usable]
            .iter()
            .zip(&calibrated.significant[..usable])
            .enumerate();
        for (pixel, (&pe, &significant)) in pixels {
            if self.disabled.is_disabled(pixel) || !significant {
                continue;
            }
            amps.amplitude[pixel] = pe;
            amps.significant[pixel] = true;
        }
        amps
    }

    /// Calibrates raw sums (or timing pulse sums, per configured source).
    pub fn calibrate_raw(
        &self,
        adc: &AdcData,
        timing: Option<&PixelTiming>,
    ) -> Result<PixelAmplitudes> {
        adc.validate()?;
        self.constants.validate(adc.num_pixels, adc.num_gains)?;
        let scale = self.config.scale();
        let clip = self.config.clip_amplitude;
        let source = match (self.config.source, timing) {
            (AmplitudeSource::AdcSum, _) | (_, None) => None,
            (source, Some(timing)) => {
                let sums = match source {
                    AmplitudeSource::TimingGlobal => timing.pulse_sum_global.as_ref(),
                    _ => timing.pulse_sum_local.as_ref(),
                };
                sums.map(|sums| (source, timing, sums))
            }
        };

        let mut amps = PixelAmplitudes::zeroed(adc.num_pixels);
        for pixel in 0..adc.num_pixels {
            if self.disabled.is_disabled(pixel) {
                continue;
            }
            let channels = self.channels(adc, pixel);
            let (sig_hg, sig_lg) = match source {
                Some((source, timing, sums)) => {
                    let stored = timing.pixel(pixel).is_some()
                        || (source == AmplitudeSource::TimingGlobal
                            && !timing.global_only_selected);
                    if stored {
                        (
                            stored_sum(sums, Gain::High, pixel),
                            stored_sum(sums, Gain::Low, pixel),
                        )
                    } else {
                        (0.0, 0.0)
                    }
                }
                None => {
                    let sig = |gain: Gain, known: bool| {
                        if known {
                            adc.sums[gain.index()][pixel] - self.constants.pedestal(gain, pixel)
                        } else {
                            0.0
                        }
                    };
                    (
                        sig(Gain::High, channels.hg_known),
                        sig(Gain::Low, channels.lg_known),
                    )
                }
            };
            let npe_hg = sig_hg * self.constants.factor(Gain::High, pixel);
            let npe_lg = if adc.has_gain(Gain::Low) {
                sig_lg * self.constants.factor(Gain::Low, pixel)
            } else {
                0.0
            };

            let significant = adc.significant[pixel];
            let mut npe = if significant {
                self.select(
                    self.config.high_gain_range,
                    &channels,
                    adc.num_gains,
                    sig_hg,
                    npe_hg,
                    npe_lg,
                )
            } else {
                0.0
            };
            if clip > 0.0 && npe > clip {
                npe = clip;
                amps.saturated += 1;
            }
            amps.amplitude[pixel] = scale * npe;
            amps.significant[pixel] = significant;
        }
        Ok(amps)
    }

    /// Calibrated amplitude of a single time slice [peak p.e.].
    ///
    /// Returns 0 for disabled or unread pixels and out-of-range samples.
    #[must_use]
    pub fn calibrate_sample(&self, adc: &AdcData, pixel: usize, sample: usize) -> f64 {
        let Some(traces) = adc.traces.as_ref() else {
            return 0.0;
        };
        let ns = traces.num_samples;
        if self.disabled.is_disabled(pixel)
            || pixel >= adc.num_pixels
            || ns <= 1
            || sample >= ns
            || !adc.significant[pixel]
        {
            return 0.0;
        }
        let channels = self.channels(adc, pixel);
        let sig = |gain: Gain| {
            f64::from(traces.trace(gain, pixel)[sample])
                - self.constants.sample_pedestal(gain, pixel, ns)
        };
        let sig_hg = if channels.hg_known {
            sig(Gain::High)
        } else {
            0.0
        };
        let npe_hg = sig_hg * self.constants.factor(Gain::High, pixel);
        let npe = if channels.lg_known {
            let npe_lg = sig(Gain::Low) * self.constants.factor(Gain::Low, pixel);
            self.select(
                SAMPLE_HIGH_GAIN_RANGE,
                &channels,
                adc.num_gains,
                sig_hg,
                npe_hg,
                npe_lg,
            )
        } else {
            npe_hg
        };
        self.config.scale() * npe
    }
}

fn stored_sum(sums: &[Vec<f64>], gain: Gain, pixel: usize) -> f64 {
    sums.get(gain.index())
        .and_then(|s| s.get(pixel))
        .copied()
        .unwrap_or(0.0)
}

/// Multiplies every conversion factor by `exp(g)` with `g ~ N(0, sigma)`.
///
/// Simulates an imperfect calibration; `sigma <= 0` leaves the constants alone.
pub fn apply_calibration_error<R: Rng + ?Sized>(
    constants: &mut CalibrationConstants,
    sigma: f64,
    rng: &mut R,
) -> Result<()> {
    if sigma <= 0.0 {
        return Ok(());
    }
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| Error::InvalidConfig(format!("calibration error {sigma}: {e}")))?;
    for factors in &mut constants.factor {
        for factor in factors.iter_mut() {
            *factor *= normal.sample(rng).exp();
        }
    }
    Ok(())
}

/// Drops disabled pixels from the trigger list and revokes the telescope
/// trigger if fewer than `min_multiplicity` triggered pixels remain.
///
/// Returns true if the telescope was revoked.
pub fn revoke_disabled_trigger(
    event: &mut TelescopeEvent,
    central: &mut CentralTrigger,
    tel_index: usize,
    disabled: &DisabledPixels,
    min_multiplicity: usize,
) -> bool {
    if !disabled.any() {
        return false;
    }
    let before = event.trigger_pixels.len();
    event
        .trigger_pixels
        .retain(|&pixel| !disabled.is_disabled(pixel));
    if event.trigger_pixels.len() == before || event.trigger_pixels.len() >= min_multiplicity {
        return false;
    }
    debug!(
        "telescope {} no longer triggered: {} of {} trigger pixels left",
        event.tel_id,
        event.trigger_pixels.len(),
        before
    );
    event.known = false;
    central.remove(event.tel_id, tel_index);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use hillas_core::{RawWaveform, TimeKind, TimeSlot};

    fn constants() -> CalibrationConstants {
        CalibrationConstants::uniform(3, &[100.0, 50.0], &[0.1, 2.0])
    }

    fn event(adc: AdcData) -> TelescopeEvent {
        TelescopeEvent {
            tel_id: 1,
            known: true,
            adc: Some(adc),
            ..Default::default()
        }
    }

    #[test]
    fn test_high_gain_preferred() {
        let cal = constants();
        let disabled = DisabledPixels::none(3);
        let config = CalibrationConfig::default().with_calib_scale(1.0);
        let calibrator = PixelCalibrator::new(&cal, &disabled, &config);

        let mut adc = AdcData::new(3, 2);
        adc.sums[0] = vec![1100.0, 20100.0, 100.0];
        adc.sums[1] = vec![55.0, 150.0, 50.0];
        let amps = calibrator.calibrate(1, &event(adc)).unwrap();
        assert!((amps.amplitude[0] - 100.0).abs() < 1e-9);
        // High gain above 10000 ADC counts: low gain takes over.
        assert!((amps.amplitude[1] - 200.0).abs() < 1e-9);
        assert!(amps.amplitude[2].abs() < 1e-12);
        assert!(amps.significant.iter().all(|&s| s));
    }

    #[test]
    fn test_disabled_and_insignificant_pixels() {
        let cal = constants();
        let mut setup = hillas_core::TelescopeSetup::default();
        setup.camera.push(0.0, 0.0, 0.1, 0.01);
        setup.camera.push(0.1, 0.0, 0.1, 0.01);
        setup.camera.push(0.2, 0.0, 0.1, 0.01);
        setup.camera.focal_length = 10.0;
        setup.hv_disabled = vec![0];
        let disabled = DisabledPixels::build(
            &setup,
            &hillas_core::TelescopeConfig::default(),
            &mut <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(0),
        )
        .unwrap();
        let config = CalibrationConfig::default();
        let calibrator = PixelCalibrator::new(&cal, &disabled, &config);

        let mut adc = AdcData::new(3, 1);
        adc.sums[0] = vec![500.0, 500.0, 500.0];
        adc.significant[2] = false;
        let amps = calibrator.calibrate(1, &event(adc)).unwrap();
        assert!(amps.amplitude[0].abs() < f64::EPSILON);
        assert!(!amps.significant[0]);
        assert!((amps.amplitude[1] - 0.92 * 40.0).abs() < 1e-9);
        assert!(amps.amplitude[2].abs() < f64::EPSILON);
        assert!(!amps.significant[2]);
    }

    #[test]
    fn test_clipping_counts_saturation() {
        let cal = constants();
        let disabled = DisabledPixels::none(3);
        let config = CalibrationConfig::default()
            .with_calib_scale(1.0)
            .with_clip_amplitude(50.0);
        let calibrator = PixelCalibrator::new(&cal, &disabled, &config);
        let mut adc = AdcData::new(3, 1);
        adc.sums[0] = vec![1100.0, 300.0, 2100.0];
        let amps = calibrator.calibrate(1, &event(adc)).unwrap();
        assert_eq!(amps.saturated, 2);
        assert!((amps.amplitude[0] - 50.0).abs() < 1e-9);
        assert!((amps.amplitude[1] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_channel_selection() {
        let cal = constants();
        let disabled = DisabledPixels::none(3);
        let config = CalibrationConfig::default()
            .with_calib_scale(1.0)
            .with_channels(ChannelSelection::LowGainOnly);
        let calibrator = PixelCalibrator::new(&cal, &disabled, &config);
        let mut adc = AdcData::new(3, 2);
        adc.sums[0] = vec![1100.0; 3];
        adc.sums[1] = vec![60.0; 3];
        let amps = calibrator.calibrate(1, &event(adc)).unwrap();
        assert!((amps.amplitude[0] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_precalibrated_fallback() {
        let cal = constants();
        let disabled = DisabledPixels::none(3);
        let config = CalibrationConfig::default();
        let calibrator = PixelCalibrator::new(&cal, &disabled, &config);
        let event = TelescopeEvent {
            tel_id: 2,
            calibrated: Some(PixelCalibrated {
                pixel_pe: vec![3.0, 4.0, 5.0],
                significant: vec![true, false, true],
            }),
            ..Default::default()
        };
        let amps = calibrator.calibrate(2, &event).unwrap();
        assert_eq!(amps.amplitude, vec![3.0, 0.0, 5.0]);

        let empty = TelescopeEvent::default();
        assert_eq!(calibrator.calibrate(4, &empty), Err(Error::MissingData(4)));
    }

    #[test]
    fn test_precalibrated_lengths_are_bounded() {
        let cal = constants();
        let disabled = DisabledPixels::none(3);
        let config = CalibrationConfig::default();
        let calibrator = PixelCalibrator::new(&cal, &disabled, &config);

        let short_flags = TelescopeEvent {
            tel_id: 2,
            calibrated: Some(PixelCalibrated {
                pixel_pe: vec![3.0, 4.0, 5.0],
                significant: vec![true],
            }),
            ..Default::default()
        };
        let amps = calibrator.calibrate(2, &short_flags).unwrap();
        assert_eq!(amps.amplitude, vec![3.0, 0.0, 0.0]);
        assert_eq!(amps.significant, vec![true, false, false]);

        let too_long = TelescopeEvent {
            tel_id: 2,
            calibrated: Some(PixelCalibrated {
                pixel_pe: vec![1.0; 5],
                significant: vec![true; 5],
            }),
            ..Default::default()
        };
        let amps = calibrator.calibrate(2, &too_long).unwrap();
        assert_eq!(amps.amplitude, vec![1.0; 3]);
    }

    #[test]
    fn test_timing_local_source() {
        let cal = constants();
        let disabled = DisabledPixels::none(3);
        let config = CalibrationConfig::default()
            .with_calib_scale(1.0)
            .with_source(AmplitudeSource::TimingLocal);
        let calibrator = PixelCalibrator::new(&cal, &disabled, &config);
        let mut timing =
            PixelTiming::new(3, vec![TimeSlot::new(TimeKind::PeakPosition, 0.0)], 1.0);
        timing.values[0] = Some(vec![5.0]);
        timing.pulse_sum_local = Some(vec![vec![300.0; 3], vec![15.0; 3]]);
        let mut ev = event(AdcData::new(3, 2));
        ev.timing = Some(timing);
        let amps = calibrator.calibrate(1, &ev).unwrap();
        assert!((amps.amplitude[0] - 30.0).abs() < 1e-9);
        // No significant peak: no local sum.
        assert!(amps.amplitude[1].abs() < 1e-12);
    }

    #[test]
    fn test_sample_calibration() {
        let cal = constants();
        let disabled = DisabledPixels::none(3);
        let config = CalibrationConfig::default().with_calib_scale(1.0);
        let calibrator = PixelCalibrator::new(&cal, &disabled, &config);
        let mut traces = RawWaveform::zeroed(2, 3, 10);
        traces.trace_mut(Gain::High, 0)[4] = 110;
        traces.trace_mut(Gain::High, 1)[4] = 2500;
        traces.trace_mut(Gain::Low, 1)[4] = 105;
        let adc = AdcData::new(3, 2).with_traces(traces);
        // Sample pedestal is 10 (high) and 5 (low).
        assert!((calibrator.calibrate_sample(&adc, 0, 4) - 1.0).abs() < 1e-9);
        assert!((calibrator.calibrate_sample(&adc, 1, 4) - 200.0).abs() < 1e-9);
        assert!(calibrator.calibrate_sample(&adc, 0, 10).abs() < f64::EPSILON);
    }

    #[test]
    fn test_calibration_error_scatters_factors() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(3);
        let mut cal = CalibrationConstants::uniform(200, &[100.0], &[1.0]);
        apply_calibration_error(&mut cal, 0.0, &mut rng).unwrap();
        assert!(cal.factor[0].iter().all(|&f| (f - 1.0).abs() < f64::EPSILON));

        apply_calibration_error(&mut cal, 0.1, &mut rng).unwrap();
        assert!(cal.factor[0].iter().all(|&f| f > 0.0));
        let logs: Vec<f64> = cal.factor[0].iter().map(|f| f.ln()).collect();
        let mean = logs.iter().sum::<f64>() / 200.0;
        let rms = (logs.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / 200.0).sqrt();
        assert!(mean.abs() < 0.03);
        assert!(rms > 0.07 && rms < 0.13);
        // Pedestals stay untouched.
        assert!(cal.pedestal[0].iter().all(|&p| (p - 100.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_trigger_revocation() {
        let mut setup = hillas_core::TelescopeSetup::default();
        for i in 0..4 {
            setup.camera.push(f64::from(i) * 0.1, 0.0, 0.1, 0.01);
        }
        setup.camera.focal_length = 10.0;
        setup.hv_disabled = vec![1, 2];
        let disabled = DisabledPixels::build(
            &setup,
            &hillas_core::TelescopeConfig::default(),
            &mut <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(0),
        )
        .unwrap();

        let mut central = CentralTrigger {
            triggered: vec![3, 7],
            with_data: vec![3, 7],
            triggered_pattern: 0b11,
            data_pattern: 0b11,
        };
        let mut ev = TelescopeEvent {
            tel_id: 7,
            known: true,
            trigger_pixels: vec![0, 1, 2, 3],
            ..Default::default()
        };
        assert!(revoke_disabled_trigger(&mut ev, &mut central, 1, &disabled, 3));
        assert!(!ev.known);
        assert_eq!(ev.trigger_pixels, vec![0, 3]);
        assert_eq!(central.triggered, vec![3]);
        assert_eq!(central.triggered_pattern, 0b01);

        let mut kept = TelescopeEvent {
            tel_id: 3,
            known: true,
            trigger_pixels: vec![0, 1, 3],
            ..Default::default()
        };
        assert!(!revoke_disabled_trigger(&mut kept, &mut central, 0, &disabled, 2));
        assert!(kept.known);
    }
}
