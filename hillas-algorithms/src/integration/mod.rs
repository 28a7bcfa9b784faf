//! Pulse integration strategies.
//!
//! Every strategy rewrites the per-gain sums of an [`AdcData`] from its
//! sampled traces. Sums keep including a pedestal for the full trace
//! length, so calibration can subtract the same pedestal as for delivered
//! sums. Pixels without usable data get exactly their pedestal.
#![allow(clippy::cast_precision_loss, clippy::missing_errors_doc)]

mod correction;
mod fixed;
mod neighbor;
mod peak;
mod shaped;

pub use correction::{interpolate, window_correction};
pub use fixed::FixedWindow;
pub use neighbor::NeighborPeak;
pub use peak::{GlobalPeak, LocalPeak};
pub use shaped::{shape_trace, ShapedNeighborPeak, POLE_ZERO, UPSAMPLING};

use hillas_core::{
    AdcData, CalibrationConstants, Error, Gain, IntegrationConfig, IntegrationScheme,
    PixelTiming, ReferencePulse, Result,
};

use crate::neighbors::NeighborGraph;

/// Per-telescope inputs shared by all strategies.
#[derive(Debug, Clone, Copy)]
pub struct IntegrationContext<'a> {
    /// Pedestals of the full-trace sums.
    pub pedestals: &'a CalibrationConstants,
    /// Neighbor relations of the camera.
    pub neighbors: &'a NeighborGraph,
    /// Per-gain correction factor (values <= 0 disable the correction).
    pub correction: [f64; 2],
}

impl IntegrationContext<'_> {
    /// Correction factor for a gain.
    #[must_use]
    pub fn correction(&self, gain: Gain) -> f64 {
        self.correction[gain.index()]
    }
}

/// A pulse integration scheme.
pub trait PulseIntegrator: Send + Sync {
    /// Scheme name.
    fn name(&self) -> &'static str;

    /// Per-gain window correction derived from the reference pulse.
    fn correction(&self, pulse: &ReferencePulse, gain: Gain) -> f64;

    /// Sums are meaningless without the correction, even if rescaling is off.
    fn requires_correction(&self) -> bool {
        false
    }

    /// Rewrites the sums of `adc`; may also rewrite `timing`.
    fn integrate(
        &self,
        ctx: &IntegrationContext<'_>,
        adc: &mut AdcData,
        timing: &mut Option<PixelTiming>,
    ) -> Result<()>;
}

/// Placement along the image time gradient. Not available.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gradient;

impl PulseIntegrator for Gradient {
    fn name(&self) -> &'static str {
        "gradient"
    }

    fn correction(&self, _pulse: &ReferencePulse, _gain: Gain) -> f64 {
        1.0
    }

    fn integrate(
        &self,
        _ctx: &IntegrationContext<'_>,
        _adc: &mut AdcData,
        _timing: &mut Option<PixelTiming>,
    ) -> Result<()> {
        Err(Error::UnimplementedStrategy("gradient integration"))
    }
}

/// Builds the integrator for a configuration, or `None` for delivered sums.
#[must_use]
pub fn integrator_for(config: &IntegrationConfig) -> Option<Box<dyn PulseIntegrator>> {
    let integrator: Box<dyn PulseIntegrator> = match config.scheme {
        IntegrationScheme::Delivered => return None,
        IntegrationScheme::Fixed => Box::new(FixedWindow::new(config.window, config.offset)),
        IntegrationScheme::GlobalPeak => Box::new(GlobalPeak::new(
            config.window,
            config.offset,
            config.thresholds,
        )),
        IntegrationScheme::LocalPeak => Box::new(LocalPeak::new(
            config.window,
            config.offset,
            config.thresholds,
        )),
        IntegrationScheme::NeighborPeak => Box::new(NeighborPeak::new(
            config.window,
            config.offset,
            config.local_weight,
        )),
        IntegrationScheme::ShapedNeighborPeak => Box::new(ShapedNeighborPeak::new(
            config.window,
            config.offset,
            config.local_weight,
            config.extraction,
            config.record_timing,
        )
        .with_timing_threshold(config.thresholds[Gain::High.index()])),
        IntegrationScheme::Gradient => Box::new(Gradient),
    };
    Some(integrator)
}

/// Start of a window of `len` samples beginning `before` samples ahead of
/// `peak`, kept inside `[0, num_samples)`.
#[must_use]
pub fn window_start(peak: usize, before: usize, len: usize, num_samples: usize) -> usize {
    peak.saturating_sub(before).min(num_samples.saturating_sub(len))
}

/// Sum of `len` samples from `start`, padded with the pedestal of the
/// samples left out and rescaled with `correction` (if positive).
#[must_use]
pub fn window_sum(trace: &[u16], start: usize, len: usize, pedestal: f64, correction: f64) -> f64 {
    let ns = trace.len();
    let mut sum: f64 = trace[start..start + len].iter().map(|&s| f64::from(s)).sum();
    if len != ns {
        sum += (ns - len) as f64 * pedestal / ns as f64;
        if correction > 0.0 {
            sum = (sum - pedestal) * correction + pedestal;
        }
    }
    sum
}

/// First sample at least `threshold` above the sample pedestal and the
/// maximum from there on, as `(index, amplitude above pedestal)`.
#[must_use]
pub fn significant_peak(trace: &[u16], sample_pedestal: f64, threshold: f64) -> Option<(usize, f64)> {
    let first = trace
        .iter()
        .position(|&s| f64::from(s) - sample_pedestal >= threshold)?;
    let mut peak = first;
    let mut value = trace[first];
    for (i, &s) in trace.iter().enumerate().skip(first + 1) {
        if s > value {
            peak = i;
            value = s;
        }
    }
    Some((peak, f64::from(value) - sample_pedestal))
}

/// Resets every sum to its pedestal.
pub(crate) fn reset_to_pedestal(adc: &mut AdcData, pedestals: &CalibrationConstants) {
    for gain in Gain::ALL {
        if !adc.has_gain(gain) {
            continue;
        }
        for pixel in 0..adc.num_pixels {
            adc.sums[gain.index()][pixel] = pedestals.pedestal(gain, pixel);
        }
    }
}

/// Checks shapes; returns the number of samples, or `None` if the data
/// carries no usable traces.
pub(crate) fn prepare(adc: &AdcData, pedestals: &CalibrationConstants) -> Result<Option<usize>> {
    adc.validate()?;
    pedestals.validate(adc.num_pixels, adc.num_gains)?;
    match adc.traces.as_ref() {
        Some(traces) if traces.num_samples > 1 => Ok(Some(traces.num_samples)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_clamped() {
        assert_eq!(window_start(10, 3, 5, 20), 7);
        assert_eq!(window_start(1, 3, 5, 20), 0);
        assert_eq!(window_start(19, 2, 5, 20), 15);
        assert_eq!(window_start(4, 2, 30, 20), 0);
    }

    #[test]
    fn test_window_sum_pads_pedestal() {
        let trace = [10u16, 10, 50, 30, 10, 10, 10, 10, 10, 10];
        // Pedestal of the full trace sum is 100.
        let sum = window_sum(&trace, 2, 2, 100.0, 0.0);
        assert!((sum - (80.0 + 80.0)).abs() < 1e-9);
        let corrected = window_sum(&trace, 2, 2, 100.0, 1.5);
        assert!((corrected - (60.0 * 1.5 + 100.0)).abs() < 1e-9);
        let full = window_sum(&trace, 0, 10, 100.0, 1.5);
        assert!((full - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_significant_peak() {
        let trace = [10u16, 12, 25, 40, 38, 45, 11];
        assert_eq!(significant_peak(&trace, 10.0, 10.0), Some((5, 35.0)));
        assert_eq!(significant_peak(&trace, 10.0, 50.0), None);
        // Equal later samples do not move the peak.
        let flat = [10u16, 30, 30, 30];
        assert_eq!(significant_peak(&flat, 10.0, 5.0), Some((1, 20.0)));
    }

    #[test]
    fn test_gradient_is_unimplemented() {
        let config = IntegrationConfig::default().with_scheme(IntegrationScheme::Gradient);
        let integrator = integrator_for(&config).unwrap();
        let pedestals = CalibrationConstants::uniform(1, &[0.0], &[1.0]);
        let graph = NeighborGraph::default();
        let ctx = IntegrationContext {
            pedestals: &pedestals,
            neighbors: &graph,
            correction: [0.0; 2],
        };
        let mut adc = AdcData::new(1, 1);
        assert_eq!(
            integrator.integrate(&ctx, &mut adc, &mut None),
            Err(Error::UnimplementedStrategy("gradient integration"))
        );
        assert!(integrator_for(&IntegrationConfig::default()).is_none());
    }
}
