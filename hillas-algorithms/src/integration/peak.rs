//! Windows placed around a signal peak: common (global) or per pixel (local).
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use hillas_core::{AdcData, Gain, PixelTiming, ReferencePulse, Result};
use log::trace;

use super::{
    prepare, significant_peak, window_correction, window_start, window_sum, IntegrationContext,
    PulseIntegrator,
};

/// Common window around the amplitude-weighted mean peak position of all
/// pixels with a significant signal.
///
/// A gain channel without any significant pixel borrows the high-gain
/// peak; without any peak at all the sums stay at the pedestal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalPeak {
    window: usize,
    before: usize,
    thresholds: [f64; 2],
}

impl GlobalPeak {
    /// Creates the integrator.
    #[must_use]
    pub fn new(window: usize, before: usize, thresholds: [f64; 2]) -> Self {
        Self {
            window,
            before,
            thresholds,
        }
    }

    /// Amplitude-weighted mean peak sample of one gain channel.
    #[must_use]
    pub fn peak_position(
        &self,
        ctx: &IntegrationContext<'_>,
        adc: &AdcData,
        gain: Gain,
    ) -> Option<usize> {
        let traces = adc.traces.as_ref()?;
        let ns = traces.num_samples;
        let mut weight = 0.0;
        let mut weighted = 0.0;
        let mut found = 0usize;
        for pixel in 0..adc.num_pixels {
            if !adc.usable(gain, pixel) {
                continue;
            }
            let pedestal = ctx.pedestals.sample_pedestal(gain, pixel, ns);
            if let Some((peak, amplitude)) = significant_peak(
                traces.trace(gain, pixel),
                pedestal,
                self.thresholds[gain.index()],
            ) {
                weight += amplitude;
                weighted += amplitude * peak as f64;
                found += 1;
            }
        }
        if found == 0 {
            None
        } else if weight > 0.0 {
            Some((weighted / weight).round() as usize)
        } else {
            Some(0)
        }
    }
}

impl PulseIntegrator for GlobalPeak {
    fn name(&self) -> &'static str {
        "global-peak"
    }

    fn correction(&self, pulse: &ReferencePulse, gain: Gain) -> f64 {
        window_correction(pulse, gain, self.window, self.before)
    }

    fn integrate(
        &self,
        ctx: &IntegrationContext<'_>,
        adc: &mut AdcData,
        _timing: &mut Option<PixelTiming>,
    ) -> Result<()> {
        let Some(ns) = prepare(adc, ctx.pedestals)? else {
            return Ok(());
        };
        let len = self.window.min(ns);
        let mut peak_hg = None;
        for gain in Gain::ALL {
            if !adc.has_gain(gain) {
                continue;
            }
            let own = self.peak_position(ctx, adc, gain);
            if gain == Gain::High {
                peak_hg = own;
            }
            let peak = own.or(peak_hg);
            trace!("global peak ({gain:?}): {peak:?}");
            let start = peak.map(|p| window_start(p, self.before, len, ns));

            let Some(traces) = adc.traces.as_ref() else {
                return Ok(());
            };
            for pixel in 0..adc.num_pixels {
                let pedestal = ctx.pedestals.pedestal(gain, pixel);
                adc.sums[gain.index()][pixel] = match start {
                    Some(start) if adc.usable(gain, pixel) => window_sum(
                        traces.trace(gain, pixel),
                        start,
                        len,
                        pedestal,
                        ctx.correction(gain),
                    ),
                    _ => pedestal,
                };
            }
        }
        Ok(())
    }
}

/// Window around each pixel's own significant peak.
///
/// Low gain uses its own peak if significant, otherwise the high-gain peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPeak {
    window: usize,
    before: usize,
    thresholds: [f64; 2],
}

impl LocalPeak {
    /// Creates the integrator.
    #[must_use]
    pub fn new(window: usize, before: usize, thresholds: [f64; 2]) -> Self {
        Self {
            window,
            before,
            thresholds,
        }
    }
}

impl PulseIntegrator for LocalPeak {
    fn name(&self) -> &'static str {
        "local-peak"
    }

    fn correction(&self, pulse: &ReferencePulse, gain: Gain) -> f64 {
        window_correction(pulse, gain, self.window, self.before)
    }

    fn integrate(
        &self,
        ctx: &IntegrationContext<'_>,
        adc: &mut AdcData,
        _timing: &mut Option<PixelTiming>,
    ) -> Result<()> {
        let Some(ns) = prepare(adc, ctx.pedestals)? else {
            return Ok(());
        };
        let len = self.window.min(ns);
        let Some(traces) = adc.traces.as_ref() else {
            return Ok(());
        };
        for pixel in 0..adc.num_pixels {
            let mut peak_hg = None;
            for gain in Gain::ALL {
                if !adc.has_gain(gain) {
                    continue;
                }
                let pedestal = ctx.pedestals.pedestal(gain, pixel);
                let mut sum = pedestal;
                if adc.usable(gain, pixel) {
                    let trace = traces.trace(gain, pixel);
                    let own = significant_peak(
                        trace,
                        ctx.pedestals.sample_pedestal(gain, pixel, ns),
                        self.thresholds[gain.index()],
                    )
                    .map(|(peak, _)| peak);
                    if gain == Gain::High {
                        peak_hg = own;
                    }
                    if let Some(peak) = own.or(peak_hg) {
                        let start = window_start(peak, self.before, len, ns);
                        sum = window_sum(trace, start, len, pedestal, ctx.correction(gain));
                    }
                }
                adc.sums[gain.index()][pixel] = sum;
            }
        }
        Ok(())
    }
}
