//! Window placed by the summed signal of the neighboring pixels.

use hillas_core::{AdcData, Gain, PixelTiming, RawWaveform, ReferencePulse, Result};

use super::{
    prepare, reset_to_pedestal, window_correction, window_start, window_sum, IntegrationContext,
    PulseIntegrator,
};

/// Per-pixel window around the peak of the summed high-gain traces of the
/// first-relation neighbors, optionally mixed with `local_weight` times the
/// pixel's own trace.
///
/// Pixels without any contributing trace keep their pedestal. Both gains
/// use the same window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborPeak {
    window: usize,
    before: usize,
    local_weight: f64,
}

impl NeighborPeak {
    /// Creates the integrator.
    #[must_use]
    pub fn new(window: usize, before: usize, local_weight: f64) -> Self {
        Self {
            window,
            before,
            local_weight,
        }
    }
}

/// Accumulates the pedestal-subtracted high-gain traces of the
/// first-relation neighbors of `pixel`, plus `local_weight` times its own
/// trace, into `sum`. Returns the number of contributing traces.
pub(crate) fn neighbor_sum(
    ctx: &IntegrationContext<'_>,
    adc: &AdcData,
    traces: &RawWaveform,
    pixel: usize,
    local_weight: f64,
    sum: &mut [f64],
) -> usize {
    let ns = traces.num_samples;
    sum.fill(0.0);
    let add = |p: usize, weight: f64, sum: &mut [f64]| {
        let pedestal = ctx.pedestals.sample_pedestal(Gain::High, p, ns);
        for (acc, &s) in sum.iter_mut().zip(traces.trace(Gain::High, p)) {
            *acc += weight * (f64::from(s) - pedestal);
        }
    };
    let mut contributors = 0;
    for &nb in ctx.neighbors.neighbors(pixel) {
        if nb < adc.num_pixels && adc.usable(Gain::High, nb) {
            add(nb, 1.0, sum);
            contributors += 1;
        }
    }
    if local_weight > 0.0 && adc.usable(Gain::High, pixel) {
        add(pixel, local_weight, sum);
        contributors += 1;
    }
    contributors
}

/// Index of the first maximum.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

impl PulseIntegrator for NeighborPeak {
    fn name(&self) -> &'static str {
        if self.local_weight > 0.0 {
            "neighbor-local-peak"
        } else {
            "neighbor-peak"
        }
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
        reset_to_pedestal(adc, ctx.pedestals);
        if !adc.has_gain(Gain::High) {
            return Ok(());
        }
        let len = self.window.min(ns);
        let Some(traces) = adc.traces.as_ref() else {
            return Ok(());
        };
        let mut summed = vec![0.0; ns];
        for pixel in 0..adc.num_pixels {
            if neighbor_sum(ctx, adc, traces, pixel, self.local_weight, &mut summed) == 0 {
                continue;
            }
            let start = window_start(argmax(&summed), self.before, len, ns);
            for gain in Gain::ALL {
                if !adc.has_gain(gain) || !adc.usable(gain, pixel) {
                    continue;
                }
                adc.sums[gain.index()][pixel] = window_sum(
                    traces.trace(gain, pixel),
                    start,
                    len,
                    ctx.pedestals.pedestal(gain, pixel),
                    ctx.correction(gain),
                );
            }
        }
        Ok(())
    }
}
