//! Fixed integration window.

use hillas_core::{AdcData, Gain, PixelTiming, ReferencePulse, Result};

use super::{prepare, window_correction, window_sum, IntegrationContext, PulseIntegrator};

/// Sums `window` samples after skipping `skip`, identical for every pixel.
///
/// A window reaching past the trace end is shifted back; a window longer
/// than the trace covers the whole trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    window: usize,
    skip: usize,
}

impl FixedWindow {
    /// Creates a fixed window.
    #[must_use]
    pub fn new(window: usize, skip: usize) -> Self {
        Self { window, skip }
    }

    /// Effective `(start, len)` for traces of `num_samples`.
    #[must_use]
    pub fn bounds(&self, num_samples: usize) -> (usize, usize) {
        if self.window >= num_samples {
            (0, num_samples)
        } else if self.window + self.skip > num_samples {
            (num_samples - self.window, self.window)
        } else {
            (self.skip, self.window)
        }
    }
}

impl PulseIntegrator for FixedWindow {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn correction(&self, pulse: &ReferencePulse, gain: Gain) -> f64 {
        // The peak offset of a fixed window is unknown; assume it starts at the peak.
        window_correction(pulse, gain, self.window, 0)
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
        let (start, len) = self.bounds(ns);
        let Some(traces) = adc.traces.as_ref() else {
            return Ok(());
        };
        for gain in Gain::ALL {
            if !adc.has_gain(gain) {
                continue;
            }
            for pixel in 0..adc.num_pixels {
                let pedestal = ctx.pedestals.pedestal(gain, pixel);
                adc.sums[gain.index()][pixel] = if adc.usable(gain, pixel) {
                    window_sum(
                        traces.trace(gain, pixel),
                        start,
                        len,
                        pedestal,
                        ctx.correction(gain),
                    )
                } else {
                    pedestal
                };
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::NeighborGraph;
    use hillas_core::{CalibrationConstants, RawWaveform};

    #[test]
    fn test_bounds() {
        assert_eq!(FixedWindow::new(4, 2).bounds(10), (2, 4));
        assert_eq!(FixedWindow::new(4, 8).bounds(10), (6, 4));
        assert_eq!(FixedWindow::new(12, 3).bounds(10), (0, 10));
    }

    #[test]
    fn test_unusable_pixel_gets_pedestal() {
        let pedestals = CalibrationConstants::uniform(2, &[80.0], &[1.0]);
        let graph = NeighborGraph::default();
        let ctx = IntegrationContext {
            pedestals: &pedestals,
            neighbors: &graph,
            correction: [0.0; 2],
        };
        let mut traces = RawWaveform::zeroed(1, 2, 8);
        traces.trace_mut(Gain::High, 0).copy_from_slice(&[10, 10, 60, 40, 10, 10, 10, 10]);
        traces.trace_mut(Gain::High, 1).copy_from_slice(&[99; 8]);
        let mut adc = AdcData::new(2, 1).with_traces(traces);
        adc.significant[1] = false;

        FixedWindow::new(2, 2)
            .integrate(&ctx, &mut adc, &mut None)
            .unwrap();
        assert!((adc.sums[0][0] - (100.0 + 60.0)).abs() < 1e-9);
        assert!((adc.sums[0][1] - 80.0).abs() < f64::EPSILON);
    }
}
