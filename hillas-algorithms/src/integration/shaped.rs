//! Upsampled, pole-zero shaped neighbor peak integration.
//!
//! Traces are upsampled by [`UPSAMPLING`] with linear interpolation, the
//! pulse tail is cancelled by a pole-zero stage and the result is smoothed
//! by two cascaded running sums of [`UPSAMPLING`] samples. The peak is
//! located in the shaped sum of the neighbor traces; the pixel's own shaped
//! trace is then summed (or its peak height extracted) around that peak.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use hillas_core::{
    AdcData, Gain, PixelTiming, ReferencePulse, Result, ShapedExtraction, TimeKind, TimeSlot,
};
use log::trace;

use super::correction::interpolate;
use super::neighbor::{argmax, neighbor_sum};
use super::{prepare, reset_to_pedestal, IntegrationContext, PulseIntegrator};

/// Upsampling factor.
pub const UPSAMPLING: usize = 4;

/// Pole-zero compensation constant.
pub const POLE_ZERO: f64 = 0.758;

/// Upsampled samples at each trace edge excluded from the peak search.
const EDGE: usize = 2 * UPSAMPLING;

/// Sub-sample phases averaged for the reference response.
const PHASES: usize = 5;

/// Timing values written per pixel, in this order.
const TIMING_SLOTS: [(TimeKind, f64); 6] = [
    (TimeKind::PeakPosition, 0.0),
    (TimeKind::StartRelative, 0.2),
    (TimeKind::StartRelative, 0.5),
    (TimeKind::StartRelative, 0.8),
    (TimeKind::WidthRelative, 0.5),
    (TimeKind::WidthRelative, 0.2),
];

/// Shapes a pedestal-subtracted trace; the result has
/// `UPSAMPLING * samples.len()` entries.
#[must_use]
pub fn shape_trace(samples: &[f64]) -> Vec<f64> {
    let ns = samples.len();
    let n = ns * UPSAMPLING;
    let mut up = Vec::with_capacity(n);
    for (i, &s) in samples.iter().enumerate() {
        let next = samples[(i + 1).min(ns - 1)];
        for k in 0..UPSAMPLING {
            up.push(s + (next - s) * k as f64 / UPSAMPLING as f64);
        }
    }

    let mut shaped: Vec<f64> = (0..n)
        .map(|i| {
            if i >= UPSAMPLING {
                up[i] - POLE_ZERO * up[i - UPSAMPLING]
            } else {
                up[i]
            }
        })
        .collect();
    for _ in 0..2 {
        running_sum(&mut shaped);
    }
    shaped
}

fn running_sum(values: &mut [f64]) {
    let mut window = [0.0; UPSAMPLING];
    let mut acc = 0.0;
    for (i, v) in values.iter_mut().enumerate() {
        let slot = i % UPSAMPLING;
        acc += *v - window[slot];
        window[slot] = *v;
        *v = acc;
    }
}

/// Peak of a shaped trace away from the edges.
fn find_peak(shaped: &[f64]) -> usize {
    if shaped.len() > 2 * EDGE {
        EDGE + argmax(&shaped[EDGE..shaped.len() - EDGE])
    } else {
        argmax(shaped)
    }
}

/// Offset of the parabola vertex through `(i-1, i, i+1)` from `i`.
fn parabolic_offset(shaped: &[f64], i: usize) -> f64 {
    if i == 0 || i + 1 >= shaped.len() {
        return 0.0;
    }
    let (a, b, c) = (shaped[i - 1], shaped[i], shaped[i + 1]);
    let denom = a - 2.0 * b + c;
    if denom < 0.0 {
        0.5 * (a - c) / denom
    } else {
        0.0
    }
}

/// Neighbor-placed integration in the shaped domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapedNeighborPeak {
    window: usize,
    before: usize,
    local_weight: f64,
    extraction: ShapedExtraction,
    record_timing: bool,
    timing_threshold: f64,
}

impl ShapedNeighborPeak {
    /// Creates the integrator; `window` and `before` count raw samples.
    #[must_use]
    pub fn new(
        window: usize,
        before: usize,
        local_weight: f64,
        extraction: ShapedExtraction,
        record_timing: bool,
    ) -> Self {
        Self {
            window,
            before,
            local_weight,
            extraction,
            record_timing,
            timing_threshold: 0.0,
        }
    }

    /// Sets the minimum shaped peak height, in raw ADC counts per sample,
    /// for a pixel to get timing values.
    #[must_use]
    pub fn with_timing_threshold(mut self, threshold: f64) -> Self {
        self.timing_threshold = threshold;
        self
    }

    /// Extracted signal of a shaped trace around `peak`, in raw-sample units.
    #[must_use]
    pub fn extract(&self, shaped: &[f64], peak: usize) -> f64 {
        let n = shaped.len();
        let len = (self.window * UPSAMPLING).clamp(1, n.max(1));
        let start = peak
            .saturating_sub(self.before * UPSAMPLING)
            .min(n.saturating_sub(len));
        let end = (start + len).min(n);
        match self.extraction {
            ShapedExtraction::Sum => {
                shaped[start..end].iter().sum::<f64>() / UPSAMPLING as f64
            }
            ShapedExtraction::ParabolicPeak => {
                let i = start + argmax(&shaped[start..end]);
                let (a, b, c) = if i > 0 && i + 1 < n {
                    (shaped[i - 1], shaped[i], shaped[i + 1])
                } else {
                    return shaped[i];
                };
                let denom = a - 2.0 * b + c;
                if denom < 0.0 {
                    b - (c - a) * (c - a) / (8.0 * denom)
                } else {
                    b
                }
            }
        }
    }

    /// Peak position, rise points and widths of a shaped pulse near
    /// `around`, in raw samples. `None` without a positive peak or with a
    /// peak below the timing threshold.
    #[must_use]
    pub fn pulse_times(&self, shaped: &[f64], around: usize) -> Option<Vec<f64>> {
        let n = shaped.len();
        if n < 3 {
            return None;
        }
        let half = (self.window * UPSAMPLING).max(UPSAMPLING);
        let lo = around.saturating_sub(half);
        let hi = (around + half + 1).min(n);
        let i = lo + argmax(&shaped[lo..hi]);
        let height = shaped[i];
        let raw_height = height / (UPSAMPLING * UPSAMPLING) as f64;
        if height <= 0.0 || raw_height < self.timing_threshold {
            return None;
        }
        let peak = i as f64 + parabolic_offset(shaped, i);

        let rise = |level: f64| {
            let threshold = level * height;
            (1..=i)
                .rev()
                .find(|&k| shaped[k - 1] < threshold)
                .map_or(0.0, |k| {
                    let (a, b) = (shaped[k - 1], shaped[k]);
                    (k - 1) as f64 + (threshold - a) / (b - a)
                })
        };
        let fall = |level: f64| {
            let threshold = level * height;
            (i..n - 1)
                .find(|&k| shaped[k + 1] < threshold)
                .map_or((n - 1) as f64, |k| {
                    let (a, b) = (shaped[k], shaped[k + 1]);
                    k as f64 + (a - threshold) / (a - b)
                })
        };

        let scale = UPSAMPLING as f64;
        let values = TIMING_SLOTS
            .iter()
            .map(|&(kind, level)| match kind {
                TimeKind::PeakPosition => peak / scale,
                TimeKind::StartRelative => rise(level) / scale,
                _ => (fall(level) - rise(level)) / scale,
            })
            .collect();
        Some(values)
    }

    /// Extracted signal of the reference pulse averaged over sub-sample
    /// phases, together with its full integral in raw samples.
    fn reference_response(&self, pulse: &ReferencePulse, gain: Gain) -> Option<(f64, f64)> {
        let shape = pulse.shapes.get(gain.index())?;
        if pulse.time_slice <= 0.0 || pulse.step <= 0.0 || shape.is_empty() {
            return None;
        }
        let st = pulse.time_slice / pulse.step;
        let full = shape.iter().sum::<f64>() / st;
        let pad = EDGE / UPSAMPLING + self.before + 2;
        let ns = (shape.len() as f64 / st).ceil() as usize + 2 * pad + self.window;

        let mut response = 0.0;
        for phase in 0..PHASES {
            let shift = phase as f64 * 0.2 - 0.4;
            let raw: Vec<f64> = (0..ns)
                .map(|b| interpolate((b as f64 - pad as f64 + shift) * st, shape))
                .collect();
            let shaped = shape_trace(&raw);
            response += self.extract(&shaped, find_peak(&shaped));
        }
        Some((response / PHASES as f64, full))
    }

    fn timing_record(&self, num_pixels: usize, previous: Option<&PixelTiming>) -> PixelTiming {
        let slots = TIMING_SLOTS
            .iter()
            .map(|&(kind, level)| TimeSlot::new(kind, level))
            .collect();
        let time_slice = previous.map_or(1.0, |t| t.time_slice);
        let mut record = PixelTiming::new(num_pixels, slots, time_slice);
        if let Some(previous) = previous {
            record.pulse_sum_global.clone_from(&previous.pulse_sum_global);
            record.pulse_sum_local.clone_from(&previous.pulse_sum_local);
            record.global_only_selected = previous.global_only_selected;
        }
        record
    }
}

impl PulseIntegrator for ShapedNeighborPeak {
    fn name(&self) -> &'static str {
        "shaped-neighbor-peak"
    }

    fn correction(&self, pulse: &ReferencePulse, gain: Gain) -> f64 {
        match self.reference_response(pulse, gain) {
            Some((response, full)) if response > 0.0 && full > 0.0 => full / response,
            _ => 1.0,
        }
    }

    fn requires_correction(&self) -> bool {
        true
    }

    fn integrate(
        &self,
        ctx: &IntegrationContext<'_>,
        adc: &mut AdcData,
        timing: &mut Option<PixelTiming>,
    ) -> Result<()> {
        let Some(ns) = prepare(adc, ctx.pedestals)? else {
            return Ok(());
        };
        reset_to_pedestal(adc, ctx.pedestals);
        if !adc.has_gain(Gain::High) {
            return Ok(());
        }
        let mut record = self
            .record_timing
            .then(|| self.timing_record(adc.num_pixels, timing.as_ref()));
        let Some(traces) = adc.traces.as_ref() else {
            return Ok(());
        };

        let mut summed = vec![0.0; ns];
        let mut own = vec![0.0; ns];
        for pixel in 0..adc.num_pixels {
            if neighbor_sum(ctx, adc, traces, pixel, self.local_weight, &mut summed) == 0 {
                continue;
            }
            let peak = find_peak(&shape_trace(&summed));
            trace!("pixel {pixel}: shaped neighbor peak at {peak}");
            for gain in Gain::ALL {
                if !adc.has_gain(gain) || !adc.usable(gain, pixel) {
                    continue;
                }
                let sample_pedestal = ctx.pedestals.sample_pedestal(gain, pixel, ns);
                for (o, &s) in own.iter_mut().zip(traces.trace(gain, pixel)) {
                    *o = f64::from(s) - sample_pedestal;
                }
                let shaped = shape_trace(&own);
                let correction = match ctx.correction(gain) {
                    c if c > 0.0 => c,
                    _ => 1.0,
                };
                adc.sums[gain.index()][pixel] = self.extract(&shaped, peak) * correction
                    + ctx.pedestals.pedestal(gain, pixel);
                if gain == Gain::High {
                    if let Some(record) = record.as_mut() {
                        record.values[pixel] = self.pulse_times(&shaped, peak);
                    }
                }
            }
        }
        if record.is_some() {
            *timing = record;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::NeighborGraph;
    use hillas_core::{CalibrationConstants, CameraGeometry, NeighborConfig, RawWaveform};

    fn triangle_pulse() -> ReferencePulse {
        ReferencePulse {
            time_slice: 1.0,
            step: 0.25,
            shapes: vec![(0..=16).map(|i| 8.0 - (f64::from(i) - 8.0).abs()).collect()],
        }
    }

    #[test]
    fn test_flat_trace_stays_flat() {
        let shaped = shape_trace(&[0.0; 10]);
        assert_eq!(shaped.len(), 40);
        assert!(shaped.iter().all(|&v| v.abs() < 1e-12));
    }

    #[test]
    fn test_shaped_peak_follows_pulse() {
        let mut raw = [0.0; 20];
        raw[10] = 100.0;
        let shaped = shape_trace(&raw);
        let peak = find_peak(&shaped);
        assert!((40..=44).contains(&peak), "peak at {peak}");
        // The pole-zero stage leaves an undershoot after the pulse.
        assert!(shaped[48] < 0.0);
    }

    #[test]
    fn test_correction_recovers_integral() {
        let pulse = triangle_pulse();
        let integrator = ShapedNeighborPeak::new(6, 2, 1.0, ShapedExtraction::Sum, true);
        let correction = integrator.correction(&pulse, Gain::High);
        assert!(correction > 0.0);
        assert!((integrator.correction(&pulse, Gain::Low) - 1.0).abs() < f64::EPSILON);

        let mut camera = CameraGeometry::with_capacity(1, 10.0);
        camera.push(0.0, 0.0, 0.05, 0.05 * 0.05);
        let graph = NeighborGraph::build(&camera, &NeighborConfig::default()).unwrap();
        let pedestals = CalibrationConstants::uniform(1, &[200.0], &[1.0]);
        let ctx = IntegrationContext {
            pedestals: &pedestals,
            neighbors: &graph,
            correction: [correction, 0.0],
        };

        // Reference pulse scaled by 10: samples of 8 - |4t - 8| at t = 0..4.
        let ns = 20;
        let mut traces = RawWaveform::zeroed(1, 1, ns);
        let trace = traces.trace_mut(Gain::High, 0);
        trace.fill(10);
        for (t, height) in [(6, 0u16), (7, 40), (8, 80), (9, 40), (10, 0)] {
            trace[t] = 10 + height;
        }
        let mut adc = AdcData::new(1, 1).with_traces(traces);
        let mut timing = None;
        integrator.integrate(&ctx, &mut adc, &mut timing).unwrap();

        // Full integral of the scaled pulse: 10 * 64 / 4 = 160.
        let signal = adc.sums[0][0] - 200.0;
        assert!((signal - 160.0).abs() < 0.02 * 160.0, "signal {signal}");

        let timing = timing.unwrap();
        assert_eq!(timing.slots.len(), TIMING_SLOTS.len());
        let values = timing.pixel(0).unwrap();
        let peak = values[timing.peak_slot().unwrap()];
        assert!(peak > 7.0 && peak < 11.0, "peak {peak}");
        // Rise points are ordered and widths are positive.
        assert!(values[1] <= values[2] && values[2] <= values[3]);
        assert!(values[4] > 0.0 && values[5] >= values[4]);
    }

    #[test]
    fn test_timing_needs_high_gain_threshold() {
        let mut raw = [0.0; 20];
        for (t, height) in [(7, 40.0), (8, 80.0), (9, 40.0)] {
            raw[t] = height;
        }
        let shaped = shape_trace(&raw);
        let peak = find_peak(&shaped);

        // The shaped height of this pulse is about 43 counts per raw sample.
        let below = ShapedNeighborPeak::new(6, 2, 1.0, ShapedExtraction::Sum, true)
            .with_timing_threshold(20.0);
        assert!(below.pulse_times(&shaped, peak).is_some());
        let above = below.with_timing_threshold(60.0);
        assert!(above.pulse_times(&shaped, peak).is_none());

        // Noise-only pixels get no timing slot in the record.
        let mut camera = CameraGeometry::with_capacity(2, 10.0);
        camera.push(0.0, 0.0, 0.05, 0.05 * 0.05);
        camera.push(1.0, 0.0, 0.05, 0.05 * 0.05);
        let graph = NeighborGraph::build(&camera, &NeighborConfig::default()).unwrap();
        let pedestals = CalibrationConstants::uniform(2, &[200.0], &[1.0]);
        let ctx = IntegrationContext {
            pedestals: &pedestals,
            neighbors: &graph,
            correction: [1.0, 0.0],
        };
        let mut traces = RawWaveform::zeroed(1, 2, 20);
        traces.trace_mut(Gain::High, 0).fill(10);
        let noisy = traces.trace_mut(Gain::High, 1);
        noisy.fill(10);
        noisy[8] = 13;
        for (t, height) in [(7, 40u16), (8, 80), (9, 40)] {
            traces.trace_mut(Gain::High, 0)[t] = 10 + height;
        }
        let mut adc = AdcData::new(2, 1).with_traces(traces);
        let mut timing = None;
        below.integrate(&ctx, &mut adc, &mut timing).unwrap();
        let timing = timing.unwrap();
        assert!(timing.pixel(0).is_some());
        assert!(timing.pixel(1).is_none());
    }

    #[test]
    fn test_parabolic_extraction() {
        let integrator = ShapedNeighborPeak::new(2, 1, 0.0, ShapedExtraction::ParabolicPeak, false);
        let shaped = [0.0, 1.0, 4.0, 3.0, 0.0];
        let value = integrator.extract(&shaped, 2);
        // Vertex of the parabola through (1, 1), (2, 4), (3, 3).
        assert!((value - 4.125).abs() < 1e-9);
    }
}
