//! Window-sum correction from the reference single-p.e. pulse.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use hillas_core::{Gain, ReferencePulse};

/// Number of sub-sample phases averaged over.
const PHASES: usize = 5;

/// Linear interpolation in `shape` at fractional index `x`; 0 outside.
#[must_use]
pub fn interpolate(x: f64, shape: &[f64]) -> f64 {
    if x < 0.0 || x >= shape.len() as f64 {
        return 0.0;
    }
    let ix = x as usize;
    if ix + 1 >= shape.len() {
        return 0.0;
    }
    shape[ix] * ((ix + 1) as f64 - x) + shape[ix + 1] * (x - ix as f64)
}

/// Ratio of the full reference pulse integral to the integral within a
/// window of `window` samples starting `offset` samples before the peak.
///
/// The window sum is averaged over five phases between -0.4 and +0.4
/// samples. Returns 1 when the pulse for this gain is unknown or degenerate.
#[must_use]
pub fn window_correction(pulse: &ReferencePulse, gain: Gain, window: usize, offset: usize) -> f64 {
    let Some(shape) = pulse.shapes.get(gain.index()) else {
        return 1.0;
    };
    if pulse.time_slice <= 0.0 || pulse.step <= 0.0 || shape.is_empty() {
        return 1.0;
    }
    let st = pulse.time_slice / pulse.step;

    let mut peak = 0usize;
    let mut peak_value = 0.0;
    for (i, &v) in shape.iter().enumerate() {
        if v > peak_value {
            peak_value = v;
            peak = i;
        }
    }
    let full = shape.iter().sum::<f64>() / st;

    let mut sum = 0.0;
    for phase in 0..PHASES {
        let t0 = ((phase as f64 * 0.2 - 0.4) - offset as f64) * st + peak as f64;
        for bin in 0..window {
            sum += interpolate(bin as f64 * st + t0, shape);
        }
    }
    sum /= PHASES as f64;

    if sum > 0.0 && full > 0.0 {
        full / sum
    } else {
        1.0
    }
}
