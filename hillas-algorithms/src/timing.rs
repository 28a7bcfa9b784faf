//! Pixel timing summary of an image: time gradient along the major axis,
//! fit residual, mean pulse widths and rise time.
#![allow(clippy::cast_precision_loss, clippy::similar_names)]

use hillas_core::{
    CameraGeometry, CleanedImage, HillasParameters, ImageError, PixelAmplitudes, PixelTiming,
    TimeKind, TimingParameters,
};

use crate::disabled::DisabledPixels;

/// Amplitude at which the fit weight `A/(A+100)` reaches one half [p.e.].
pub const TIMING_WEIGHT_SCALE: f64 = 100.0;

/// Smallest determinant of the weighted least-squares system.
const MIN_DETERMINANT: f64 = 1e-10;

/// Where the values used here sit in a timing record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SlotLayout {
    peak: usize,
    width_absolute: Option<usize>,
    width_50: Option<usize>,
    width_20: Option<usize>,
    start_20: Option<usize>,
    start_80: Option<usize>,
}

impl SlotLayout {
    fn of(timing: &PixelTiming) -> Option<Self> {
        Some(Self {
            peak: timing.peak_slot()?,
            width_absolute: timing.find_slot(
                TimeKind::WidthAbsolute,
                f64::NEG_INFINITY,
                f64::INFINITY,
            ),
            width_50: timing.find_slot(TimeKind::WidthRelative, 0.4, 0.6),
            width_20: timing.find_slot(TimeKind::WidthRelative, 0.15, 0.25),
            start_20: timing.find_slot(TimeKind::StartRelative, 0.15, 0.25),
            start_80: timing.find_slot(TimeKind::StartRelative, 0.7, 0.9),
        })
    }
}

/// One pixel entering the fit.
struct Sample {
    weight: f64,
    along_axis: f64,
    time: f64,
    width1: f64,
    width2: f64,
    rise: f64,
}

/// Fits peak times of the image pixels against their position along the
/// major axis, weighting each pixel with `A/(A+100)`.
///
/// Times are converted to ns with the record's time slice. Pixels that are
/// disabled, have no timing values or no positive amplitude are skipped.
pub fn pixel_timing_analysis(
    camera: &CameraGeometry,
    disabled: &DisabledPixels,
    image: &CleanedImage,
    amplitudes: &PixelAmplitudes,
    params: &HillasParameters,
    timing: Option<&PixelTiming>,
) -> Result<TimingParameters, ImageError> {
    let timing = timing.ok_or(ImageError::NoTiming)?;
    let layout = SlotLayout::of(timing).ok_or(ImageError::NoTiming)?;
    let time_slice = if timing.time_slice > 0.0 {
        timing.time_slice
    } else {
        1.0
    };

    let scale = camera.angular_scale();
    let (sr, cr) = camera.rotation.sin_cos();
    let (sd, cd) = params.direction.sin_cos();
    let samples: Vec<Sample> = image
        .iter()
        .filter(|&p| !disabled.is_disabled(p))
        .filter_map(|p| {
            let values = timing.pixel(p)?;
            let a = amplitudes.get(p);
            if a <= 0.0 {
                return None;
            }
            let value = |slot: Option<usize>| slot.and_then(|k| values.get(k)).copied();
            let x = scale * (cr * camera.x[p] - sr * camera.y[p]) - params.x;
            let y = scale * (sr * camera.x[p] + cr * camera.y[p]) - params.y;
            let rise = match (value(layout.start_20), value(layout.start_80)) {
                (Some(t20), Some(t80)) => t80 - t20,
                _ => 0.0,
            };
            Some(Sample {
                weight: a / (a + TIMING_WEIGHT_SCALE),
                along_axis: cd * x + sd * y,
                time: *values.get(layout.peak)?,
                width1: value(layout.width_50)
                    .or_else(|| value(layout.width_absolute))
                    .unwrap_or(0.0),
                width2: value(layout.width_20).unwrap_or(0.0),
                rise,
            })
        })
        .collect();

    let n = samples.len();
    let (mut sw, mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let (mut swd1, mut swd2, mut srt) = (0.0, 0.0, 0.0);
    for s in &samples {
        sw += s.weight;
        sx += s.weight * s.along_axis;
        sy += s.weight * s.time;
        sxx += s.weight * s.along_axis * s.along_axis;
        sxy += s.weight * s.along_axis * s.time;
        swd1 += s.weight * s.width1;
        swd2 += s.weight * s.width2;
        srt += s.weight * s.rise;
    }
    if sw <= 0.0 || n < 2 {
        return Err(ImageError::UndeterminedSlope { used: n });
    }
    let det = sw * sxx - sx * sx;
    if det < MIN_DETERMINANT {
        return Err(ImageError::UndeterminedSlope { used: n });
    }
    let slope = (sw * sxy - sx * sy) / det;
    let offset = (sxx * sy - sx * sxy) / det;

    let (mut sdt, mut sdt2) = (0.0, 0.0);
    for s in &samples {
        let dt = s.time - offset - slope * s.along_axis;
        sdt += s.weight * dt;
        sdt2 += s.weight * dt * dt;
    }
    let variance = sdt2 / sw - (sdt / sw) * (sdt / sw);
    let residual = if variance > 0.0 {
        (variance * n as f64 / (n - 1) as f64).sqrt() * time_slice
    } else {
        0.0
    };

    Ok(TimingParameters {
        slope: slope * time_slice,
        residual,
        width1: swd1 / sw * time_slice,
        width2: swd2 / sw * time_slice,
        rise_time: srt / sw * time_slice,
    })
}
