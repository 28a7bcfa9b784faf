//! Raw ADC data: integrated sums and optional sampled traces.
//!
//! Sums and traces are stored per gain channel in flat columns
//! (`[gain][pixel]` for sums, `[gain][pixel * num_samples + sample]` for
//! traces). Telescopes that only deliver sums have no traces.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Gain channel of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Gain {
    /// High-gain channel (primary).
    High = 0,
    /// Low-gain channel (for bright pixels).
    Low = 1,
}

impl Gain {
    /// Both channels in processing order.
    pub const ALL: [Gain; 2] = [Gain::High, Gain::Low];

    /// Index into per-gain arrays.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Sampled traces of all pixels of one telescope.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawWaveform {
    /// Number of time slices per trace.
    pub num_samples: usize,
    /// Per gain: pixel-major samples (`pixel * num_samples + sample`).
    pub samples: Vec<Vec<u16>>,
}

impl RawWaveform {
    /// Creates zero-filled traces.
    #[must_use]
    pub fn zeroed(num_gains: usize, num_pixels: usize, num_samples: usize) -> Self {
        Self {
            num_samples,
            samples: vec![vec![0; num_pixels * num_samples]; num_gains],
        }
    }

    /// Returns the trace of one pixel.
    #[inline]
    #[must_use]
    pub fn trace(&self, gain: Gain, pixel: usize) -> &[u16] {
        let start = pixel * self.num_samples;
        &self.samples[gain.index()][start..start + self.num_samples]
    }

    /// Returns the mutable trace of one pixel.
    #[inline]
    pub fn trace_mut(&mut self, gain: Gain, pixel: usize) -> &mut [u16] {
        let start = pixel * self.num_samples;
        &mut self.samples[gain.index()][start..start + self.num_samples]
    }
}

/// Raw data of one telescope in one event.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdcData {
    /// Number of pixels.
    pub num_pixels: usize,
    /// Number of gain channels (1 or 2).
    pub num_gains: usize,
    /// Pixel was read out (zero suppression passed).
    pub significant: Vec<bool>,
    /// Per gain: channel data present for this pixel.
    pub known: Vec<Vec<bool>>,
    /// Per gain: integrated charge including pedestal [ADC counts].
    pub sums: Vec<Vec<f64>>,
    /// Sampled traces, if the telescope delivers them.
    #[cfg_attr(feature = "serde", serde(default))]
    pub traces: Option<RawWaveform>,
}

impl AdcData {
    /// Creates sum-only data with every pixel significant and known.
    #[must_use]
    pub fn new(num_pixels: usize, num_gains: usize) -> Self {
        Self {
            num_pixels,
            num_gains,
            significant: vec![true; num_pixels],
            known: vec![vec![true; num_pixels]; num_gains],
            sums: vec![vec![0.0; num_pixels]; num_gains],
            traces: None,
        }
    }

    /// Attaches sampled traces.
    #[must_use]
    pub fn with_traces(mut self, traces: RawWaveform) -> Self {
        self.traces = Some(traces);
        self
    }

    /// Returns true if this gain channel exists.
    #[inline]
    #[must_use]
    pub fn has_gain(&self, gain: Gain) -> bool {
        gain.index() < self.num_gains
    }

    /// Returns true if the pixel is read out and this channel is known.
    #[inline]
    #[must_use]
    pub fn usable(&self, gain: Gain, pixel: usize) -> bool {
        self.has_gain(gain) && self.significant[pixel] && self.known[gain.index()][pixel]
    }

    /// Number of samples per trace (0 for sum-only data).
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.traces.as_ref().map_or(0, |t| t.num_samples)
    }

    /// Checks that every column matches the declared pixel and gain counts.
    pub fn validate(&self) -> Result<()> {
        let n = self.num_pixels;
        check_len("significant flags", n, self.significant.len())?;
        check_len("gain channels (known)", self.num_gains, self.known.len())?;
        check_len("gain channels (sums)", self.num_gains, self.sums.len())?;
        for (known, sums) in self.known.iter().zip(&self.sums) {
            check_len("known flags", n, known.len())?;
            check_len("adc sums", n, sums.len())?;
        }
        if let Some(traces) = &self.traces {
            check_len("gain channels (traces)", self.num_gains, traces.samples.len())?;
            for samples in &traces.samples {
                check_len("trace samples", n * traces.num_samples, samples.len())?;
            }
        }
        Ok(())
    }
}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::BufferMismatch {
            what,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_access() {
        let mut raw = RawWaveform::zeroed(2, 3, 4);
        raw.trace_mut(Gain::Low, 1).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(raw.trace(Gain::Low, 1), &[1, 2, 3, 4]);
        assert_eq!(raw.trace(Gain::High, 1), &[0, 0, 0, 0]);
        assert_eq!(raw.trace(Gain::Low, 2), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_usable_respects_gain_count() {
        let adc = AdcData::new(2, 1);
        assert!(adc.usable(Gain::High, 0));
        assert!(!adc.usable(Gain::Low, 0));
    }

    #[test]
    fn test_validate_detects_short_trace() {
        let mut adc = AdcData::new(3, 2).with_traces(RawWaveform::zeroed(2, 3, 8));
        assert!(adc.validate().is_ok());
        if let Some(traces) = adc.traces.as_mut() {
            traces.samples[1].pop();
        }
        assert!(matches!(
            adc.validate(),
            Err(Error::BufferMismatch {
                what: "trace samples",
                ..
            })
        ));
    }
}
