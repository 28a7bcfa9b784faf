//! Per-pixel pulse timing records.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Semantic type of a timing value slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeKind {
    /// Position of the pulse peak.
    PeakPosition,
    /// Width of the pulse above an absolute threshold.
    WidthAbsolute,
    /// Width of the pulse at a fraction of its peak.
    WidthRelative,
    /// Start of the pulse at a fraction of its peak (rise point).
    StartRelative,
}

/// Declares what one timing value slot contains.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeSlot {
    /// Kind of value.
    pub kind: TimeKind,
    /// Fraction of the peak for relative kinds (ignored otherwise).
    pub level: f64,
}

impl TimeSlot {
    /// Creates a slot declaration.
    #[must_use]
    pub fn new(kind: TimeKind, level: f64) -> Self {
        Self { kind, level }
    }
}

/// Timing values of all pixels of one telescope, in units of time slices.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelTiming {
    /// Slot declarations, shared by all pixels.
    pub slots: Vec<TimeSlot>,
    /// Per pixel: one value per slot, or `None` without a significant peak.
    pub values: Vec<Option<Vec<f64>>>,
    /// Width of one time slice [ns].
    pub time_slice: f64,
    /// Per gain: pulse sums around the global peak [ADC counts, pedestal subtracted].
    #[cfg_attr(feature = "serde", serde(default))]
    pub pulse_sum_global: Option<Vec<Vec<f64>>>,
    /// Per gain: pulse sums around the local peak [ADC counts, pedestal subtracted].
    #[cfg_attr(feature = "serde", serde(default))]
    pub pulse_sum_local: Option<Vec<Vec<f64>>>,
    /// Global sums exist only for pixels with a significant peak.
    #[cfg_attr(feature = "serde", serde(default))]
    pub global_only_selected: bool,
}

impl PixelTiming {
    /// Creates an empty record for `num_pixels` pixels with the given slots.
    #[must_use]
    pub fn new(num_pixels: usize, slots: Vec<TimeSlot>, time_slice: f64) -> Self {
        Self {
            slots,
            values: vec![None; num_pixels],
            time_slice,
            pulse_sum_global: None,
            pulse_sum_local: None,
            global_only_selected: true,
        }
    }

    /// Index of the first slot of the given kind whose level lies in `(lo, hi)`.
    ///
    /// For absolute kinds pass an open range such as `(f64::NEG_INFINITY, f64::INFINITY)`.
    #[must_use]
    pub fn find_slot(&self, kind: TimeKind, lo: f64, hi: f64) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.kind == kind && s.level > lo && s.level < hi)
    }

    /// Index of the peak position slot.
    #[must_use]
    pub fn peak_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.kind == TimeKind::PeakPosition)
    }

    /// Timing values of one pixel, if it has a significant peak.
    #[must_use]
    pub fn pixel(&self, pixel: usize) -> Option<&[f64]> {
        self.values.get(pixel).and_then(|v| v.as_deref())
    }
}
