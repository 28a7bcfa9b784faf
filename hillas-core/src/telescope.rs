//! Per-run telescope setup and per-event telescope data.

use crate::calibration::{CalibrationConstants, PixelCalibrated};
use crate::camera::CameraGeometry;
use crate::timing::PixelTiming;
use crate::waveform::AdcData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pointing direction [rad]. Azimuth counts N→E→S→W.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pointing {
    /// Azimuth angle.
    pub azimuth: f64,
    /// Altitude angle.
    pub altitude: f64,
}

impl Pointing {
    /// Creates a pointing direction.
    #[must_use]
    pub fn new(azimuth: f64, altitude: f64) -> Self {
        Self { azimuth, altitude }
    }
}

/// Reference single-p.e. pulse shape, per gain.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReferencePulse {
    /// Width of one readout time slice [ns].
    pub time_slice: f64,
    /// Step between reference shape samples [ns].
    pub step: f64,
    /// Per gain: the shape sampled at `step`.
    pub shapes: Vec<Vec<f64>>,
}

/// Everything about one telescope that is fixed for a run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelescopeSetup {
    /// Telescope id.
    pub tel_id: u32,
    /// Telescope type, used to look up type-specific configuration.
    #[cfg_attr(feature = "serde", serde(default))]
    pub tel_type: u32,
    /// Telescope position in the array [m] (x north, y west, z up).
    pub position: [f64; 3],
    /// Camera geometry.
    pub camera: CameraGeometry,
    /// Pedestals and gain factors.
    pub calibration: CalibrationConstants,
    /// Reference pulse, if known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub reference_pulse: Option<ReferencePulse>,
    /// Pixels with high voltage switched off.
    #[cfg_attr(feature = "serde", serde(default))]
    pub hv_disabled: Vec<usize>,
    /// Minimum number of triggered pixels for a telescope trigger.
    #[cfg_attr(feature = "serde", serde(default))]
    pub min_pixel_multiplicity: usize,
}

/// Tracking data of one telescope in one event.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tracking {
    /// Raw pointing from the drive system.
    pub raw: Pointing,
    /// Pointing corrected with a pointing model, if available.
    #[cfg_attr(feature = "serde", serde(default))]
    pub corrected: Option<Pointing>,
}

impl Tracking {
    /// Best available pointing.
    #[must_use]
    pub fn pointing(&self) -> Pointing {
        self.corrected.unwrap_or(self.raw)
    }
}

/// Data of one telescope in one event, as delivered by the decoder.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelescopeEvent {
    /// Telescope id.
    pub tel_id: u32,
    /// Telescope data is valid (cleared when the trigger is revoked).
    pub known: bool,
    /// Raw data.
    #[cfg_attr(feature = "serde", serde(default))]
    pub adc: Option<AdcData>,
    /// Pre-calibrated data, used when raw data is absent.
    #[cfg_attr(feature = "serde", serde(default))]
    pub calibrated: Option<PixelCalibrated>,
    /// Pixel timing, if available.
    #[cfg_attr(feature = "serde", serde(default))]
    pub timing: Option<PixelTiming>,
    /// Pixels that contributed to the telescope trigger.
    #[cfg_attr(feature = "serde", serde(default))]
    pub trigger_pixels: Vec<usize>,
    /// Pointing.
    pub tracking: Tracking,
}

/// Array-level trigger bookkeeping of one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CentralTrigger {
    /// Ids of triggered telescopes.
    pub triggered: Vec<u32>,
    /// Ids of telescopes with data.
    pub with_data: Vec<u32>,
    /// Bit pattern of triggered telescopes (first 32 indices only).
    pub triggered_pattern: u32,
    /// Bit pattern of telescopes with data (first 32 indices only).
    pub data_pattern: u32,
}

impl CentralTrigger {
    /// Removes a telescope from all participant lists.
    pub fn remove(&mut self, tel_id: u32, tel_index: usize) {
        self.triggered.retain(|&id| id != tel_id);
        self.with_data.retain(|&id| id != tel_id);
        if tel_index < 32 {
            let mask = !(1u32 << tel_index);
            self.triggered_pattern &= mask;
            self.data_pattern &= mask;
        }
    }
}

/// One array event.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArrayEvent {
    /// Event number.
    pub event_id: u64,
    /// Central trigger lists.
    #[cfg_attr(feature = "serde", serde(default))]
    pub central: CentralTrigger,
    /// Per-telescope data, in any order.
    pub telescopes: Vec<TelescopeEvent>,
}

/// Static description of a run: reference direction and telescopes.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunSetup {
    /// Run number.
    pub run_id: u32,
    /// Direction the array is pointed at; centre of the common frame.
    pub reference: Pointing,
    /// Telescopes taking part in the run.
    pub telescopes: Vec<TelescopeSetup>,
}

impl RunSetup {
    /// Index of a telescope by id.
    #[must_use]
    pub fn index_of(&self, tel_id: u32) -> Option<usize> {
        self.telescopes.iter().position(|t| t.tel_id == tel_id)
    }
}
