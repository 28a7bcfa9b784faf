//! Analysis configuration.
//!
//! Every knob has a documented default; `0` usually means "off" or
//! "use the shape/telescope dependent default".
#![allow(clippy::doc_markdown)]

use std::collections::HashMap;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Two-level tail-cut cleaning parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CleaningConfig {
    /// Lower threshold [peak p.e.].
    pub low: f64,
    /// Upper threshold [peak p.e.].
    pub high: f64,
    /// Rank (1-based) of the reference pixel for truncation (0 = off).
    pub reference_rank: usize,
    /// Minimum fraction of the reference amplitude for truncation (0 = off).
    pub min_fraction: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            low: 5.0,
            high: 10.0,
            reference_rank: 0,
            min_fraction: 0.0,
        }
    }
}

impl CleaningConfig {
    /// Sets both tail-cut thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, low: f64, high: f64) -> Self {
        self.low = low;
        self.high = high;
        self
    }

    /// Enables truncation relative to the pixel of the given rank.
    #[must_use]
    pub fn with_truncation(mut self, reference_rank: usize, min_fraction: f64) -> Self {
        self.reference_rank = reference_rank;
        self.min_fraction = min_fraction;
        self
    }

    /// Checks the thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.low > self.high {
            return Err(Error::InvalidConfig(format!(
                "lower tail cut {} exceeds upper tail cut {}",
                self.low, self.high
            )));
        }
        if self.min_fraction < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "negative truncation fraction {}",
                self.min_fraction
            )));
        }
        Ok(())
    }
}

/// Neighbor search radii in units of the mean pixel size of a pair.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NeighborConfig {
    /// Radii of the first, second and third relation (0 = shape default).
    pub radii: [f64; 3],
    /// Radius of the extension relation (0 = shape default).
    pub extension_radius: f64,
}

impl NeighborConfig {
    /// Sets the relation radii.
    #[must_use]
    pub fn with_radii(mut self, radii: [f64; 3]) -> Self {
        self.radii = radii;
        self
    }

    /// Sets the extension radius.
    #[must_use]
    pub fn with_extension_radius(mut self, radius: f64) -> Self {
        self.extension_radius = radius;
        self
    }

    /// Checks that configured radii are non-negative and increasing.
    pub fn validate(&self) -> Result<()> {
        let mut last = 0.0;
        for &r in &self.radii {
            if r < 0.0 {
                return Err(Error::InvalidConfig(format!("negative neighbor radius {r}")));
            }
            if r > 0.0 {
                if r < last {
                    return Err(Error::InvalidConfig(
                        "neighbor radii must be increasing".to_string(),
                    ));
                }
                last = r;
            }
        }
        Ok(())
    }
}

/// How integrated charges are (re-)derived from sampled traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntegrationScheme {
    /// Use the sums delivered with the data.
    #[default]
    Delivered,
    /// Fixed window at a fixed offset.
    Fixed,
    /// Common window around the amplitude-weighted global peak.
    GlobalPeak,
    /// Window around each pixel's own peak.
    LocalPeak,
    /// Window around the peak of the summed neighbor traces.
    NeighborPeak,
    /// Neighbor peak on 4x upsampled, pole-zero shaped traces.
    ShapedNeighborPeak,
    /// Window placed along the image time gradient (not available).
    Gradient,
}

impl IntegrationScheme {
    /// Returns the scheme name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Fixed => "fixed",
            Self::GlobalPeak => "global-peak",
            Self::LocalPeak => "local-peak",
            Self::NeighborPeak => "neighbor-peak",
            Self::ShapedNeighborPeak => "shaped-neighbor-peak",
            Self::Gradient => "gradient",
        }
    }

    /// Returns true if the scheme re-integrates traces.
    #[must_use]
    pub fn uses_traces(self) -> bool {
        !matches!(self, Self::Delivered)
    }
}

/// Extraction applied to the shaped trace around the located peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapedExtraction {
    /// Plain sum over the window.
    #[default]
    Sum,
    /// Height of a parabola through the maximum and its two neighbors.
    ParabolicPeak,
}

/// Pulse integration parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IntegrationConfig {
    /// Integration scheme.
    pub scheme: IntegrationScheme,
    /// Number of samples to sum.
    pub window: usize,
    /// Samples skipped (fixed window) or samples before the peak (peak schemes).
    pub offset: usize,
    /// Significance threshold above the sample pedestal, per gain [ADC counts].
    pub thresholds: [f64; 2],
    /// Rescale window sums to the full reference pulse integral.
    pub rescale: bool,
    /// Weight of the pixel's own trace in the neighbor sum.
    pub local_weight: f64,
    /// Extraction on the shaped trace.
    pub extraction: ShapedExtraction,
    /// Rewrite the pixel timing record from shaped traces.
    pub record_timing: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            scheme: IntegrationScheme::Delivered,
            window: 7,
            offset: 3,
            thresholds: [8.0, 4.0],
            rescale: true,
            local_weight: 0.0,
            extraction: ShapedExtraction::Sum,
            record_timing: false,
        }
    }
}

impl IntegrationConfig {
    /// Sets the integration scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: IntegrationScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets the window length and offset.
    #[must_use]
    pub fn with_window(mut self, window: usize, offset: usize) -> Self {
        self.window = window;
        self.offset = offset;
        self
    }

    /// Sets the significance thresholds for high and low gain.
    #[must_use]
    pub fn with_thresholds(mut self, high_gain: f64, low_gain: f64) -> Self {
        self.thresholds = [high_gain, low_gain];
        self
    }

    /// Enables or disables reference-pulse rescaling.
    #[must_use]
    pub fn with_rescale(mut self, rescale: bool) -> Self {
        self.rescale = rescale;
        self
    }

    /// Sets the weight of the pixel's own trace in the neighbor sum.
    #[must_use]
    pub fn with_local_weight(mut self, weight: f64) -> Self {
        self.local_weight = weight;
        self
    }

    /// Sets the shaped-trace extraction.
    #[must_use]
    pub fn with_extraction(mut self, extraction: ShapedExtraction) -> Self {
        self.extraction = extraction;
        self
    }

    /// Enables rewriting of the pixel timing record.
    #[must_use]
    pub fn with_record_timing(mut self, record: bool) -> Self {
        self.record_timing = record;
        self
    }

    /// Checks the window parameters.
    ///
    /// The gradient scheme passes validation; it fails when it is run.
    pub fn validate(&self) -> Result<()> {
        if self.scheme.uses_traces() && self.window == 0 {
            return Err(Error::InvalidConfig(format!(
                "integration window must not be empty for scheme {}",
                self.scheme.name()
            )));
        }
        if self.local_weight < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "negative local weight {}",
                self.local_weight
            )));
        }
        Ok(())
    }
}

/// Which gain channels may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChannelSelection {
    /// High gain, falling back to low gain.
    #[default]
    Both,
    /// High gain only.
    HighGainOnly,
    /// Low gain only (high gain ignored if a low gain exists).
    LowGainOnly,
}

/// Which pulse sum is calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AmplitudeSource {
    /// Integrated ADC sums.
    #[default]
    AdcSum,
    /// Timing-record sums around the global peak.
    TimingGlobal,
    /// Timing-record sums around each pixel's own peak.
    TimingLocal,
}

/// Charge calibration parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CalibrationConfig {
    /// Conversion from mean p.e. to peak p.e. (0 = default 0.92).
    pub calib_scale: f64,
    /// Clip amplitudes above this value [mean p.e.] (0 = off).
    pub clip_amplitude: f64,
    /// Usable gain channels.
    pub channels: ChannelSelection,
    /// Pedestal-subtracted high-gain range inside which high gain is used (exclusive).
    pub high_gain_range: (f64, f64),
    /// Pulse sum source.
    pub source: AmplitudeSource,
}

/// Mean-to-peak p.e. conversion used when none is configured.
pub const DEFAULT_CALIB_SCALE: f64 = 0.92;

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            calib_scale: DEFAULT_CALIB_SCALE,
            clip_amplitude: 0.0,
            channels: ChannelSelection::Both,
            high_gain_range: (-1000.0, 10000.0),
            source: AmplitudeSource::AdcSum,
        }
    }
}

impl CalibrationConfig {
    /// Effective calibration scale.
    #[must_use]
    pub fn scale(&self) -> f64 {
        if self.calib_scale > 0.0 {
            self.calib_scale
        } else {
            DEFAULT_CALIB_SCALE
        }
    }

    /// Sets the calibration scale.
    #[must_use]
    pub fn with_calib_scale(mut self, scale: f64) -> Self {
        self.calib_scale = scale;
        self
    }

    /// Sets the clip amplitude.
    #[must_use]
    pub fn with_clip_amplitude(mut self, clip: f64) -> Self {
        self.clip_amplitude = clip;
        self
    }

    /// Restricts the gain channels.
    #[must_use]
    pub fn with_channels(mut self, channels: ChannelSelection) -> Self {
        self.channels = channels;
        self
    }

    /// Selects the pulse sum source.
    #[must_use]
    pub fn with_source(mut self, source: AmplitudeSource) -> Self {
        self.source = source;
        self
    }
}

/// Settings for one telescope type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TelescopeConfig {
    /// Image cleaning.
    pub cleaning: CleaningConfig,
    /// Minimum image amplitude for stereo reconstruction [peak p.e.] (<= 0 means 80).
    pub min_amplitude: f64,
    /// Minimum number of image pixels for stereo reconstruction.
    pub min_pixels: usize,
    /// Neighbor radii.
    pub neighbors: NeighborConfig,
    /// Pulse integration.
    pub integration: IntegrationConfig,
    /// Charge calibration.
    pub calibration: CalibrationConfig,
    /// Disable pixels beyond this field-of-view radius [deg] (0 = off).
    pub camera_clipping_deg: f64,
    /// Randomly disable this fraction of pixels (0 = off).
    pub broken_pixel_fraction: f64,
}

/// Minimum image amplitude used when none is configured.
pub const DEFAULT_MIN_AMPLITUDE: f64 = 80.0;

impl Default for TelescopeConfig {
    fn default() -> Self {
        Self {
            cleaning: CleaningConfig::default(),
            min_amplitude: DEFAULT_MIN_AMPLITUDE,
            min_pixels: 2,
            neighbors: NeighborConfig::default(),
            integration: IntegrationConfig::default(),
            calibration: CalibrationConfig::default(),
            camera_clipping_deg: 0.0,
            broken_pixel_fraction: 0.0,
        }
    }
}

impl TelescopeConfig {
    /// Effective minimum amplitude.
    #[must_use]
    pub fn min_amplitude(&self) -> f64 {
        if self.min_amplitude > 0.0 {
            self.min_amplitude
        } else {
            DEFAULT_MIN_AMPLITUDE
        }
    }

    /// Sets the cleaning parameters.
    #[must_use]
    pub fn with_cleaning(mut self, cleaning: CleaningConfig) -> Self {
        self.cleaning = cleaning;
        self
    }

    /// Sets the stereo selection cuts.
    #[must_use]
    pub fn with_selection(mut self, min_amplitude: f64, min_pixels: usize) -> Self {
        self.min_amplitude = min_amplitude;
        self.min_pixels = min_pixels;
        self
    }

    /// Sets the neighbor radii.
    #[must_use]
    pub fn with_neighbors(mut self, neighbors: NeighborConfig) -> Self {
        self.neighbors = neighbors;
        self
    }

    /// Sets the integration parameters.
    #[must_use]
    pub fn with_integration(mut self, integration: IntegrationConfig) -> Self {
        self.integration = integration;
        self
    }

    /// Sets the calibration parameters.
    #[must_use]
    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    /// Sets the camera clipping radius [deg].
    #[must_use]
    pub fn with_camera_clipping(mut self, degrees: f64) -> Self {
        self.camera_clipping_deg = degrees;
        self
    }

    /// Sets the fraction of randomly disabled pixels.
    #[must_use]
    pub fn with_broken_pixel_fraction(mut self, fraction: f64) -> Self {
        self.broken_pixel_fraction = fraction;
        self
    }

    /// Validates all sub-configurations.
    pub fn validate(&self) -> Result<()> {
        self.cleaning.validate()?;
        self.neighbors.validate()?;
        self.integration.validate()?;
        if !(0.0..=1.0).contains(&self.broken_pixel_fraction) {
            return Err(Error::InvalidConfig(format!(
                "broken pixel fraction {} outside [0, 1]",
                self.broken_pixel_fraction
            )));
        }
        Ok(())
    }
}

/// Stereo reconstruction parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReconstructionConfig {
    /// Project the core along the reference direction instead of the reconstructed one.
    pub use_reference_direction_for_core: bool,
    /// Images at or below this amplitude do not contribute intersections [peak p.e.].
    pub min_line_amplitude: f64,
    /// Reject images whose centroid lies beyond this fraction of the effective camera radius.
    pub max_cog_fraction: f64,
    /// Parameter set used for reconstruction.
    pub cut_id: u8,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            use_reference_direction_for_core: false,
            min_line_amplitude: 10.0,
            max_cog_fraction: 0.8,
            cut_id: 1,
        }
    }
}

impl ReconstructionConfig {
    /// Projects the core along the reference direction.
    #[must_use]
    pub fn with_reference_core(mut self, enabled: bool) -> Self {
        self.use_reference_direction_for_core = enabled;
        self
    }

    /// Selects the parameter set.
    #[must_use]
    pub fn with_cut_id(mut self, cut_id: u8) -> Self {
        self.cut_id = cut_id;
        self
    }
}

/// Complete analysis configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalysisConfig {
    /// Settings for telescope types without an override.
    pub telescope: TelescopeConfig,
    /// Per telescope type overrides.
    pub telescope_types: HashMap<u32, TelescopeConfig>,
    /// Stereo reconstruction.
    pub reconstruction: ReconstructionConfig,
    /// Also derive a second parameter set from timing pulse sums.
    pub timing_image: bool,
    /// Record the amplitude summed over all pixels with each parameter set.
    pub total_amplitude: bool,
    /// Seed for randomly disabled pixels and calibration errors.
    pub seed: u64,
    /// Log-normal spread applied to every calibration factor (0 = off).
    pub calibration_error: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            telescope: TelescopeConfig::default(),
            telescope_types: HashMap::new(),
            reconstruction: ReconstructionConfig::default(),
            timing_image: false,
            total_amplitude: false,
            seed: 42,
            calibration_error: 0.0,
        }
    }
}

impl AnalysisConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for a telescope type.
    #[must_use]
    pub fn for_type(&self, tel_type: u32) -> &TelescopeConfig {
        self.telescope_types.get(&tel_type).unwrap_or(&self.telescope)
    }

    /// Sets the default telescope settings.
    #[must_use]
    pub fn with_telescope(mut self, config: TelescopeConfig) -> Self {
        self.telescope = config;
        self
    }

    /// Adds an override for one telescope type.
    #[must_use]
    pub fn with_type_override(mut self, tel_type: u32, config: TelescopeConfig) -> Self {
        self.telescope_types.insert(tel_type, config);
        self
    }

    /// Sets the reconstruction settings.
    #[must_use]
    pub fn with_reconstruction(mut self, config: ReconstructionConfig) -> Self {
        self.reconstruction = config;
        self
    }

    /// Enables the timing-based second parameter set.
    #[must_use]
    pub fn with_timing_image(mut self, enabled: bool) -> Self {
        self.timing_image = enabled;
        self
    }

    /// Enables recording of the all-pixel amplitude.
    #[must_use]
    pub fn with_total_amplitude(mut self, enabled: bool) -> Self {
        self.total_amplitude = enabled;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the simulated calibration error.
    #[must_use]
    pub fn with_calibration_error(mut self, sigma: f64) -> Self {
        self.calibration_error = sigma;
        self
    }

    /// Validates every telescope configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.calibration_error) {
            return Err(Error::InvalidConfig(format!(
                "calibration error {} outside [0, 1)",
                self.calibration_error
            )));
        }
        self.telescope.validate()?;
        for config in self.telescope_types.values() {
            config.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        let tel = config.for_type(3);
        assert!((tel.cleaning.low - 5.0).abs() < f64::EPSILON);
        assert!((tel.cleaning.high - 10.0).abs() < f64::EPSILON);
        assert!((tel.min_amplitude() - 80.0).abs() < f64::EPSILON);
        assert_eq!(tel.min_pixels, 2);
        assert!((tel.calibration.scale() - 0.92).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_means_default() {
        let cal = CalibrationConfig::default().with_calib_scale(0.0);
        assert!((cal.scale() - DEFAULT_CALIB_SCALE).abs() < f64::EPSILON);
        let tel = TelescopeConfig::default().with_selection(-1.0, 3);
        assert!((tel.min_amplitude() - DEFAULT_MIN_AMPLITUDE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_type_override() {
        let small = TelescopeConfig::default()
            .with_cleaning(CleaningConfig::default().with_thresholds(4.0, 8.0));
        let config = AnalysisConfig::new().with_type_override(7, small);
        assert!((config.for_type(7).cleaning.low - 4.0).abs() < f64::EPSILON);
        assert!((config.for_type(1).cleaning.low - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_errors() {
        let bad = CleaningConfig::default().with_thresholds(12.0, 10.0);
        assert!(bad.validate().is_err());

        let empty = IntegrationConfig::default()
            .with_scheme(IntegrationScheme::Fixed)
            .with_window(0, 0);
        assert!(empty.validate().is_err());

        let gradient = IntegrationConfig::default().with_scheme(IntegrationScheme::Gradient);
        assert!(gradient.validate().is_ok());

        let radii = NeighborConfig::default().with_radii([1.8, 1.2, 0.0]);
        assert!(radii.validate().is_err());

        assert!(AnalysisConfig::default()
            .with_calibration_error(0.05)
            .validate()
            .is_ok());
        assert!(AnalysisConfig::default()
            .with_calibration_error(1.0)
            .validate()
            .is_err());
    }
}
