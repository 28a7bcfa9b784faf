//! hillas-core: Core types for Cherenkov telescope camera image analysis.
//!
//! This crate provides the data model shared by the analysis pipeline:
//! camera geometry, raw ADC data, calibration constants, pixel timing,
//! cleaned images with their Hillas parameters, stereo shower estimates,
//! configuration and error types.
//!

pub mod calibration;
pub mod camera;
pub mod config;
pub mod error;
pub mod image;
pub mod shower;
pub mod telescope;
pub mod timing;
pub mod waveform;

pub use calibration::{CalibrationConstants, PixelAmplitudes, PixelCalibrated};
pub use camera::{CameraGeometry, CameraRadius, PixelShape};
pub use config::{
    AmplitudeSource, AnalysisConfig, CalibrationConfig, ChannelSelection, CleaningConfig,
    IntegrationConfig, IntegrationScheme, NeighborConfig, ReconstructionConfig, ShapedExtraction,
    TelescopeConfig,
};
pub use error::{Error, ImageError, ReconstructionError, Result};
pub use image::{CleanedImage, HillasParameters, TelescopeImage, TimingParameters};
pub use shower::ArrayShowerEstimate;
pub use telescope::{
    ArrayEvent, CentralTrigger, Pointing, ReferencePulse, RunSetup, TelescopeEvent,
    TelescopeSetup, Tracking,
};
pub use timing::{PixelTiming, TimeKind, TimeSlot};
pub use waveform::{AdcData, Gain, RawWaveform};
