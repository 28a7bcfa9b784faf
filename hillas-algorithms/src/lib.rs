//! hillas-algorithms: Image analysis stages for Cherenkov telescope cameras.
//!
//! This crate provides the processing pipeline on top of `hillas-core`:
//! - **Neighbors** - pixel neighbor relations from the camera geometry
//! - **Integration** - pulse sums from sampled traces
//! - **Calibration** - pulse sums to photo-electrons
//! - **Cleaning** - two-level tail-cut pixel selection
//! - **Hillas** - second moments and timing of an image
//! - **Reconstruction** - stereo shower direction and core position
//!
#![warn(missing_docs)]

mod calibrate;
mod cleaning;
mod disabled;
pub mod geometry;
mod hillas;
pub mod integration;
mod neighbors;
mod processing;
mod reconstruct;
pub mod spatial;
mod timing;

pub use calibrate::{
    apply_calibration_error, revoke_disabled_trigger, PixelCalibrator, SAMPLE_HIGH_GAIN_RANGE,
};
pub use cleaning::ImageCleaner;
pub use disabled::{camera_radius, DisabledPixels};
pub use hillas::{HillasAnalyzer, MAX_HOT_PIXELS, MIN_IMAGE_AMPLITUDE, MIN_IMAGE_PIXELS};
pub use integration::{integrator_for, IntegrationContext, PulseIntegrator};
pub use neighbors::{
    default_radii, resolve_shape, DirectionHistogram, NeighborGraph, NeighborList, Relation,
    SHAPE_PROBE_RADIUS,
};
pub use processing::{process_events, CameraContext, EventResult, RunContext};
pub use reconstruct::{ImageSelection, ShowerGeometryReconstructor, TelescopeLine};
pub use spatial::SpatialGrid;
pub use timing::{pixel_timing_analysis, TIMING_WEIGHT_SCALE};
