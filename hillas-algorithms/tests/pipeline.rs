use std::f64::consts::FRAC_PI_2;

use approx::assert_relative_eq;
use hillas_algorithms::{process_events, RunContext};
use hillas_core::{
    AdcData, AnalysisConfig, ArrayEvent, CalibrationConfig, CalibrationConstants, CameraGeometry,
    Error, ImageError, Pointing, ReconstructionConfig, ReconstructionError, RunSetup,
    TelescopeConfig, TelescopeEvent, TelescopeSetup, Tracking,
};

const PITCH: f64 = 0.1;
const PEDESTAL: f64 = 100.0;
const ZENITH: Pointing = Pointing {
    azimuth: 0.0,
    altitude: FRAC_PI_2,
};

fn hex_camera() -> CameraGeometry {
    let rings: i32 = 4;
    let mut camera = CameraGeometry::with_capacity(61, 10.0);
    for r in -rings..=rings {
        for c in -rings..=rings {
            if (r + c).abs() <= rings {
                camera.push(
                    (f64::from(c) + 0.5 * f64::from(r)) * PITCH,
                    f64::from(r) * PITCH * 3.0_f64.sqrt() / 2.0,
                    PITCH,
                    3.0_f64.sqrt() / 2.0 * PITCH * PITCH,
                );
            }
        }
    }
    camera
}

fn run() -> RunSetup {
    let camera = hex_camera();
    let npix = camera.num_pixels();
    let telescope = |tel_id: u32, position: [f64; 3]| TelescopeSetup {
        tel_id,
        position,
        camera: camera.clone(),
        calibration: CalibrationConstants::uniform(npix, &[PEDESTAL], &[1.0]),
        ..Default::default()
    };
    RunSetup {
        run_id: 42,
        reference: ZENITH,
        telescopes: vec![
            telescope(1, [100.0, 0.0, 0.0]),
            telescope(2, [0.0, 100.0, 0.0]),
        ],
    }
}

fn config() -> AnalysisConfig {
    AnalysisConfig::default()
        .with_telescope(
            TelescopeConfig::default()
                .with_calibration(CalibrationConfig::default().with_calib_scale(1.0)),
        )
        .with_reconstruction(ReconstructionConfig::default().with_reference_core(true))
}

/// Elliptical Gaussian image centred at `(cx, cy)` [m].
fn telescope_event(tel_id: u32, cx: f64, cy: f64, sigma: (f64, f64), peak: f64) -> TelescopeEvent {
    let camera = hex_camera();
    let npix = camera.num_pixels();
    let mut adc = AdcData::new(npix, 1);
    for pixel in 0..npix {
        let u = (camera.x[pixel] - cx) / sigma.0;
        let v = (camera.y[pixel] - cy) / sigma.1;
        adc.sums[0][pixel] = PEDESTAL + peak * (-0.5 * (u * u + v * v)).exp();
    }
    TelescopeEvent {
        tel_id,
        known: true,
        adc: Some(adc),
        tracking: Tracking {
            raw: ZENITH,
            corrected: None,
        },
        ..Default::default()
    }
}

fn shower_event(event_id: u64) -> ArrayEvent {
    ArrayEvent {
        event_id,
        telescopes: vec![
            // Axis along x for the telescope on the x axis, along y for the other.
            telescope_event(1, 0.2, 0.0, (0.08, 0.04), 200.0),
            telescope_event(2, 0.0, 0.2, (0.04, 0.08), 200.0),
        ],
        ..Default::default()
    }
}

#[test]
fn test_two_telescope_event() {
    let ctx = RunContext::new(run(), config()).unwrap();
    let results = process_events(&ctx, vec![shower_event(1)]).unwrap();
    let result = &results[0];

    assert_eq!(result.images.len(), 2);
    for image in &result.images {
        assert!(image.is_known());
        let params = &image.parameters[0];
        assert!(params.amplitude > 80.0);
        assert!(params.length > params.width);
        assert_relative_eq!(params.centroid_radius(), 0.02, epsilon = 1e-3);
    }

    let shower = result.shower.as_ref().unwrap();
    assert!(result.shower_status.is_none());
    assert_eq!(shower.num_images(), 2);
    assert_eq!(shower.num_triggered, 2);
    assert_relative_eq!(shower.altitude, FRAC_PI_2, epsilon = 1e-5);
    assert!(shower.has_core());
    assert!(shower.x_core.hypot(shower.y_core) < 0.01);
}

#[test]
fn test_events_keep_their_order() {
    let ctx = RunContext::new(run(), config()).unwrap();

    let mut dark = shower_event(2);
    dark.telescopes[1] = telescope_event(2, 0.0, 0.2, (0.04, 0.08), 0.0);
    let mut revoked = shower_event(3);
    revoked.telescopes[0].known = false;

    let results = process_events(&ctx, vec![shower_event(1), dark, revoked]).unwrap();
    let ids: Vec<u64> = results.iter().map(|r| r.event_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    assert!(results[0].shower.is_some());

    assert_eq!(
        results[1].images[1].status,
        Some(ImageError::TooFewPixels { found: 0 })
    );
    assert_eq!(
        results[1].shower_status,
        Some(ReconstructionError::TooFewImages { found: 1 })
    );

    assert_eq!(results[2].images.len(), 1);
    assert_eq!(results[2].images[0].tel_id, 2);
    assert!(results[2].shower.is_none());
}

#[test]
fn test_unknown_telescope_aborts_the_run() {
    let ctx = RunContext::new(run(), config()).unwrap();
    let mut event = shower_event(1);
    event.telescopes[1].tel_id = 9;
    assert_eq!(
        process_events(&ctx, vec![event]).unwrap_err(),
        Error::InvalidTelescope(9)
    );
}
