use approx::assert_relative_eq;
use hillas_algorithms::integration::{FixedWindow, GlobalPeak, LocalPeak};
use hillas_algorithms::{IntegrationContext, NeighborGraph, PulseIntegrator};
use hillas_core::{AdcData, CalibrationConstants, Gain, RawWaveform};

const NUM_SAMPLES: usize = 12;
const PEDESTAL: f64 = 120.0;

fn traces() -> RawWaveform {
    let mut traces = RawWaveform::zeroed(1, 3, NUM_SAMPLES);
    traces
        .trace_mut(Gain::High, 0)
        .copy_from_slice(&[10, 10, 10, 10, 35, 80, 40, 15, 10, 10, 10, 10]);
    traces
        .trace_mut(Gain::High, 1)
        .copy_from_slice(&[10, 10, 10, 10, 10, 10, 25, 60, 30, 10, 10, 10]);
    traces
        .trace_mut(Gain::High, 2)
        .copy_from_slice(&[10, 11, 9, 10, 12, 10, 30, 10, 10, 9, 10, 10]);
    traces
}

fn plain_sums(traces: &RawWaveform) -> Vec<f64> {
    (0..3)
        .map(|p| traces.trace(Gain::High, p).iter().map(|&s| f64::from(s)).sum())
        .collect()
}

#[test]
fn test_full_trace_window_reproduces_plain_sum() {
    let pedestals = CalibrationConstants::uniform(3, &[PEDESTAL], &[1.0]);
    let graph = NeighborGraph::default();
    let ctx = IntegrationContext {
        pedestals: &pedestals,
        neighbors: &graph,
        correction: [1.7, 0.0],
    };
    let expected = plain_sums(&traces());

    let integrators: [Box<dyn PulseIntegrator>; 3] = [
        Box::new(FixedWindow::new(NUM_SAMPLES, 0)),
        Box::new(GlobalPeak::new(NUM_SAMPLES + 4, 2, [15.0, 15.0])),
        Box::new(LocalPeak::new(NUM_SAMPLES, 3, [15.0, 15.0])),
    ];
    for integrator in integrators {
        let mut adc = AdcData::new(3, 1).with_traces(traces());
        integrator.integrate(&ctx, &mut adc, &mut None).unwrap();
        for (pixel, &sum) in expected.iter().enumerate() {
            // The correction only applies to partial windows.
            assert_relative_eq!(adc.sums[0][pixel], sum, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_local_window_follows_each_pulse() {
    let pedestals = CalibrationConstants::uniform(3, &[PEDESTAL], &[1.0]);
    let graph = NeighborGraph::default();
    let ctx = IntegrationContext {
        pedestals: &pedestals,
        neighbors: &graph,
        correction: [0.0; 2],
    };
    let mut adc = AdcData::new(3, 1).with_traces(traces());
    LocalPeak::new(3, 1, [15.0, 15.0])
        .integrate(&ctx, &mut adc, &mut None)
        .unwrap();

    // Nine samples left out, each padded with the sample pedestal of 10.
    let padding = 9.0 * PEDESTAL / NUM_SAMPLES as f64;
    assert_relative_eq!(adc.sums[0][0], 35.0 + 80.0 + 40.0 + padding, epsilon = 1e-9);
    assert_relative_eq!(adc.sums[0][1], 25.0 + 60.0 + 30.0 + padding, epsilon = 1e-9);
    // Single bright sample: the window starts one sample early.
    assert_relative_eq!(adc.sums[0][2], 10.0 + 30.0 + 10.0 + padding, epsilon = 1e-9);
}

#[test]
fn test_partial_window_is_rescaled_above_pedestal() {
    let pedestals = CalibrationConstants::uniform(3, &[PEDESTAL], &[1.0]);
    let graph = NeighborGraph::default();
    let ctx = IntegrationContext {
        pedestals: &pedestals,
        neighbors: &graph,
        correction: [2.0, 0.0],
    };
    let mut adc = AdcData::new(3, 1).with_traces(traces());
    FixedWindow::new(4, 4)
        .integrate(&ctx, &mut adc, &mut None)
        .unwrap();

    // Samples 4..8 of pixel 0 carry 130 above their pedestal of 40.
    assert_relative_eq!(adc.sums[0][0], 2.0 * 130.0 + PEDESTAL, epsilon = 1e-9);
}
