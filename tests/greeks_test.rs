// tests/greeks_test.rs
use autocall_mc::greeks::estimator::{
    derivative, estimate_greeks, gamma_from_delta, greek_series, sweep, GreekGrids, GreekKind, GreekSet,
};
use autocall_mc::market::calibration::CalibratedCurve;
use autocall_mc::mc::instrument::InstrumentSpec;
use autocall_mc::mc::mc_engine::{Execution, McConfig};
use autocall_mc::mc::progress::ProgressObserver;
use autocall_mc::mc::NoProgress;
use autocall_mc::output::{MemorySink, ResultSink};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

fn note() -> InstrumentSpec {
    InstrumentSpec::from_percentages(1.0, 3042.0, 1.10, 0.95, 0.04, 5).unwrap()
}

fn curve() -> CalibratedCurve {
    CalibratedCurve::flat(vec![1.0, 2.0, 3.0, 4.0, 5.0], 0.02, 0.18, 0.01).unwrap()
}

fn small_run() -> McConfig {
    McConfig {
        paths: 4_000,
        seed: 314,
        use_antithetic: false,
        execution: Execution::Parallel { threads: None },
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<(String, usize, usize)>>,
}

impl ProgressObserver for RecordingObserver {
    fn on_progress(&self, stage: &str, completed: usize, total: usize) {
        if let Ok(mut events) = self.events.lock() {
            events.push((stage.to_string(), completed, total));
        }
    }
}

proptest! {
    #[test]
    fn derivative_of_linear_series_is_its_slope(
        slope in -50.0f64..50.0,
        intercept in -100.0f64..100.0,
        start in -10.0f64..10.0,
        step in 0.01f64..2.0,
        k in 2usize..40,
    ) {
        let den: Vec<f64> = (0..k).map(|i| start + i as f64 * step).collect();
        let num: Vec<f64> = den.iter().map(|x| intercept + slope * x).collect();
        let d = derivative(&num, &den).unwrap();

        prop_assert_eq!(d.len(), k - 1);
        prop_assert_eq!(d.midpoints.len(), k - 1);
        for (i, value) in d.values.iter().enumerate() {
            prop_assert!((value - slope).abs() < 1e-6 * (1.0 + slope.abs()), "point {}: {} vs {}", i, value, slope);
            prop_assert!((d.midpoints[i] - (den[i] + den[i + 1]) / 2.0).abs() < 1e-12);
        }
    }
}

#[test]
fn test_sweep_shapes_and_parameters() {
    let grid = [0.8, 0.9, 1.0, 1.1, 1.2];
    let observer = Arc::new(RecordingObserver::default());
    let swept = sweep(GreekKind::Delta, &grid, &note(), &curve(), &small_run(), observer.clone()).unwrap();

    assert_eq!(swept.estimates.len(), grid.len());
    assert_eq!(swept.parameters.len(), grid.len());
    for (p, scale) in swept.parameters.iter().zip(grid) {
        assert!((p - 3042.0 * scale).abs() < 1e-9);
    }

    let events = observer.events.lock().unwrap();
    assert_eq!(events.len(), grid.len() + 1);
    assert_eq!(events.last().unwrap(), &("delta".to_string(), 5, 5));

    let series = greek_series(&swept).unwrap();
    assert_eq!(series.primitive.len(), 5);
    assert_eq!(series.derivative.len(), 4);
}

#[test]
fn test_delta_is_positive_with_common_random_numbers() {
    // Higher spot means more kick-outs and fewer capital losses
    let grid = [0.85, 0.95, 1.05];
    let swept = sweep(GreekKind::Delta, &grid, &note(), &curve(), &small_run(), Arc::new(NoProgress)).unwrap();
    let prices = swept.prices();
    assert!(prices[0] < prices[1], "{:?}", prices);
    assert!(prices[1] < prices[2], "{:?}", prices);
}

#[test]
fn test_gamma_cannot_be_swept_directly() {
    assert!(sweep(GreekKind::Gamma, &[1.0, 1.1], &note(), &curve(), &small_run(), Arc::new(NoProgress)).is_err());
    assert!(sweep(GreekKind::Vega, &[], &note(), &curve(), &small_run(), Arc::new(NoProgress)).is_err());
}

#[test]
fn test_estimate_greeks_derives_gamma_from_delta() {
    let grids = GreekGrids {
        vega: vec![0.5, 1.0, 1.5],
        delta: vec![0.9, 0.95, 1.0, 1.05],
        rho: vec![-1.0, 0.0, 1.0],
    };
    let report = estimate_greeks(GreekSet::GAMMA, &grids, &note(), &curve(), &small_run(), Arc::new(NoProgress)).unwrap();

    assert!(report.get(GreekKind::Vega).is_none());
    assert!(report.get(GreekKind::Rho).is_none());
    let delta = report.get(GreekKind::Delta).unwrap();
    let gamma = report.get(GreekKind::Gamma).unwrap();
    assert_eq!(delta.derivative.len(), 3);
    assert_eq!(gamma.derivative.len(), 2);

    let expected = gamma_from_delta(delta).unwrap();
    assert_eq!(gamma, &expected);
    assert_eq!(gamma.parameters, delta.derivative.midpoints);

    let sink = MemorySink::new();
    for series in &report.series {
        sink.publish(series).unwrap();
    }
    assert_eq!(sink.published().len(), 2);
}

#[test]
fn test_rho_bump_scales_the_coupon() {
    let grid = [0.0, 1.0, 2.0];
    let swept = sweep(GreekKind::Rho, &grid, &note(), &curve(), &small_run(), Arc::new(NoProgress)).unwrap();
    let prices = swept.prices();
    // a larger coupon only adds to kick-out redemptions
    assert!(prices[0] < prices[1] && prices[1] < prices[2], "{:?}", prices);
    assert!((swept.parameters[1] - 0.02).abs() < 1e-12);
}

#[test]
fn test_zero_drift_skips_rho_but_keeps_other_greeks() {
    let flat_rates = CalibratedCurve::flat(vec![1.0, 2.0, 3.0, 4.0, 5.0], 0.0, 0.18, 0.01).unwrap();
    let grids = GreekGrids {
        vega: vec![0.5, 1.0],
        delta: vec![0.9, 1.0, 1.1],
        rho: vec![0.0, 1.0],
    };
    let report = estimate_greeks(
        GreekSet::all(),
        &grids,
        &note(),
        &flat_rates,
        &small_run(),
        Arc::new(NoProgress),
    )
    .unwrap();

    assert!(report.get(GreekKind::Rho).is_none());
    assert_eq!(report.get(GreekKind::Vega).unwrap().derivative.len(), 1);
    assert_eq!(report.get(GreekKind::Delta).unwrap().derivative.len(), 2);
    assert_eq!(report.get(GreekKind::Gamma).unwrap().derivative.len(), 1);
    assert!(report.base.price.is_finite());
}

#[test]
fn test_partitioned_sweep_reports_partition_progress() {
    let cfg = McConfig {
        execution: Execution::Distributed {
            partitions: 3,
            max_retries: 0,
        },
        ..small_run()
    };
    let observer = Arc::new(RecordingObserver::default());
    let grids = GreekGrids {
        vega: vec![1.0],
        delta: vec![0.95, 1.05],
        rho: vec![1.0],
    };
    let report = estimate_greeks(GreekSet::DELTA, &grids, &note(), &curve(), &cfg, observer.clone()).unwrap();
    assert!(report.get(GreekKind::Delta).is_some());

    let events = observer.events.lock().unwrap();
    let delta_events = events.iter().filter(|(stage, _, _)| stage == "delta").count();
    let partition_events = events.iter().filter(|(stage, _, _)| stage == "partitions").count();
    assert_eq!(delta_events, 3);
    // base price plus two sweep points, three partitions each
    assert_eq!(partition_events, 9);
}

#[test]
#[ignore] // Full default sweeps; slow in debug builds
fn test_all_greeks_on_default_grids() {
    let cfg = McConfig {
        paths: 50_000,
        ..small_run()
    };
    let report =
        estimate_greeks(GreekSet::all(), &GreekGrids::default(), &note(), &curve(), &cfg, Arc::new(NoProgress)).unwrap();
    assert_eq!(report.series.len(), 4);
    for series in &report.series {
        println!("{}: {:?}", series.greek, series.derivative.values);
        assert_eq!(series.derivative.len(), series.primitive.len() - 1);
    }
}
