// src/greeks/estimator.rs
//! Greeks by Bump-and-Reprice
//!
//! # Sweeps
//!
//! A sweep re-prices the note once per scale `p` of a grid, with one input
//! multiplied by `p`, and records the price against the bumped parameter
//! value:
//!
//! ```text
//! Vega   bump Volatility × p     parameter = mean(σ) · p
//! Delta  bump Spot × p           parameter = S_0 · p
//! Rho    bump Coupon × p         parameter = mean(μ) · p
//! ```
//!
//! Every point reuses the configuration's seed, so neighbouring prices are
//! computed on common random numbers and their differences are not swamped
//! by sampling noise.
//!
//! # Derivatives
//!
//! Forward differences evaluated at the midpoints of consecutive parameters:
//!
//! ```text
//! D_i = (V_{i+1} - V_i) / (x_{i+1} - x_i)     at  (x_i + x_{i+1}) / 2
//! ```
//!
//! so a sweep of `k` points yields `k - 1` derivative values.
//!
//! Gamma is the derivative of the Delta series taken against the Delta
//! midpoints. This is kept as the note's historical definition and is not the
//! textbook second derivative `∂²V/∂S²` evaluated on the sweep grid.

use crate::error::{AutocallError, AutocallResult};
use crate::market::calibration::CalibratedCurve;
use crate::mc::bump::{Bump, BumpKind};
use crate::mc::instrument::InstrumentSpec;
use crate::mc::mc_engine::{mc_price_with_strategy, ExecutionStrategy, McConfig, PriceEstimate};
use crate::mc::progress::ProgressObserver;
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

bitflags! {
    /// Which Greeks [`estimate_greeks`] computes
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GreekSet: u32 {
        const NONE  = 0;
        const VEGA  = 1 << 0;
        const DELTA = 1 << 1;
        const RHO   = 1 << 2;
        /// Needs the Delta sweep
        const GAMMA = 1 << 3;
    }
}

impl GreekSet {
    /// The set with every dependency included
    pub fn resolved(self) -> Self {
        if self.contains(GreekSet::GAMMA) {
            self | GreekSet::DELTA
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GreekKind {
    Vega,
    Delta,
    Rho,
    Gamma,
}

impl GreekKind {
    pub fn name(&self) -> &'static str {
        match self {
            GreekKind::Vega => "vega",
            GreekKind::Delta => "delta",
            GreekKind::Rho => "rho",
            GreekKind::Gamma => "gamma",
        }
    }

    /// Bump driving a direct sweep; Gamma has none
    pub fn bump_kind(&self) -> Option<BumpKind> {
        match self {
            GreekKind::Vega => Some(BumpKind::Volatility),
            GreekKind::Delta => Some(BumpKind::Spot),
            GreekKind::Rho => Some(BumpKind::Coupon),
            GreekKind::Gamma => None,
        }
    }

    /// Parameter value a sweep point at `scale` stands for
    pub fn parameter(&self, scale: f64, spec: &InstrumentSpec, curve: &CalibratedCurve) -> f64 {
        match self {
            GreekKind::Vega => curve.mean_volatility() * scale,
            GreekKind::Delta => spec.initial_spot * scale,
            GreekKind::Rho => curve.mean_drift() * scale,
            GreekKind::Gamma => f64::NAN,
        }
    }
}

impl fmt::Display for GreekKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Prices of one sweep against their parameter values
#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    pub greek: GreekKind,
    pub scales: Vec<f64>,
    pub parameters: Vec<f64>,
    pub estimates: Vec<PriceEstimate>,
}

impl Sweep {
    pub fn prices(&self) -> Vec<f64> {
        self.estimates.iter().map(|e| e.price).collect()
    }
}

/// Forward differences placed at midpoints
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeSeries {
    pub midpoints: Vec<f64>,
    pub values: Vec<f64>,
}

impl DerivativeSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A primitive series and its derivative, as published to a sink
#[derive(Debug, Clone, PartialEq)]
pub struct GreekSeries {
    pub greek: GreekKind,
    /// x values of the primitive
    pub parameters: Vec<f64>,
    /// Prices for Vega/Delta/Rho; Delta values for Gamma
    pub primitive: Vec<f64>,
    pub derivative: DerivativeSeries,
}

/// Re-price the note at each scale of `grid` with the Greek's bump
///
/// `observer` receives one event per sweep point and, for partitioned
/// execution, one per finished partition.
///
/// # Errors
///
/// Gamma cannot be swept directly (see [`gamma_from_delta`]); an empty grid
/// or any pricing failure is returned as is.
pub fn sweep(
    greek: GreekKind,
    grid: &[f64],
    spec: &InstrumentSpec,
    curve: &CalibratedCurve,
    cfg: &McConfig,
    observer: Arc<dyn ProgressObserver>,
) -> AutocallResult<Sweep> {
    let strategy = cfg.observed_strategy(observer.clone())?;
    sweep_with(greek, grid, spec, curve, cfg, &strategy, &*observer)
}

fn sweep_with(
    greek: GreekKind,
    grid: &[f64],
    spec: &InstrumentSpec,
    curve: &CalibratedCurve,
    cfg: &McConfig,
    strategy: &dyn ExecutionStrategy,
    observer: &dyn ProgressObserver,
) -> AutocallResult<Sweep> {
    let bump_kind = greek.bump_kind().ok_or_else(|| AutocallError::InvalidParameters {
        parameter: "greek".to_string(),
        value: f64::NAN,
        constraint: "gamma is derived from the delta series, not swept".to_string(),
    })?;
    if grid.is_empty() {
        return Err(AutocallError::InvalidConfiguration {
            field: format!("{}_grid", greek.name()),
            reason: "must hold at least one scale".to_string(),
        });
    }

    let total = grid.len();
    let mut parameters = Vec::with_capacity(total);
    let mut estimates = Vec::with_capacity(total);
    for (i, &scale) in grid.iter().enumerate() {
        observer.on_progress(greek.name(), i, total);
        let bump = Bump::new(bump_kind, scale);
        estimates.push(mc_price_with_strategy(cfg, strategy, spec, curve, Some(bump))?);
        parameters.push(greek.parameter(scale, spec, curve));
    }
    observer.on_progress(greek.name(), total, total);

    Ok(Sweep {
        greek,
        scales: grid.to_vec(),
        parameters,
        estimates,
    })
}

/// Forward-difference derivative of `num` against `den`
///
/// # Errors
///
/// Mismatched lengths, fewer than two points, or two consecutive equal
/// denominators.
pub fn derivative(num: &[f64], den: &[f64]) -> AutocallResult<DerivativeSeries> {
    if num.len() != den.len() {
        return Err(AutocallError::InvalidParameters {
            parameter: "denominators".to_string(),
            value: den.len() as f64,
            constraint: format!("must have the same length as the numerators ({})", num.len()),
        });
    }
    if num.len() < 2 {
        return Err(AutocallError::InvalidParameters {
            parameter: "points".to_string(),
            value: num.len() as f64,
            constraint: "need at least 2 points".to_string(),
        });
    }

    let mut midpoints = Vec::with_capacity(num.len() - 1);
    let mut values = Vec::with_capacity(num.len() - 1);
    for i in 0..num.len() - 1 {
        let dx = den[i + 1] - den[i];
        if dx == 0.0 {
            return Err(AutocallError::InvalidParameters {
                parameter: format!("denominator[{}]", i + 1),
                value: den[i + 1],
                constraint: "consecutive denominators must differ".to_string(),
            });
        }
        values.push((num[i + 1] - num[i]) / dx);
        midpoints.push((den[i] + den[i + 1]) / 2.0);
    }
    Ok(DerivativeSeries { midpoints, values })
}

/// Differentiate a sweep's prices against its parameters
pub fn greek_series(sweep: &Sweep) -> AutocallResult<GreekSeries> {
    let primitive = sweep.prices();
    let derivative = derivative(&primitive, &sweep.parameters)?;
    Ok(GreekSeries {
        greek: sweep.greek,
        parameters: sweep.parameters.clone(),
        primitive,
        derivative,
    })
}

/// Gamma as the derivative of the Delta series over the Delta midpoints
pub fn gamma_from_delta(delta: &GreekSeries) -> AutocallResult<GreekSeries> {
    if delta.greek != GreekKind::Delta {
        return Err(AutocallError::InvalidParameters {
            parameter: "greek".to_string(),
            value: f64::NAN,
            constraint: format!("gamma needs a delta series, got {}", delta.greek),
        });
    }
    let derivative = derivative(&delta.derivative.values, &delta.derivative.midpoints)?;
    Ok(GreekSeries {
        greek: GreekKind::Gamma,
        parameters: delta.derivative.midpoints.clone(),
        primitive: delta.derivative.values.clone(),
        derivative,
    })
}

/// Scale grids used by [`estimate_greeks`]
#[derive(Debug, Clone, PartialEq)]
pub struct GreekGrids {
    pub vega: Vec<f64>,
    pub delta: Vec<f64>,
    pub rho: Vec<f64>,
}

impl GreekGrids {
    pub fn for_kind(&self, greek: GreekKind) -> &[f64] {
        match greek {
            GreekKind::Vega => &self.vega,
            GreekKind::Delta | GreekKind::Gamma => &self.delta,
            GreekKind::Rho => &self.rho,
        }
    }
}

impl Default for GreekGrids {
    fn default() -> Self {
        Self {
            vega: (0..10).map(|i| i as f64 * 0.5).collect(),
            delta: (0..10).map(|i| 0.5 + i as f64 * 0.1).collect(),
            rho: (-5..5).map(f64::from).collect(),
        }
    }
}

/// Unbumped price plus every requested Greek
#[derive(Debug, Clone)]
pub struct GreekReport {
    pub base: PriceEstimate,
    pub series: Vec<GreekSeries>,
    pub generated_at: DateTime<Utc>,
}

impl GreekReport {
    pub fn get(&self, greek: GreekKind) -> Option<&GreekSeries> {
        self.series.iter().find(|s| s.greek == greek)
    }
}

/// Price the note and sweep the Greeks selected in `set`
///
/// A Greek whose series cannot be differentiated (e.g. a Rho sweep on a
/// zero-drift curve, where every parameter is 0) is left out of the report
/// with a warning; the other Greeks are still returned. Pricing failures
/// abort the whole run.
pub fn estimate_greeks(
    set: GreekSet,
    grids: &GreekGrids,
    spec: &InstrumentSpec,
    curve: &CalibratedCurve,
    cfg: &McConfig,
    observer: Arc<dyn ProgressObserver>,
) -> AutocallResult<GreekReport> {
    let set = set.resolved();
    let strategy = cfg.observed_strategy(observer.clone())?;
    let base = mc_price_with_strategy(cfg, &strategy, spec, curve, None)?;
    info!(price = base.price, std_error = base.std_error, "base price");

    let mut series = Vec::new();
    for (flag, greek) in [
        (GreekSet::VEGA, GreekKind::Vega),
        (GreekSet::DELTA, GreekKind::Delta),
        (GreekSet::RHO, GreekKind::Rho),
    ] {
        if !set.contains(flag) {
            continue;
        }
        let swept = sweep_with(
            greek,
            grids.for_kind(greek),
            spec,
            curve,
            cfg,
            &strategy,
            &*observer,
        )?;
        match greek_series(&swept) {
            Ok(computed) => {
                info!(greek = greek.name(), points = computed.parameters.len(), "sweep complete");
                series.push(computed);
            }
            Err(err) => warn!(greek = greek.name(), %err, "greek skipped, sweep cannot be differentiated"),
        }
    }

    if set.contains(GreekSet::GAMMA) {
        let gamma = series.iter().find(|s| s.greek == GreekKind::Delta).map(gamma_from_delta);
        match gamma {
            Some(Ok(gamma)) => series.push(gamma),
            Some(Err(err)) => warn!(%err, "gamma skipped, delta series cannot be differentiated"),
            None => warn!("gamma skipped, no delta series"),
        }
    }

    Ok(GreekReport {
        base,
        series,
        generated_at: Utc::now(),
    })
}
