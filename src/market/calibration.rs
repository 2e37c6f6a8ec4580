// src/market/calibration.rs
//! Market calibration: rates from put-call parity, volatility from calls,
//! both read off at the protection barrier
//!
//! # Rates
//!
//! Put-call parity `C - P = S - K e^{-rT}` inverts in closed form:
//! ```text
//! r = ln(K / (S + P - C)) / T
//! ```
//!
//! # Barrier interpolation
//!
//! In the first observation year's column, find the smallest row `i` with
//! `K_i ≥ B` and interpolate linearly between rows `i-1` and `i`:
//! ```text
//! x(B) = [x_i (B - K_{i-1}) + x_{i-1} (K_i - B)] / (K_i - K_{i-1})
//! ```
//! The resulting drift and volatility are reused for every time step
//! ([`CurveMode::Flat`]). Time-to-maturity and discount rate come from row 0
//! of each observation year, the discount being the tabulated short rate
//! scaled by √365.

use crate::analytics::bs_analytic::OptionType;
use crate::analytics::implied_vol::{implied_volatility_surface, VolSurface};
use crate::error::{validation::*, AutocallError, AutocallResult};
use crate::market::surface::{MarketField, MarketSurface};
use crate::market::synthetic::DAYS_PER_YEAR;
use crate::math_utils::mean;
use ndarray::{Array2, ArrayView1};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Short rate implied by put-call parity
pub fn interest_rate(call: f64, put: f64, spot: f64, strike: f64, ttm: f64) -> AutocallResult<f64> {
    validate_non_degenerate("time_to_maturity", ttm)?;
    let forward_strike = spot + put - call;
    if !(forward_strike > 0.0) {
        return Err(AutocallError::Calibration {
            reason: format!(
                "put-call parity gives non-positive discounted strike {} (spot {}, put {}, call {})",
                forward_strike, spot, put, call
            ),
        });
    }
    Ok((strike / forward_strike).ln() / ttm)
}

/// [`interest_rate`] at every node of the surface
///
/// A node whose quotes violate parity holds NaN; only the nodes the curve
/// is interpolated from have to be valid.
pub fn interest_rate_surface(surface: &MarketSurface) -> Array2<f64> {
    let mut rates = Array2::<f64>::zeros(surface.dim());
    let mut invalid = 0;
    for ((row, col), rate) in rates.indexed_iter_mut() {
        let idx = [row, col];
        *rate = match interest_rate(
            surface.call_price()[idx],
            surface.put_price()[idx],
            surface.spot_price()[idx],
            surface.strike()[idx],
            surface.time_to_maturity()[idx],
        ) {
            Ok(rate) => rate,
            Err(err) => {
                debug!(row, year = surface.years()[col], %err, "no parity rate at node");
                invalid += 1;
                f64::NAN
            }
        };
    }
    if invalid > 0 {
        warn!(invalid, nodes = rates.len(), "rate surface has nodes without a parity rate");
    }
    rates
}

/// Per-step drift, volatility, discount rate and time-to-maturity
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedCurve {
    ttm: Vec<f64>,
    drift: Vec<f64>,
    volatility: Vec<f64>,
    discount: Vec<f64>,
}

impl CalibratedCurve {
    /// `ttm` must be positive and strictly increasing; all vectors share one length.
    pub fn new(
        ttm: Vec<f64>,
        drift: Vec<f64>,
        volatility: Vec<f64>,
        discount: Vec<f64>,
    ) -> AutocallResult<Self> {
        validate_steps(ttm.len())?;
        for (name, values) in [("drift", &drift), ("volatility", &volatility), ("discount", &discount)] {
            if values.len() != ttm.len() {
                return Err(AutocallError::InvalidConfiguration {
                    field: name.to_string(),
                    reason: format!("{} entries for {} time steps", values.len(), ttm.len()),
                });
            }
            for value in values.iter() {
                validate_finite(name, *value)?;
            }
        }
        for sigma in &volatility {
            validate_non_negative("volatility", *sigma)?;
        }
        let mut previous = 0.0;
        for t in &ttm {
            validate_finite("time_to_maturity", *t)?;
            if *t <= previous {
                return Err(AutocallError::InvalidParameters {
                    parameter: "time_to_maturity".to_string(),
                    value: *t,
                    constraint: format!("must be positive and exceed the previous step ({})", previous),
                });
            }
            previous = *t;
        }
        Ok(CalibratedCurve {
            ttm,
            drift,
            volatility,
            discount,
        })
    }

    /// Same drift, volatility and discount at every step
    pub fn flat(ttm: Vec<f64>, drift: f64, volatility: f64, discount: f64) -> AutocallResult<Self> {
        let n = ttm.len();
        Self::new(ttm, vec![drift; n], vec![volatility; n], vec![discount; n])
    }

    pub fn steps(&self) -> usize {
        self.ttm.len()
    }

    pub fn ttm(&self) -> &[f64] {
        &self.ttm
    }

    pub fn drift(&self) -> &[f64] {
        &self.drift
    }

    pub fn volatility(&self) -> &[f64] {
        &self.volatility
    }

    pub fn discount(&self) -> &[f64] {
        &self.discount
    }

    pub fn mean_drift(&self) -> f64 {
        mean(&self.drift).unwrap_or(0.0)
    }

    pub fn mean_volatility(&self) -> f64 {
        mean(&self.volatility).unwrap_or(0.0)
    }
}

/// How drift and volatility vary across observation dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveMode {
    /// One level interpolated in the first observation column, reused for every step
    #[default]
    Flat,
    /// Interpolated per observation column at the row bracket found in the first column
    TermStructure,
}

/// Rows bracketing the barrier and the weight on the upper row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarrierBracket {
    pub lower: usize,
    pub upper: usize,
    pub weight: f64,
}

impl BarrierBracket {
    pub fn interpolate(&self, column: ArrayView1<'_, f64>) -> f64 {
        self.weight * column[self.upper] + (1.0 - self.weight) * column[self.lower]
    }
}

/// Locate the barrier among ascending strikes
pub fn locate_barrier(strikes: ArrayView1<'_, f64>, barrier: f64) -> AutocallResult<BarrierBracket> {
    validate_positive("protection_barrier", barrier)?;
    let upper = strikes
        .iter()
        .position(|&k| k >= barrier)
        .ok_or_else(|| AutocallError::Calibration {
            reason: format!(
                "protection barrier {} exceeds the largest tabulated strike {}",
                barrier,
                strikes.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            ),
        })?;

    if upper == 0 {
        if strikes[0] == barrier {
            return Ok(BarrierBracket {
                lower: 0,
                upper: 0,
                weight: 1.0,
            });
        }
        return Err(AutocallError::Calibration {
            reason: format!(
                "protection barrier {} is below the smallest tabulated strike {}",
                barrier, strikes[0]
            ),
        });
    }

    let lower = upper - 1;
    let width = strikes[upper] - strikes[lower];
    if !(width > 0.0) {
        return Err(AutocallError::Calibration {
            reason: format!("strikes around row {} are not ascending", upper),
        });
    }
    Ok(BarrierBracket {
        lower,
        upper,
        weight: (barrier - strikes[lower]) / width,
    })
}

/// Everything produced by one calibration run
#[derive(Debug, Clone)]
pub struct Calibration {
    pub curve: CalibratedCurve,
    pub rates: Array2<f64>,
    pub volatility: VolSurface,
    pub bracket: BarrierBracket,
    pub observation_years: Vec<i32>,
}

/// Builds a [`CalibratedCurve`] from a [`MarketSurface`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketCalibrator {
    /// Quotes inverted for implied volatility
    pub option_type: OptionType,
    pub mode: CurveMode,
}

impl MarketCalibrator {
    pub fn new(option_type: OptionType, mode: CurveMode) -> Self {
        Self { option_type, mode }
    }

    /// Observation years run from `start_year + 1` to `maturity_year` inclusive.
    pub fn calibrate(
        &self,
        surface: &MarketSurface,
        protection_barrier: f64,
        start_year: i32,
        maturity_year: i32,
    ) -> AutocallResult<Calibration> {
        if maturity_year <= start_year {
            return Err(AutocallError::InvalidConfiguration {
                field: "maturity_year".to_string(),
                reason: format!("must be after start year {} (got {})", start_year, maturity_year),
            });
        }
        let observation_years: Vec<i32> = ((start_year + 1)..=maturity_year).collect();
        let columns = observation_years
            .iter()
            .map(|&year| {
                surface.column_of(year).ok_or_else(|| AutocallError::Calibration {
                    reason: format!("maturity year {} is not tabulated (have {:?})", year, surface.years()),
                })
            })
            .collect::<AutocallResult<Vec<usize>>>()?;

        let rates = interest_rate_surface(surface);
        let volatility = implied_volatility_surface(
            self.quotes(surface),
            self.option_type,
            surface.spot_price(),
            surface.strike(),
            &rates,
            surface.time_to_maturity(),
        )?;

        let bracket = locate_barrier(surface.strike().column(columns[0]), protection_barrier)?;
        let interpolated = match self.mode {
            CurveMode::Flat => &columns[..1],
            CurveMode::TermStructure => &columns[..],
        };
        for &col in interpolated {
            let rows = [bracket.lower, bracket.upper];
            for &row in &rows {
                let idx = [row, col];
                if !rates[idx].is_finite() || !volatility.sigma[idx].is_finite() {
                    return Err(AutocallError::Calibration {
                        reason: format!(
                            "no usable rate or volatility at strike {} for year {} (rate {}, volatility {})",
                            surface.strike()[idx],
                            surface.years()[col],
                            rates[idx],
                            volatility.sigma[idx]
                        ),
                    });
                }
            }
            if rows.iter().any(|&row| !volatility.converged[[row, col]]) {
                warn!(
                    year = surface.years()[col],
                    ?rows,
                    "barrier interpolation uses unconverged implied volatility"
                );
            }
        }

        let (drift, vol) = match self.mode {
            CurveMode::Flat => {
                let drift = bracket.interpolate(rates.column(columns[0]));
                let vol = bracket.interpolate(volatility.sigma.column(columns[0]));
                (vec![drift; columns.len()], vec![vol; columns.len()])
            }
            CurveMode::TermStructure => columns
                .iter()
                .map(|&col| {
                    (
                        bracket.interpolate(rates.column(col)),
                        bracket.interpolate(volatility.sigma.column(col)),
                    )
                })
                .unzip(),
        };

        let ttm = columns
            .iter()
            .map(|&col| surface.time_to_maturity()[[0, col]])
            .collect();
        let discount_scale = DAYS_PER_YEAR.sqrt();
        let discount = columns
            .iter()
            .map(|&col| surface.risk_free_rate()[[0, col]] * discount_scale)
            .collect();

        let curve = CalibratedCurve::new(ttm, drift, vol, discount)?;
        info!(
            protection_barrier,
            steps = curve.steps(),
            drift = curve.mean_drift(),
            volatility = curve.mean_volatility(),
            unconverged_nodes = volatility.non_converged(),
            "market calibrated"
        );

        Ok(Calibration {
            curve,
            rates,
            volatility,
            bracket,
            observation_years,
        })
    }

    fn quotes<'a>(&self, surface: &'a MarketSurface) -> &'a Array2<f64> {
        match self.option_type {
            OptionType::Call => surface.field(MarketField::CallPrice),
            OptionType::Put => surface.field(MarketField::PutPrice),
        }
    }
}

/// Flat curve from call quotes
pub fn build_calibrated_curve(
    surface: &MarketSurface,
    protection_barrier: f64,
    start_year: i32,
    maturity_year: i32,
) -> AutocallResult<CalibratedCurve> {
    MarketCalibrator::default()
        .calibrate(surface, protection_barrier, start_year, maturity_year)
        .map(|calibration| calibration.curve)
}
