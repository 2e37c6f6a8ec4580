// src/analytics/implied_vol.rs
//! Implied volatility by Newton-Raphson
//!
//! # Algorithm
//!
//! Starting from σ₀ = 0.5:
//! ```text
//! σ_{n+1} = σ_n + (target - V(σ_n)) / ν(σ_n)
//! ```
//! until |target - V(σ_n)| < 1e-5 or 100 iterations have been spent.
//!
//! # Non-convergence
//!
//! The solver never fails on a bad quote: it returns the last iterate with
//! `converged = false` and the final residual, and logs a warning. Callers
//! decide whether a best-effort volatility is acceptable.
//!
//! # Vega guard
//!
//! When ν(σ) drops below [`MIN_VEGA`] (deep in/out of the money) or the
//! update is not finite, iteration stops at the current σ. Iterates are
//! clamped to `[MIN_VOL, MAX_VOL]` so an overshooting step cannot leave the
//! domain of the pricing formula.

use super::bs_analytic::{bs_price, bs_vega, check_inputs, OptionType};
use crate::error::{AutocallError, AutocallResult};
use ndarray::Array2;
use tracing::{debug, warn};

pub const INITIAL_VOL: f64 = 0.5;
pub const MAX_ITERATIONS: usize = 100;
pub const PRICE_TOLERANCE: f64 = 1.0e-5;
pub const MIN_VEGA: f64 = 1.0e-12;
pub const MIN_VOL: f64 = 1.0e-6;
pub const MAX_VOL: f64 = 10.0;

/// Result of one implied volatility inversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpliedVol {
    pub sigma: f64,
    pub iterations: usize,
    /// `target - price(sigma)` at the returned sigma
    pub residual: f64,
    pub converged: bool,
}

/// Invert a Black-Scholes price for volatility
///
/// Returns `DegenerateInput` when spot, strike or time-to-maturity are not
/// strictly positive; any other failure to converge is reported through
/// [`ImpliedVol::converged`].
pub fn implied_volatility(
    target: f64,
    option_type: OptionType,
    s: f64,
    k: f64,
    r: f64,
    t: f64,
) -> AutocallResult<ImpliedVol> {
    check_inputs(s, k, r, INITIAL_VOL, t)?;
    crate::error::validation::validate_finite("target_price", target)?;

    let mut sigma = INITIAL_VOL;
    let mut residual = f64::NAN;

    for iteration in 0..MAX_ITERATIONS {
        residual = target - bs_price(option_type, s, k, r, sigma, t);
        if residual.abs() < PRICE_TOLERANCE {
            return Ok(ImpliedVol {
                sigma,
                iterations: iteration,
                residual,
                converged: true,
            });
        }

        let vega = bs_vega(s, k, r, sigma, t);
        let step = residual / vega;
        if vega < MIN_VEGA || !step.is_finite() {
            debug!(sigma, vega, "vega vanished, stopping Newton iteration");
            return Ok(unconverged(sigma, iteration, residual, target, k, t));
        }

        sigma = (sigma + step).clamp(MIN_VOL, MAX_VOL);
    }

    // the last update has not been checked yet
    let last = target - bs_price(option_type, s, k, r, sigma, t);
    if last.abs() < PRICE_TOLERANCE {
        return Ok(ImpliedVol {
            sigma,
            iterations: MAX_ITERATIONS,
            residual: last,
            converged: true,
        });
    }
    if last.is_finite() {
        residual = last;
    }
    Ok(unconverged(sigma, MAX_ITERATIONS, residual, target, k, t))
}

fn unconverged(sigma: f64, iterations: usize, residual: f64, target: f64, k: f64, t: f64) -> ImpliedVol {
    warn!(
        target_price = target,
        strike = k,
        ttm = t,
        sigma,
        residual,
        iterations,
        "implied volatility did not converge, keeping best estimate"
    );
    ImpliedVol {
        sigma,
        iterations,
        residual,
        converged: false,
    }
}

/// Implied volatility for every node of a quote grid
#[derive(Debug, Clone)]
pub struct VolSurface {
    pub sigma: Array2<f64>,
    pub converged: Array2<bool>,
}

impl VolSurface {
    pub fn non_converged(&self) -> usize {
        self.converged.iter().filter(|ok| !**ok).count()
    }
}

/// Solve [`implied_volatility`] element-wise over equally shaped grids
///
/// Nodes whose inputs cannot be inverted at all (a NaN rate, a zero
/// maturity) hold NaN and are marked unconverged; only mismatched grid
/// shapes are an error.
pub fn implied_volatility_surface(
    prices: &Array2<f64>,
    option_type: OptionType,
    spot: &Array2<f64>,
    strike: &Array2<f64>,
    rate: &Array2<f64>,
    ttm: &Array2<f64>,
) -> AutocallResult<VolSurface> {
    let shape = prices.dim();
    for (name, grid) in [("spot", spot), ("strike", strike), ("rate", rate), ("ttm", ttm)] {
        if grid.dim() != shape {
            return Err(AutocallError::InvalidMarketData {
                reason: format!(
                    "{} grid has shape {:?}, expected {:?}",
                    name,
                    grid.dim(),
                    shape
                ),
            });
        }
    }

    let mut sigma = Array2::<f64>::from_elem(shape, INITIAL_VOL);
    let mut converged = Array2::<bool>::from_elem(shape, false);
    for ((row, col), target) in prices.indexed_iter() {
        let idx = [row, col];
        match implied_volatility(*target, option_type, spot[idx], strike[idx], rate[idx], ttm[idx]) {
            Ok(solved) => {
                sigma[idx] = solved.sigma;
                converged[idx] = solved.converged;
            }
            Err(err) => {
                debug!(row, col, %err, "implied volatility undefined at node");
                sigma[idx] = f64::NAN;
            }
        }
    }

    let surface = VolSurface { sigma, converged };
    let failed = surface.non_converged();
    if failed > 0 {
        warn!(failed, nodes = prices.len(), "implied volatility surface has unconverged nodes");
    }
    Ok(surface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::bs_analytic::bs_call_price;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_recovers_volatility_from_call_prices() {
        let (s, r, t) = (100.0, 0.02, 1.0);
        for &k in &[95.0, 100.0, 105.0] {
            for &sigma in &[0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 3.0] {
                let target = bs_call_price(s, k, r, sigma, t);
                let iv = implied_volatility(target, OptionType::Call, s, k, r, t).unwrap();
                assert!(iv.converged, "k={} sigma={} -> {:?}", k, sigma, iv);
                assert_abs_diff_eq!(iv.sigma, sigma, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_recovers_volatility_from_put_prices() {
        let target = crate::analytics::bs_analytic::bs_put_price(100.0, 105.0, 0.01, 0.3, 2.0);
        let iv = implied_volatility(target, OptionType::Put, 100.0, 105.0, 0.01, 2.0).unwrap();
        assert!(iv.converged);
        assert_abs_diff_eq!(iv.sigma, 0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_unreachable_price_is_flagged_not_failed() {
        // a call can never be worth more than the spot
        let iv = implied_volatility(150.0, OptionType::Call, 100.0, 100.0, 0.01, 1.0).unwrap();
        assert!(!iv.converged);
        assert!(iv.sigma.is_finite());
        assert!(iv.residual.abs() >= PRICE_TOLERANCE);
    }

    #[test]
    fn test_zero_maturity_is_rejected() {
        let err = implied_volatility(5.0, OptionType::Call, 100.0, 100.0, 0.01, 0.0).unwrap_err();
        assert!(matches!(err, AutocallError::DegenerateInput { .. }));
    }

    #[test]
    fn test_surface_keeps_shape() {
        let spot = Array2::from_elem((2, 3), 100.0);
        let strike = Array2::from_shape_vec((2, 3), vec![90.0, 95.0, 100.0, 100.0, 105.0, 110.0]).unwrap();
        let rate = Array2::from_elem((2, 3), 0.01);
        let ttm = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]).unwrap();
        let prices = Array2::from_shape_fn((2, 3), |(i, j)| {
            bs_call_price(100.0, strike[[i, j]], 0.01, 0.25, ttm[[i, j]])
        });

        let surface =
            implied_volatility_surface(&prices, OptionType::Call, &spot, &strike, &rate, &ttm).unwrap();
        assert_eq!(surface.sigma.dim(), (2, 3));
        assert_eq!(surface.non_converged(), 0);
        for sigma in surface.sigma.iter() {
            assert_abs_diff_eq!(*sigma, 0.25, epsilon = 1e-5);
        }

        let bad_rate = Array2::from_elem((3, 2), 0.01);
        assert!(implied_volatility_surface(&prices, OptionType::Call, &spot, &strike, &bad_rate, &ttm).is_err());
    }

    #[test]
    fn test_surface_marks_undefined_nodes() {
        let spot = Array2::from_elem((1, 2), 100.0);
        let strike = Array2::from_elem((1, 2), 100.0);
        let ttm = Array2::from_elem((1, 2), 1.0);
        let rate = Array2::from_shape_vec((1, 2), vec![0.01, f64::NAN]).unwrap();
        let prices = Array2::from_elem((1, 2), bs_call_price(100.0, 100.0, 0.01, 0.2, 1.0));

        let surface =
            implied_volatility_surface(&prices, OptionType::Call, &spot, &strike, &rate, &ttm).unwrap();
        assert!(surface.converged[[0, 0]]);
        assert_abs_diff_eq!(surface.sigma[[0, 0]], 0.2, epsilon = 1e-5);
        assert!(surface.sigma[[0, 1]].is_nan());
        assert!(!surface.converged[[0, 1]]);
        assert_eq!(surface.non_converged(), 1);
    }
}
