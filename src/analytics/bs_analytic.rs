// src/analytics/bs_analytic.rs
//! Analytical Black-Scholes formulas used to calibrate the autocallable
//!
//! # Mathematical Foundation
//!
//! Under the Black-Scholes model the underlying follows:
//! ```text
//! dS_t = r S_t dt + σ S_t dW_t
//! ```
//!
//! European calls and puts have closed-form prices involving the
//! cumulative normal distribution Φ(x). These are the only formulas the
//! calibrator needs: call/put to invert implied volatility, vega as the
//! Newton-Raphson derivative.
//!
//! All functions take `(s, k, r, sigma, t)` and are pure. Zero `sigma` or
//! zero `t` divide by zero inside d1/d2 and yield non-finite output; use
//! [`check_inputs`] before evaluating on untrusted data.

use crate::error::{validation::validate_non_degenerate, AutocallResult};
use crate::math_utils::{norm_cdf, norm_pdf};

/// Which European option a quote refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionType {
    #[default]
    Call,
    Put,
}

#[inline]
fn d1_d2(s: f64, k: f64, r: f64, sigma: f64, t: f64) -> (f64, f64) {
    let vol_sqrt_t = sigma * t.sqrt();
    let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / vol_sqrt_t;
    (d1, d1 - vol_sqrt_t)
}

/// Reject inputs for which d1/d2 are undefined
///
/// Spot, strike, volatility and time-to-maturity must all be strictly
/// positive and finite; the rate only has to be finite.
pub fn check_inputs(s: f64, k: f64, r: f64, sigma: f64, t: f64) -> AutocallResult<()> {
    validate_non_degenerate("spot", s)?;
    validate_non_degenerate("strike", k)?;
    validate_non_degenerate("volatility", sigma)?;
    validate_non_degenerate("time_to_maturity", t)?;
    crate::error::validation::validate_finite("rate", r)
}

/// Black-Scholes European call option price
///
/// # Formula
/// ```text
/// C(S,K,r,σ,T) = S*Φ(d₁) - K*e^(-rT)*Φ(d₂)
/// d₁ = [ln(S/K) + (r + σ²/2)T] / (σ√T)
/// d₂ = d₁ - σ√T
/// ```
pub fn bs_call_price(s: f64, k: f64, r: f64, sigma: f64, t: f64) -> f64 {
    let (d1, d2) = d1_d2(s, k, r, sigma, t);
    s * norm_cdf(d1) - k * (-r * t).exp() * norm_cdf(d2)
}

/// Black-Scholes European put option price
///
/// # Formula
/// ```text
/// P(S,K,r,σ,T) = K*e^(-rT)*Φ(-d₂) - S*Φ(-d₁)
/// ```
pub fn bs_put_price(s: f64, k: f64, r: f64, sigma: f64, t: f64) -> f64 {
    let (d1, d2) = d1_d2(s, k, r, sigma, t);
    k * (-r * t).exp() * norm_cdf(-d2) - s * norm_cdf(-d1)
}

/// Price of either option type
pub fn bs_price(option_type: OptionType, s: f64, k: f64, r: f64, sigma: f64, t: f64) -> f64 {
    match option_type {
        OptionType::Call => bs_call_price(s, k, r, sigma, t),
        OptionType::Put => bs_put_price(s, k, r, sigma, t),
    }
}

/// Black-Scholes Vega (∂V/∂σ), identical for calls and puts
///
/// # Formula
/// ```text
/// ν = S * φ(d₁) * √T
/// ```
pub fn bs_vega(s: f64, k: f64, r: f64, sigma: f64, t: f64) -> f64 {
    let (d1, _) = d1_d2(s, k, r, sigma, t);
    s * norm_pdf(d1) * t.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutocallError;
    use approx::assert_relative_eq;

    #[test]
    fn test_known_call_and_vega_values() {
        // S = K = 100, r = 5%, σ = 20%, T = 1
        assert_relative_eq!(
            bs_call_price(100.0, 100.0, 0.05, 0.2, 1.0),
            10.450583572185565,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            bs_vega(100.0, 100.0, 0.05, 0.2, 1.0),
            37.524034691693792,
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_put_call_parity() {
        let (s, k, r, sigma, t) = (3042.0, 2900.0, 0.013, 0.21, 2.5);
        let lhs = bs_call_price(s, k, r, sigma, t) - bs_put_price(s, k, r, sigma, t);
        let rhs = s - k * (-r * t).exp();
        assert_relative_eq!(lhs, rhs, max_relative = 1e-12);
        assert_eq!(
            bs_price(OptionType::Put, s, k, r, sigma, t),
            bs_put_price(s, k, r, sigma, t)
        );
    }

    #[test]
    fn test_zero_volatility_is_non_finite_and_rejected() {
        // at-the-money with σ = T = 0: d1 = 0/0
        assert!(bs_call_price(100.0, 100.0, 0.01, 0.0, 0.0).is_nan());
        assert!(matches!(
            check_inputs(100.0, 100.0, 0.01, 0.0, 1.0),
            Err(AutocallError::DegenerateInput { .. })
        ));
        assert!(matches!(
            check_inputs(100.0, 100.0, 0.01, 0.2, 0.0),
            Err(AutocallError::DegenerateInput { .. })
        ));
        assert!(check_inputs(100.0, 100.0, -0.01, 0.2, 1.0).is_ok());
    }
}
