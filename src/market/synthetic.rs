// src/market/synthetic.rs
//! Black-Scholes consistent quote grids
//!
//! Builds an [`InMemoryMarketData`] whose call and put prices are generated
//! from a known flat rate and volatility, so that calibration can be checked
//! against the inputs and demos run without a data file.

use super::surface::InMemoryMarketData;
use crate::analytics::bs_analytic::{bs_call_price, bs_put_price};
use crate::error::{validation::*, AutocallError, AutocallResult};
use ndarray::Array2;

/// Number of days the tabulated short rate is annualised over
pub const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone)]
pub struct FlatMarket {
    pub spot: f64,
    /// Risk-free rate used to generate option prices
    pub rate: f64,
    pub volatility: f64,
    /// Annual discount rate; the tabulated grid holds `discount_rate / √365`
    pub discount_rate: f64,
    /// Valuation year; a maturity year `y` has time-to-maturity `y - base_year`
    pub base_year: i32,
    pub maturity_years: Vec<i32>,
    /// Strikes shared by every maturity column, ascending
    pub strikes: Vec<f64>,
}

impl FlatMarket {
    /// Strikes spaced `step` apart as fractions of spot, from `lo` to `hi` inclusive
    pub fn strike_ladder(spot: f64, lo: f64, hi: f64, step: f64) -> AutocallResult<Vec<f64>> {
        validate_positive("strike_step", step)?;
        validate_positive("lowest_strike", lo)?;
        validate_finite("highest_strike", hi)?;
        if hi < lo {
            return Err(AutocallError::InvalidParameters {
                parameter: "highest_strike".to_string(),
                value: hi,
                constraint: format!("must not be below the lowest strike ({})", lo),
            });
        }
        let count = ((hi - lo) / step).round() as usize + 1;
        Ok((0..count).map(|i| spot * (lo + step * i as f64)).collect())
    }

    pub fn build(&self) -> AutocallResult<InMemoryMarketData> {
        validate_positive("spot", self.spot)?;
        validate_positive("volatility", self.volatility)?;
        validate_finite("rate", self.rate)?;
        validate_finite("discount_rate", self.discount_rate)?;
        if self.strikes.is_empty() || self.maturity_years.is_empty() {
            return Err(AutocallError::InvalidMarketData {
                reason: "synthetic market needs at least one strike and one maturity".to_string(),
            });
        }

        let shape = (self.strikes.len(), self.maturity_years.len());
        let strike = Array2::from_shape_fn(shape, |(i, _)| self.strikes[i]);
        let time_to_maturity =
            Array2::from_shape_fn(shape, |(_, j)| f64::from(self.maturity_years[j] - self.base_year));
        if let Some(t) = time_to_maturity.iter().find(|t| **t <= 0.0) {
            return Err(AutocallError::DegenerateInput {
                parameter: "time_to_maturity".to_string(),
                value: *t,
            });
        }

        let call_price = Array2::from_shape_fn(shape, |(i, j)| {
            bs_call_price(self.spot, strike[[i, j]], self.rate, self.volatility, time_to_maturity[[i, j]])
        });
        let put_price = Array2::from_shape_fn(shape, |(i, j)| {
            bs_put_price(self.spot, strike[[i, j]], self.rate, self.volatility, time_to_maturity[[i, j]])
        });

        Ok(InMemoryMarketData {
            maturity_years: self.maturity_years.clone(),
            strike,
            time_to_maturity,
            call_price,
            put_price,
            spot_price: Array2::from_elem(shape, self.spot),
            risk_free_rate: Array2::from_elem(shape, self.discount_rate / DAYS_PER_YEAR.sqrt()),
        })
    }
}

/// Flat market around the default note: spot 3042, strikes 70%..130% of spot
pub fn flat_market(rate: f64, volatility: f64, discount_rate: f64) -> AutocallResult<InMemoryMarketData> {
    let spot = 3042.0;
    FlatMarket {
        spot,
        rate,
        volatility,
        discount_rate,
        base_year: 2015,
        maturity_years: (2016..=2025).collect(),
        strikes: FlatMarket::strike_ladder(spot, 0.70, 1.30, 0.05)?,
    }
    .build()
}
