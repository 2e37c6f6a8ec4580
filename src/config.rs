// src/config.rs
//! Pricing run configuration, loaded from TOML
//!
//! Every field has a default, so an empty document describes the reference
//! note: spot 3042, kick-out at 110 %, protection at 95 %, 4 % coupon,
//! observed yearly from 2016 to 2020.
//!
//! ```toml
//! [instrument]
//! initial_spot = 3042.0
//! kick_out_pct = 1.10
//!
//! [simulation]
//! paths = 200000
//! execution = "distributed"
//! partitions = 16
//!
//! [greeks]
//! enabled = ["vega", "gamma"]
//! delta = { start = 0.8, stop = 1.2, step = 0.05 }
//! ```

use crate::error::{validation::*, AutocallError, AutocallResult};
use crate::greeks::estimator::{GreekGrids, GreekSet};
use crate::market::calibration::CurveMode;
use crate::market::synthetic::FlatMarket;
use crate::mc::instrument::InstrumentSpec;
use crate::mc::mc_engine::{Execution, McConfig};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub greeks: GreeksConfig,
    /// Directory for CSV output; nothing is written when unset
    #[serde(default)]
    pub output_dir: Option<String>,
}

impl PricingConfig {
    pub fn from_toml_str(text: &str) -> AutocallResult<Self> {
        let config: PricingConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> AutocallResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> AutocallResult<()> {
        self.instrument_spec()?;
        if self.instrument.maturity_year <= self.instrument.start_year {
            return Err(AutocallError::InvalidConfiguration {
                field: "maturity_year".to_string(),
                reason: format!("must be after start_year ({})", self.instrument.start_year),
            });
        }
        validate_positive("market.volatility", self.market.volatility)?;
        validate_finite("market.rate", self.market.rate)?;
        validate_finite("market.discount_rate", self.market.discount_rate)?;
        self.mc_config().validate()?;
        self.greek_set()?;
        for (name, range) in [
            ("greeks.vega", &self.greeks.vega),
            ("greeks.delta", &self.greeks.delta),
            ("greeks.rho", &self.greeks.rho),
        ] {
            range.validate(name)?;
        }
        Ok(())
    }

    /// Observation dates between start and maturity year
    pub fn steps(&self) -> usize {
        (self.instrument.maturity_year - self.instrument.start_year).max(0) as usize
    }

    pub fn instrument_spec(&self) -> AutocallResult<InstrumentSpec> {
        let i = &self.instrument;
        InstrumentSpec::from_percentages(
            i.nominal,
            i.initial_spot,
            i.kick_out_pct,
            i.protection_pct,
            i.coupon_rate,
            self.steps(),
        )
    }

    pub fn mc_config(&self) -> McConfig {
        let s = &self.simulation;
        let execution = match s.execution {
            ExecutionKind::Sequential => Execution::Sequential,
            ExecutionKind::Parallel => Execution::Parallel { threads: s.threads },
            ExecutionKind::Distributed => Execution::Distributed {
                partitions: s.partitions,
                max_retries: s.max_retries,
            },
        };
        McConfig {
            paths: s.paths,
            seed: s.seed,
            use_antithetic: s.antithetic,
            execution,
        }
    }

    /// Synthetic market with strikes from 70 % to 130 % of spot, one column per
    /// year after `start_year` up to `market.last_year`
    pub fn flat_market(&self) -> AutocallResult<FlatMarket> {
        let spot = self.instrument.initial_spot;
        Ok(FlatMarket {
            spot,
            rate: self.market.rate,
            volatility: self.market.volatility,
            discount_rate: self.market.discount_rate,
            base_year: self.instrument.start_year,
            maturity_years: (self.instrument.start_year + 1..=self.market.last_year.max(self.instrument.maturity_year))
                .collect(),
            strikes: FlatMarket::strike_ladder(spot, 0.70, 1.30, 0.05)?,
        })
    }

    pub fn greek_set(&self) -> AutocallResult<GreekSet> {
        self.greeks.enabled.iter().try_fold(GreekSet::NONE, |set, name| {
            let flag = match name.to_ascii_lowercase().as_str() {
                "vega" => GreekSet::VEGA,
                "delta" => GreekSet::DELTA,
                "rho" => GreekSet::RHO,
                "gamma" => GreekSet::GAMMA,
                other => {
                    return Err(AutocallError::InvalidConfiguration {
                        field: "greeks.enabled".to_string(),
                        reason: format!("unknown greek '{}'", other),
                    })
                }
            };
            Ok(set | flag)
        })
    }

    pub fn greek_grids(&self) -> GreekGrids {
        GreekGrids {
            vega: self.greeks.vega.grid(),
            delta: self.greeks.delta.grid(),
            rho: self.greeks.rho.grid(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct InstrumentConfig {
    #[serde(default = "default_nominal")]
    pub nominal: f64,
    #[serde(default = "default_initial_spot")]
    pub initial_spot: f64,
    #[serde(default = "default_kick_out_pct")]
    pub kick_out_pct: f64,
    #[serde(default = "default_protection_pct")]
    pub protection_pct: f64,
    #[serde(default = "default_coupon_rate")]
    pub coupon_rate: f64,
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default = "default_maturity_year")]
    pub maturity_year: i32,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            nominal: default_nominal(),
            initial_spot: default_initial_spot(),
            kick_out_pct: default_kick_out_pct(),
            protection_pct: default_protection_pct(),
            coupon_rate: default_coupon_rate(),
            start_year: default_start_year(),
            maturity_year: default_maturity_year(),
        }
    }
}

fn default_nominal() -> f64 {
    1.0
}

fn default_initial_spot() -> f64 {
    3042.0
}

fn default_kick_out_pct() -> f64 {
    1.10
}

fn default_protection_pct() -> f64 {
    0.95
}

fn default_coupon_rate() -> f64 {
    0.04
}

fn default_start_year() -> i32 {
    2015
}

fn default_maturity_year() -> i32 {
    2020
}

/// Parameters of the synthetic quote grid used in place of a data file
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MarketConfig {
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default = "default_volatility")]
    pub volatility: f64,
    #[serde(default = "default_discount_rate")]
    pub discount_rate: f64,
    /// Last tabulated maturity year
    #[serde(default = "default_last_year")]
    pub last_year: i32,
    #[serde(default)]
    pub curve_mode: CurveMode,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            volatility: default_volatility(),
            discount_rate: default_discount_rate(),
            last_year: default_last_year(),
            curve_mode: CurveMode::default(),
        }
    }
}

fn default_rate() -> f64 {
    0.02
}

fn default_volatility() -> f64 {
    0.18
}

fn default_discount_rate() -> f64 {
    0.01
}

fn default_last_year() -> i32 {
    2025
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Sequential,
    #[default]
    Parallel,
    Distributed,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default = "default_paths")]
    pub paths: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub antithetic: bool,
    #[serde(default)]
    pub execution: ExecutionKind,
    /// Parallel pool width; the global rayon pool when unset
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default = "default_partitions")]
    pub partitions: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            paths: default_paths(),
            seed: default_seed(),
            antithetic: false,
            execution: ExecutionKind::default(),
            threads: None,
            partitions: default_partitions(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_paths() -> usize {
    100_000
}

fn default_seed() -> u64 {
    12345
}

fn default_partitions() -> usize {
    num_cpus::get()
}

fn default_max_retries() -> usize {
    3
}

/// `start..stop` in increments of `step`, stop excluded
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SweepRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl SweepRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    pub fn validate(&self, name: &str) -> AutocallResult<()> {
        validate_finite(name, self.start)?;
        validate_finite(name, self.stop)?;
        validate_positive(name, self.step)?;
        if self.len() < 2 {
            return Err(AutocallError::InvalidConfiguration {
                field: name.to_string(),
                reason: "sweep needs at least 2 points".to_string(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        if !(self.step > 0.0) || self.stop <= self.start {
            return 0;
        }
        // tolerance keeps e.g. 0.9..1.1 step 0.05 at four points
        ((self.stop - self.start) / self.step - 1e-9).ceil() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Points computed as `start + i * step` to avoid accumulated error
    pub fn grid(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.start + i as f64 * self.step).collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct GreeksConfig {
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,
    #[serde(default = "default_vega_range")]
    pub vega: SweepRange,
    #[serde(default = "default_delta_range")]
    pub delta: SweepRange,
    #[serde(default = "default_rho_range")]
    pub rho: SweepRange,
}

impl Default for GreeksConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            vega: default_vega_range(),
            delta: default_delta_range(),
            rho: default_rho_range(),
        }
    }
}

fn default_enabled() -> Vec<String> {
    ["vega", "delta", "rho", "gamma"].iter().map(|s| s.to_string()).collect()
}

fn default_vega_range() -> SweepRange {
    SweepRange::new(0.0, 5.0, 0.5)
}

fn default_delta_range() -> SweepRange {
    SweepRange::new(0.5, 1.5, 0.1)
}

fn default_rho_range() -> SweepRange {
    SweepRange::new(-5.0, 5.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_document_gives_reference_note() {
        let config = PricingConfig::from_toml_str("").unwrap();
        let spec = config.instrument_spec().unwrap();
        assert_relative_eq!(spec.kick_out_barrier, 3346.2, max_relative = 1e-12);
        assert_relative_eq!(spec.protection_barrier, 2889.9, max_relative = 1e-12);
        assert_eq!(spec.steps, 5);
        assert_eq!(config.greek_set().unwrap(), GreekSet::all());
        assert!(config.simulation.partitions > 0);
    }

    #[test]
    fn test_sweep_range_excludes_stop() {
        let grids = PricingConfig::default().greek_grids();
        assert_eq!(grids.vega.len(), 10);
        assert_eq!(grids.delta.len(), 10);
        assert_eq!(grids.rho.len(), 10);
        assert_eq!(grids.rho[0], -5.0);
        assert_eq!(grids.rho[9], 4.0);
        assert_relative_eq!(grids.delta[9], 1.4, max_relative = 1e-12);
    }

    #[test]
    fn test_overrides_and_execution() {
        let config = PricingConfig::from_toml_str(
            r#"
            [instrument]
            coupon_rate = 0.05
            maturity_year = 2018

            [market]
            curve_mode = "term_structure"

            [simulation]
            paths = 5000
            execution = "distributed"
            partitions = 4
            max_retries = 1

            [greeks]
            enabled = ["gamma"]
            delta = { start = 0.9, stop = 1.1, step = 0.05 }
            "#,
        )
        .unwrap();
        assert_eq!(config.steps(), 3);
        assert_eq!(config.market.curve_mode, CurveMode::TermStructure);
        let mc = config.mc_config();
        assert_eq!(mc.paths, 5000);
        assert_eq!(
            mc.execution,
            Execution::Distributed {
                partitions: 4,
                max_retries: 1
            }
        );
        assert_eq!(config.greek_set().unwrap().resolved(), GreekSet::GAMMA | GreekSet::DELTA);
        assert_eq!(config.greek_grids().delta.len(), 4);
    }

    #[test]
    fn test_rejects_invalid_documents() {
        assert!(matches!(
            PricingConfig::from_toml_str("[simulation]\npaths = 0\n"),
            Err(AutocallError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            PricingConfig::from_toml_str("[instrument]\nmaturity_year = 2015\n"),
            Err(AutocallError::InvalidParameters { .. } | AutocallError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            PricingConfig::from_toml_str("[simulation]\nunknown = 1\n"),
            Err(AutocallError::ConfigParse(_))
        ));
        assert!(PricingConfig::from_toml_str("[greeks]\nenabled = [\"theta\"]\n").is_err());
    }
}
