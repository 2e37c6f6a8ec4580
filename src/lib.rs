//! # autocall-mc: Monte Carlo Pricing of Autocallable Notes
//!
//! Calibrates drift and volatility from a grid of European option quotes,
//! prices a kick-out autocallable by Monte Carlo, and estimates its Greeks by
//! bump-and-reprice.
//!
//! ## Key Features
//!
//! - **Calibration**: put-call parity rates and Newton-Raphson implied
//!   volatilities, interpolated at the protection barrier
//! - **Interchangeable execution**: sequential, rayon thread pool, or
//!   partitioned workers with retries, all producing the same estimate
//! - **Reproducible draws**: one seeded stream per path, independent of topology
//! - **Greeks**: Vega, Delta, Rho sweeps and Gamma from the Delta series
//!
//! ## Quick Start
//!
//! ```rust
//! use autocall_mc::market::calibration::build_calibrated_curve;
//! use autocall_mc::market::surface::MarketSurface;
//! use autocall_mc::market::synthetic::flat_market;
//! use autocall_mc::mc::instrument::InstrumentSpec;
//! use autocall_mc::mc::mc_engine::{mc_price_autocallable, McConfig};
//!
//! let surface = MarketSurface::from_source(&flat_market(0.02, 0.18, 0.01)?)?;
//! let spec = InstrumentSpec::from_percentages(1.0, 3042.0, 1.10, 0.95, 0.04, 5)?;
//! let curve = build_calibrated_curve(&surface, spec.protection_barrier, 2015, 2020)?;
//!
//! let cfg = McConfig { paths: 10_000, ..Default::default() };
//! let estimate = mc_price_autocallable(&cfg, &spec, &curve, None)?;
//! println!("price: {:.4} ± {:.4}", estimate.price, estimate.std_error);
//! # Ok::<(), autocall_mc::AutocallError>(())
//! ```
//!
//! ## Mathematical Foundation
//!
//! Each path follows geometric Brownian motion between yearly observation
//! dates. The note redeems early with an accrued coupon the first time the
//! underlying closes at or above the kick-out barrier; otherwise it returns
//! the nominal at maturity, or the underlying's performance if it finished
//! at or below the protection barrier. The price is the mean discounted
//! redemption over all finite paths.

pub mod analytics;
pub mod config;
pub mod error;
pub mod greeks;
pub mod market;
pub mod math_utils;
pub mod mc;
pub mod models;
pub mod output;
pub mod rng;

pub use config::PricingConfig;
pub use error::{AutocallError, AutocallResult};
pub use mc::mc_engine::{mc_price_autocallable, McConfig, PriceEstimate};
