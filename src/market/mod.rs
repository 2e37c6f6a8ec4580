// src/market/mod.rs
pub mod calibration;
pub mod surface;
pub mod synthetic;

pub use calibration::{build_calibrated_curve, CalibratedCurve, CurveMode, MarketCalibrator};
pub use surface::{InMemoryMarketData, MarketDataSource, MarketField, MarketSurface};
