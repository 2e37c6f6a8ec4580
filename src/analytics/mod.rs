// src/analytics/mod.rs
pub mod bs_analytic;
pub mod implied_vol;
