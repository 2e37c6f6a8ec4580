// src/greeks/mod.rs
pub mod estimator;
