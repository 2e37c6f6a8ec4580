// src/mc/mod.rs
pub mod bump;
pub mod distributed;
pub mod instrument;
pub mod mc_engine;
pub mod payoffs;
pub mod progress;

pub use progress::{NoProgress, ProgressObserver, TracingProgress};
