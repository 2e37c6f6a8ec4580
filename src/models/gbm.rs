// src/models/gbm.rs
//! Geometric Brownian motion under a piecewise-constant calibrated curve
//!
//! Between two observation dates the drift μ and volatility σ are held at
//! the calibrated values of the later date, so each step is exact:
//! ```text
//! S_t = S_prev * exp((μ_t - σ_t²/2) Δt + σ_t √Δt Z_t)
//! ```

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gbm {
    pub mu: f64,
    pub sigma: f64,
}

impl Gbm {
    pub fn new(mu: f64, sigma: f64) -> Self {
        Gbm { mu, sigma }
    }

    pub fn exact_step(&self, s_t: f64, dt: f64, normal_draw: f64) -> f64 {
        s_t * ((self.mu - 0.5 * self.sigma * self.sigma) * dt + self.sigma * dt.sqrt() * normal_draw).exp()
    }
}
