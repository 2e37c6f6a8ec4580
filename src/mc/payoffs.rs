// src/mc/payoffs.rs
//! Autocallable Payoff
//!
//! # Path state machine
//!
//! Every path starts alive at the initial spot and walks the observation
//! dates in order. It ends in exactly one terminal state:
//!
//! - **KickedOut** at the first date `t` with `S_t ≥ B_ko`; pays
//!   `N (1 + T_t c) e^{-d_t T_t}` and stops simulating.
//! - **Matured** at the last date otherwise; pays `N e^{-d T}` above the
//!   protection barrier, or `N (S_T / S_0) e^{-d T}` at or below it.
//!
//! Evaluation is pure: same terms, curve and draws give the same outcome.

use crate::market::calibration::CalibratedCurve;
use crate::mc::bump::Bump;
use crate::mc::instrument::InstrumentSpec;
use crate::models::gbm::Gbm;

/// How a path ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// Kick-out barrier touched at observation `step` (0-based)
    KickedOut { step: usize },
    /// Reached the last observation; `protected` when above the protection barrier
    Matured { protected: bool },
}

/// Discounted payoff of one simulated path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathOutcome {
    pub payoff: f64,
    pub state: PathState,
    pub terminal_spot: f64,
}

/// The payoff engine, bound to one set of terms and one curve
#[derive(Debug, Clone, Copy)]
pub struct AutocallPayoff<'a> {
    spec: InstrumentSpec,
    curve: &'a CalibratedCurve,
    vol_scale: f64,
}

impl<'a> AutocallPayoff<'a> {
    pub fn new(spec: InstrumentSpec, curve: &'a CalibratedCurve) -> Self {
        Self {
            spec,
            curve,
            vol_scale: 1.0,
        }
    }

    /// Engine with `bump` applied to the terms and the volatility
    pub fn bumped(spec: &InstrumentSpec, curve: &'a CalibratedCurve, bump: Option<Bump>) -> Self {
        match bump {
            Some(bump) => Self {
                spec: bump.apply_to_spec(spec),
                curve,
                vol_scale: bump.volatility_scale(),
            },
            None => Self::new(*spec, curve),
        }
    }

    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }

    pub fn steps(&self) -> usize {
        self.curve.steps()
    }

    /// Simulate one path from its per-step normal draws
    ///
    /// `draws` must hold at least [`steps`](Self::steps) values; extra values
    /// are ignored.
    pub fn evaluate(&self, draws: &[f64]) -> PathOutcome {
        debug_assert!(draws.len() >= self.steps());
        let spec = &self.spec;
        let ttm = self.curve.ttm();
        let drift = self.curve.drift();
        let vol = self.curve.volatility();
        let discount = self.curve.discount();

        let mut spot = spec.initial_spot;
        let mut previous_ttm = 0.0;
        for (step, &z) in draws.iter().take(self.steps()).enumerate() {
            let t = ttm[step];
            spot = Gbm::new(drift[step], vol[step] * self.vol_scale).exact_step(spot, t - previous_ttm, z);
            previous_ttm = t;

            if spot >= spec.kick_out_barrier {
                return PathOutcome {
                    payoff: spec.nominal * (1.0 + t * spec.coupon_rate) * (-discount[step] * t).exp(),
                    state: PathState::KickedOut { step },
                    terminal_spot: spot,
                };
            }
        }

        let last = self.steps() - 1;
        let discount_factor = (-discount[last] * ttm[last]).exp();
        let protected = spot > spec.protection_barrier;
        let redemption = if protected { 1.0 } else { spot / spec.initial_spot };
        PathOutcome {
            payoff: spec.nominal * redemption * discount_factor,
            state: PathState::Matured { protected },
            terminal_spot: spot,
        }
    }
}
