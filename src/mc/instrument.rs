// src/mc/instrument.rs
use crate::error::{validation::*, AutocallError, AutocallResult};

/// Terms of an autocallable note
///
/// Barriers are absolute price levels; use [`InstrumentSpec::from_percentages`]
/// to derive them from the initial spot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentSpec {
    pub nominal: f64,
    pub initial_spot: f64,
    /// Early redemption when the underlying closes at or above this level
    pub kick_out_barrier: f64,
    /// Capital is returned in full at maturity above this level
    pub protection_barrier: f64,
    /// Annual coupon paid on kick-out, as a fraction of nominal
    pub coupon_rate: f64,
    /// Number of observation dates
    pub steps: usize,
}

impl InstrumentSpec {
    pub fn from_percentages(
        nominal: f64,
        initial_spot: f64,
        kick_out_pct: f64,
        protection_pct: f64,
        coupon_rate: f64,
        steps: usize,
    ) -> AutocallResult<Self> {
        let spec = InstrumentSpec {
            nominal,
            initial_spot,
            kick_out_barrier: initial_spot * kick_out_pct,
            protection_barrier: initial_spot * protection_pct,
            coupon_rate,
            steps,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> AutocallResult<()> {
        validate_positive("nominal", self.nominal)?;
        validate_positive("initial_spot", self.initial_spot)?;
        validate_positive("kick_out_barrier", self.kick_out_barrier)?;
        validate_positive("protection_barrier", self.protection_barrier)?;
        validate_finite("coupon_rate", self.coupon_rate)?;
        validate_steps(self.steps)?;
        if self.protection_barrier > self.kick_out_barrier {
            return Err(AutocallError::InvalidParameters {
                parameter: "protection_barrier".to_string(),
                value: self.protection_barrier,
                constraint: format!("must not exceed the kick-out barrier ({})", self.kick_out_barrier),
            });
        }
        Ok(())
    }
}
