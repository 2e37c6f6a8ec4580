// src/error.rs
use thiserror::Error;

/// Error types for the autocall-mc library
#[derive(Debug, Error)]
pub enum AutocallError {
    /// Invalid parameter values
    #[error("Invalid parameter '{parameter}' = {value}: {constraint}")]
    InvalidParameters {
        parameter: String,
        value: f64,
        constraint: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Market grids with inconsistent shape, labels or ordering
    #[error("Invalid market data: {reason}")]
    InvalidMarketData { reason: String },

    /// Calibration cannot produce a curve (barrier outside strikes, missing year, ...)
    #[error("Calibration failed: {reason}")]
    Calibration { reason: String },

    /// Zero or negative input that would divide by zero inside a pricing formula
    #[error("Degenerate input '{parameter}' = {value}: pricing formula undefined")]
    DegenerateInput { parameter: String, value: f64 },

    /// Monte Carlo simulation error
    #[error("Monte Carlo simulation error with {paths} paths: {reason}")]
    MonteCarlo { paths: usize, reason: String },

    /// A distributed partition never reported a partial sum
    #[error("Partition {partition} failed after {attempts} attempt(s): {reason}")]
    WorkerFailure {
        partition: usize,
        attempts: usize,
        reason: String,
    },

    /// Worker thread pool could not be created
    #[error("Thread pool error: {reason}")]
    ThreadPool { reason: String },

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for autocall-mc operations
pub type AutocallResult<T> = Result<T, AutocallError>;

/// Validation utilities
pub mod validation {
    use super::{AutocallError, AutocallResult};

    /// Validate that a parameter is positive
    pub fn validate_positive(name: &str, value: f64) -> AutocallResult<()> {
        if value.is_nan() || value <= 0.0 {
            Err(AutocallError::InvalidParameters {
                parameter: name.to_string(),
                value,
                constraint: "must be positive (> 0)".to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Validate that a parameter is non-negative
    pub fn validate_non_negative(name: &str, value: f64) -> AutocallResult<()> {
        if value.is_nan() || value < 0.0 {
            Err(AutocallError::InvalidParameters {
                parameter: name.to_string(),
                value,
                constraint: "must be non-negative (≥ 0)".to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Validate that a value is finite and not NaN
    pub fn validate_finite(name: &str, value: f64) -> AutocallResult<()> {
        if !value.is_finite() {
            Err(AutocallError::InvalidParameters {
                parameter: name.to_string(),
                value,
                constraint: "must be finite (not NaN or infinite)".to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Reject inputs that make d1/d2 divide by zero
    pub fn validate_non_degenerate(name: &str, value: f64) -> AutocallResult<()> {
        if !value.is_finite() || value <= 0.0 {
            Err(AutocallError::DegenerateInput {
                parameter: name.to_string(),
                value,
            })
        } else {
            Ok(())
        }
    }

    /// Validate paths count
    pub fn validate_paths(paths: usize) -> AutocallResult<()> {
        if paths == 0 {
            Err(AutocallError::InvalidConfiguration {
                field: "paths".to_string(),
                reason: "must be greater than 0".to_string(),
            })
        } else if paths > 1_000_000_000 {
            Err(AutocallError::InvalidConfiguration {
                field: "paths".to_string(),
                reason: "exceeds maximum allowed (1 billion)".to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Validate steps count
    pub fn validate_steps(steps: usize) -> AutocallResult<()> {
        if steps == 0 {
            Err(AutocallError::InvalidConfiguration {
                field: "steps".to_string(),
                reason: "must be greater than 0".to_string(),
            })
        } else if steps > 100_000 {
            Err(AutocallError::InvalidConfiguration {
                field: "steps".to_string(),
                reason: "exceeds maximum allowed (100,000)".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::validation::*;
    use super::*;

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("sigma", 0.2).is_ok());
        assert!(validate_positive("sigma", 0.0).is_err());
        assert!(validate_positive("sigma", -0.1).is_err());
        assert!(validate_positive("sigma", f64::NAN).is_err());
    }

    #[test]
    fn test_validate_finite() {
        assert!(validate_finite("value", 1.0).is_ok());
        assert!(validate_finite("value", f64::NAN).is_err());
        assert!(validate_finite("value", f64::INFINITY).is_err());
        assert!(validate_finite("value", f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_degenerate_input_is_its_own_variant() {
        match validate_non_degenerate("ttm", 0.0) {
            Err(AutocallError::DegenerateInput { parameter, value }) => {
                assert_eq!(parameter, "ttm");
                assert_eq!(value, 0.0);
            }
            other => panic!("expected DegenerateInput, got {:?}", other),
        }
        assert!(validate_non_degenerate("sigma", 0.3).is_ok());
    }

    #[test]
    fn test_validate_paths_and_steps() {
        assert!(validate_paths(0).is_err());
        assert!(validate_paths(10).is_ok());
        assert!(validate_steps(0).is_err());
        assert!(validate_steps(100_001).is_err());
    }

    #[test]
    fn test_error_display() {
        let error = AutocallError::InvalidParameters {
            parameter: "sigma".to_string(),
            value: -0.1,
            constraint: "must be positive".to_string(),
        };

        let display = format!("{}", error);
        assert!(display.contains("sigma"));
        assert!(display.contains("-0.1"));
        assert!(display.contains("positive"));

        let failure = AutocallError::WorkerFailure {
            partition: 3,
            attempts: 2,
            reason: "lost".to_string(),
        };
        assert!(failure.to_string().contains("Partition 3"));
    }
}
