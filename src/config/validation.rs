//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (bucket counts, rates, multipliers)
//! - Detect duplicate breaker names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::{BackoffConfig, BreakerConfig, Config, TripperConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("breaker '{breaker}': {field} {reason}")]
pub struct ValidationError {
    pub breaker: String,
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(breaker: &str, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            breaker: breaker.to_string(),
            field,
            reason: reason.into(),
        }
    }
}

/// Check every breaker section, collecting all errors.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for breaker in &config.breakers {
        if !seen.insert(breaker.name.as_str()) {
            errors.push(ValidationError::new(&breaker.name, "name", "is defined more than once"));
        }
        validate_breaker(breaker, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_breaker(config: &BreakerConfig, errors: &mut Vec<ValidationError>) {
    let name = config.name.as_str();

    if name.is_empty() {
        errors.push(ValidationError::new(name, "name", "must not be empty"));
    }
    if config.window_buckets == 0 {
        errors.push(ValidationError::new(name, "window_buckets", "must be greater than 0"));
    } else if config.window_time_ms < config.window_buckets as u64 {
        errors.push(ValidationError::new(
            name,
            "window_time_ms",
            "must be at least one millisecond per bucket",
        ));
    }
    if config.events.capacity == 0 {
        errors.push(ValidationError::new(name, "events.capacity", "must be greater than 0"));
    }
    if config.events.source_capacity == 0 {
        errors.push(ValidationError::new(name, "events.source_capacity", "must be greater than 0"));
    }

    if let BackoffConfig::Exponential {
        randomization_factor,
        multiplier,
        initial_interval_ms,
        max_interval_ms,
        ..
    } = config.backoff
    {
        if !(0.0..=1.0).contains(&randomization_factor) {
            errors.push(ValidationError::new(name, "backoff.randomization_factor", "must be within [0, 1]"));
        }
        if multiplier < 1.0 {
            errors.push(ValidationError::new(name, "backoff.multiplier", "must be at least 1"));
        }
        if max_interval_ms < initial_interval_ms {
            errors.push(ValidationError::new(
                name,
                "backoff.max_interval_ms",
                "must not be below initial_interval_ms",
            ));
        }
    }

    match config.tripper {
        TripperConfig::Threshold { failures } | TripperConfig::Consecutive { failures } if failures < 1 => {
            errors.push(ValidationError::new(name, "tripper.failures", "must be at least 1"));
        }
        TripperConfig::Rate { rate, min_samples } => {
            if !(rate > 0.0 && rate <= 1.0) {
                errors.push(ValidationError::new(name, "tripper.rate", "must be within (0, 1]"));
            }
            if min_samples < 0 {
                errors.push(ValidationError::new(name, "tripper.min_samples", "must not be negative"));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_breaker(breaker: BreakerConfig) -> Config {
        Config {
            breakers: vec![breaker],
            ..Config::default()
        }
    }

    #[test]
    fn test_default_breaker_is_valid() {
        assert!(validate_config(&with_breaker(BreakerConfig::default())).is_ok());
    }

    #[test]
    fn test_duplicate_names() {
        let config = Config {
            breakers: vec![BreakerConfig::default(), BreakerConfig::default()],
            ..Config::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");
    }

    #[test]
    fn test_bad_backoff_and_tripper() {
        let config = with_breaker(BreakerConfig {
            backoff: BackoffConfig::Exponential {
                initial_interval_ms: 1000,
                randomization_factor: 2.0,
                multiplier: 0.5,
                max_interval_ms: 10,
                max_elapsed_ms: None,
            },
            tripper: TripperConfig::Consecutive { failures: 0 },
            ..BreakerConfig::default()
        });

        let fields: Vec<_> = validate_config(&config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "backoff.randomization_factor",
                "backoff.multiplier",
                "backoff.max_interval_ms",
                "tripper.failures",
            ]
        );
    }

    #[test]
    fn test_error_message() {
        let err = ValidationError::new("db", "window_buckets", "must be greater than 0");
        assert_eq!(err.to_string(), "breaker 'db': window_buckets must be greater than 0");
    }
}
