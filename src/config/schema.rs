//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! fill unspecified fields from their defaults.

use serde::{Deserialize, Serialize};

use crate::events::DeliveryPolicy;

/// Root configuration: a set of named breakers plus process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Breaker definitions, one per protected dependency.
    pub breakers: Vec<BreakerConfig>,
}

/// Settings for a single breaker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Breaker name, used as registry key, log field and metrics label.
    pub name: String,

    /// Default call timeout in milliseconds (0 = run inline, no timeout).
    pub timeout_ms: u64,

    /// Duration covered by the sliding window in milliseconds.
    pub window_time_ms: u64,

    /// Number of buckets the window is split into.
    pub window_buckets: usize,

    /// Backoff between recovery probes.
    pub backoff: BackoffConfig,

    /// When to open the breaker.
    pub tripper: TripperConfig,

    /// Event fan-out settings, used when the breaker is wrapped in an emitter.
    pub events: EventConfig,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            timeout_ms: 0,
            window_time_ms: 10_000,
            window_buckets: 10,
            backoff: BackoffConfig::default(),
            tripper: TripperConfig::default(),
            events: EventConfig::default(),
        }
    }
}

/// Backoff policy selection.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    /// Exponential growth with jitter.
    Exponential {
        #[serde(default = "default_initial_interval_ms")]
        initial_interval_ms: u64,
        #[serde(default = "default_randomization_factor")]
        randomization_factor: f64,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        #[serde(default = "default_max_interval_ms")]
        max_interval_ms: u64,
        /// Stop probing after this long without a reset (absent = never).
        #[serde(default)]
        max_elapsed_ms: Option<u64>,
    },
    /// Fixed interval.
    Constant { interval_ms: u64 },
    /// Never probe; only a manual reset recovers.
    Stop,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            initial_interval_ms: default_initial_interval_ms(),
            randomization_factor: default_randomization_factor(),
            multiplier: default_multiplier(),
            max_interval_ms: default_max_interval_ms(),
            max_elapsed_ms: None,
        }
    }
}

fn default_initial_interval_ms() -> u64 {
    500
}

fn default_randomization_factor() -> f64 {
    0.5
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_max_interval_ms() -> u64 {
    60_000
}

/// Trip policy selection.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripperConfig {
    #[default]
    Never,
    /// Trip when windowed failures reach `failures`.
    Threshold { failures: i64 },
    /// Trip after `failures` failures in a row.
    Consecutive { failures: i64 },
    /// Trip when the error rate reaches `rate` over at least `min_samples`.
    Rate { rate: f64, min_samples: i64 },
}

/// Event fan-out configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventConfig {
    /// Queue length per subscriber.
    pub capacity: usize,

    /// Queue length of the internal event source feeding the fan-out task.
    pub source_capacity: usize,

    /// What to do when a subscriber's queue is full.
    pub policy: DeliveryPolicy,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            source_capacity: 64,
            policy: DeliveryPolicy::DropNewest,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
