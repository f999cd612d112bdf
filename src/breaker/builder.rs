//! Programmatic and config-driven breaker construction.

use std::sync::Arc;
use std::time::Duration;

use super::Breaker;
use crate::clock::{Clock, SystemClock};
use crate::config::{BackoffConfig, BreakerConfig, TripperConfig};
use crate::resilience::backoff::{BackoffPolicy, ConstantBackoff, ExponentialBackoff, StopBackoff};
use crate::resilience::tripper::{self, Tripper};
use crate::resilience::window::{DEFAULT_WINDOW_BUCKETS, DEFAULT_WINDOW_TIME};

/// Builder for [`Breaker`].
///
/// Unset options fall back to: system clock, exponential backoff starting
/// at 500ms with no elapsed-time limit, a tripper that never trips, no
/// timeout, and a 10 second window of 10 buckets.
#[derive(Debug)]
pub struct BreakerBuilder {
    name: String,
    clock: Option<Arc<dyn Clock>>,
    backoff: Option<Box<dyn BackoffPolicy>>,
    backoff_config: Option<BackoffConfig>,
    tripper: Option<Box<dyn Tripper>>,
    timeout: Duration,
    window_time: Duration,
    window_buckets: usize,
}

impl BreakerBuilder {
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            clock: None,
            backoff: None,
            backoff_config: None,
            tripper: None,
            timeout: Duration::ZERO,
            window_time: DEFAULT_WINDOW_TIME,
            window_buckets: DEFAULT_WINDOW_BUCKETS,
        }
    }

    /// Start from a config section. Explicit builder calls made afterwards
    /// override it.
    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new()
            .name(config.name.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .window_time(Duration::from_millis(config.window_time_ms))
            .window_buckets(config.window_buckets)
            .boxed_tripper(tripper_from_config(&config.tripper))
            .backoff_config(config.backoff.clone())
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Some(Box::new(backoff));
        self
    }

    /// Describe the backoff declaratively; it is built against the final
    /// clock when [`build`](Self::build) runs.
    pub fn backoff_config(mut self, config: BackoffConfig) -> Self {
        self.backoff = None;
        self.backoff_config = Some(config);
        self
    }

    pub fn tripper(self, tripper: impl Tripper + 'static) -> Self {
        self.boxed_tripper(Box::new(tripper))
    }

    pub fn boxed_tripper(mut self, tripper: Box<dyn Tripper>) -> Self {
        self.tripper = Some(tripper);
        self
    }

    /// Default timeout for [`call`](crate::breaker::CircuitBreaker::call).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Window length; zero keeps the default.
    pub fn window_time(mut self, window_time: Duration) -> Self {
        if !window_time.is_zero() {
            self.window_time = window_time;
        }
        self
    }

    /// Bucket count; zero keeps the default.
    pub fn window_buckets(mut self, buckets: usize) -> Self {
        if buckets > 0 {
            self.window_buckets = buckets;
        }
        self
    }

    pub fn build(self) -> Breaker {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let backoff = match (self.backoff, self.backoff_config) {
            (Some(policy), _) => policy,
            (None, Some(config)) => backoff_from_config(&config, Arc::clone(&clock)),
            (None, None) => Box::new(ExponentialBackoff::new(Arc::clone(&clock))),
        };
        let tripper = self.tripper.unwrap_or_else(|| Box::new(tripper::never()));

        tracing::debug!(
            breaker = %self.name,
            timeout_ms = self.timeout.as_millis() as u64,
            window_ms = self.window_time.as_millis() as u64,
            buckets = self.window_buckets,
            tripper = ?tripper,
            "Breaker created"
        );

        Breaker::from_parts(
            self.name,
            clock,
            backoff,
            tripper,
            self.timeout,
            self.window_time,
            self.window_buckets,
        )
    }
}

impl Default for BreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Breaker {
    /// Build a breaker from a config section using the system clock.
    pub fn from_config(config: &BreakerConfig) -> Self {
        BreakerBuilder::from_config(config).build()
    }
}

fn backoff_from_config(config: &BackoffConfig, clock: Arc<dyn Clock>) -> Box<dyn BackoffPolicy> {
    match *config {
        BackoffConfig::Exponential {
            initial_interval_ms,
            randomization_factor,
            multiplier,
            max_interval_ms,
            max_elapsed_ms,
        } => Box::new(
            ExponentialBackoff::new(clock)
                .with_initial_interval(Duration::from_millis(initial_interval_ms))
                .with_randomization_factor(randomization_factor)
                .with_multiplier(multiplier)
                .with_max_interval(Duration::from_millis(max_interval_ms))
                .with_max_elapsed_time(max_elapsed_ms.map(Duration::from_millis)),
        ),
        BackoffConfig::Constant { interval_ms } => {
            Box::new(ConstantBackoff::new(Duration::from_millis(interval_ms)))
        }
        BackoffConfig::Stop => Box::new(StopBackoff),
    }
}

fn tripper_from_config(config: &TripperConfig) -> Box<dyn Tripper> {
    match *config {
        TripperConfig::Never => Box::new(tripper::never()),
        TripperConfig::Threshold { failures } => Box::new(tripper::threshold(failures)),
        TripperConfig::Consecutive { failures } => Box::new(tripper::consecutive(failures)),
        TripperConfig::Rate { rate, min_samples } => Box::new(tripper::rate(rate, min_samples)),
    }
}
