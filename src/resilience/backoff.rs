//! Backoff policies governing when an open breaker may probe again.
//!
//! # Responsibilities
//! - Produce successive retry intervals (exponential with jitter by default)
//! - Report "stop" once no further retries should happen
//!
//! # Design Decisions
//! - `None` from [`BackoffPolicy::next_backoff`] means stop, so callers
//!   cannot confuse it with a very long interval
//! - Elapsed-time limits are measured on the injected [`Clock`]

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::clock::Clock;

pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Source of retry intervals.
pub trait BackoffPolicy: Debug + Send {
    /// Next interval to wait, or `None` when retries should stop.
    fn next_backoff(&mut self) -> Option<Duration>;

    /// Return to the initial interval.
    fn reset(&mut self);
}

/// Exponentially growing intervals with optional jitter.
///
/// Each call returns the current interval randomized into
/// `[current * (1 - factor), current * (1 + factor)]`, then multiplies the
/// current interval by `multiplier`, capped at `max_interval`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    randomization_factor: f64,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed_time: Option<Duration>,
    current_interval: Duration,
    started_at: Instant,
    clock: Arc<dyn Clock>,
}

impl ExponentialBackoff {
    /// Create a policy with default parameters and no elapsed-time limit.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            multiplier: DEFAULT_MULTIPLIER,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_elapsed_time: None,
            current_interval: DEFAULT_INITIAL_INTERVAL,
            started_at,
            clock,
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self.current_interval = interval;
        self
    }

    /// Set the jitter factor, clamped to `[0, 1]`. Zero disables jitter.
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Set the growth multiplier. Values below 1 are treated as 1.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Stop producing intervals once this much time has passed since the
    /// last reset. `None` never stops.
    pub fn with_max_elapsed_time(mut self, limit: Option<Duration>) -> Self {
        self.max_elapsed_time = limit;
        self
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// The un-jittered interval the next call will be based on.
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    fn increment(&mut self) {
        let grown = self.current_interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.max_interval)
            .min(self.max_interval);
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(limit) = self.max_elapsed_time {
            if self.clock.now().saturating_duration_since(self.started_at) > limit {
                return None;
            }
        }

        let next = randomize(self.current_interval, self.randomization_factor);
        self.increment();
        Some(next)
    }

    fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.started_at = self.clock.now();
    }
}

fn randomize(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || interval.is_zero() {
        return interval;
    }

    let center = interval.as_secs_f64();
    let delta = center * factor;
    let low = (center - delta).max(0.0);
    let high = center + delta;
    let jittered = rand::thread_rng().gen_range(low..=high);
    Duration::try_from_secs_f64(jittered).unwrap_or(interval)
}

/// The same interval every time.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff {
    interval: Duration,
}

impl ConstantBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackoffPolicy for ConstantBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        Some(self.interval)
    }

    fn reset(&mut self) {}
}

/// Never retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopBackoff;

impl BackoffPolicy for StopBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}

/// Retry immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroBackoff;

impl BackoffPolicy for ZeroBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        Some(Duration::ZERO)
    }

    fn reset(&mut self) {}
}
