//! Trip policies: when should accumulated failures open the breaker?
//!
//! A [`Tripper`] is consulted after every recorded failure and receives the
//! breaker's counters. Returning `true` trips the breaker.

use std::fmt;

use crate::breaker::BreakerStats;

/// Decides, after a failure, whether the breaker should open.
pub trait Tripper: fmt::Debug + Send + Sync {
    fn should_trip(&self, stats: &dyn BreakerStats) -> bool;
}

/// Never trips. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl Tripper for Never {
    fn should_trip(&self, _stats: &dyn BreakerStats) -> bool {
        false
    }
}

/// Trips once failures within the window reach `failures`.
#[derive(Debug, Clone, Copy)]
pub struct Threshold {
    pub failures: i64,
}

impl Tripper for Threshold {
    fn should_trip(&self, stats: &dyn BreakerStats) -> bool {
        stats.failures() >= self.failures
    }
}

/// Trips once `failures` failures happen with no success in between.
#[derive(Debug, Clone, Copy)]
pub struct Consecutive {
    pub failures: i64,
}

impl Tripper for Consecutive {
    fn should_trip(&self, stats: &dyn BreakerStats) -> bool {
        stats.consec_failures() >= self.failures
    }
}

/// Trips when the windowed error rate reaches `rate`, but only once at
/// least `min_samples` outcomes have been recorded.
#[derive(Debug, Clone, Copy)]
pub struct Rate {
    pub rate: f64,
    pub min_samples: i64,
}

impl Tripper for Rate {
    fn should_trip(&self, stats: &dyn BreakerStats) -> bool {
        let samples = stats.failures() + stats.successes();
        samples >= self.min_samples && stats.error_rate() >= self.rate
    }
}

/// Adapts a closure into a [`Tripper`].
pub struct TripperFn<F>(pub F);

impl<F> fmt::Debug for TripperFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TripperFn")
    }
}

impl<F> Tripper for TripperFn<F>
where
    F: Fn(&dyn BreakerStats) -> bool + Send + Sync,
{
    fn should_trip(&self, stats: &dyn BreakerStats) -> bool {
        (self.0)(stats)
    }
}

pub fn never() -> Never {
    Never
}

pub fn threshold(failures: i64) -> Threshold {
    Threshold { failures }
}

pub fn consecutive(failures: i64) -> Consecutive {
    Consecutive { failures }
}

pub fn rate(rate: f64, min_samples: i64) -> Rate {
    Rate { rate, min_samples }
}

/// Custom trip decision from a closure.
pub fn custom<F>(decide: F) -> TripperFn<F>
where
    F: Fn(&dyn BreakerStats) -> bool + Send + Sync,
{
    TripperFn(decide)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counts {
        failures: i64,
        successes: i64,
        consec: i64,
    }

    impl BreakerStats for Counts {
        fn failures(&self) -> i64 {
            self.failures
        }

        fn successes(&self) -> i64 {
            self.successes
        }

        fn consec_failures(&self) -> i64 {
            self.consec
        }

        fn error_rate(&self) -> f64 {
            let total = self.failures + self.successes;
            if total == 0 {
                0.0
            } else {
                self.failures as f64 / total as f64
            }
        }
    }

    fn counts(failures: i64, successes: i64, consec: i64) -> Counts {
        Counts { failures, successes, consec }
    }

    #[test]
    fn test_never() {
        assert!(!never().should_trip(&counts(1000, 0, 1000)));
    }

    #[test]
    fn test_threshold() {
        let t = threshold(3);
        assert!(!t.should_trip(&counts(2, 0, 2)));
        assert!(t.should_trip(&counts(3, 10, 0)));
    }

    #[test]
    fn test_consecutive() {
        let t = consecutive(3);
        assert!(!t.should_trip(&counts(10, 0, 2)));
        assert!(t.should_trip(&counts(3, 5, 3)));
    }

    #[test]
    fn test_rate_needs_min_samples() {
        let t = rate(0.5, 4);
        assert!(!t.should_trip(&counts(3, 0, 3)));
        assert!(t.should_trip(&counts(2, 2, 2)));
        assert!(!t.should_trip(&counts(1, 3, 1)));
    }

    #[test]
    fn test_closure_tripper() {
        let t = TripperFn(|stats: &dyn BreakerStats| stats.successes() == 0 && stats.failures() > 0);
        assert!(t.should_trip(&counts(1, 0, 1)));
        assert!(!t.should_trip(&counts(1, 1, 0)));
        assert_eq!(format!("{:?}", t), "TripperFn");
    }
}
