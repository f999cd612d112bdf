//! The breaker itself: atomics for scalar state, mutexes for compound state.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{BreakerBuilder, BreakerState, BreakerStats, CircuitBreaker};
use crate::clock::Clock;
use crate::observability::metrics;
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::tripper::Tripper;
use crate::resilience::window::SlidingWindow;

/// Backoff policy plus the interval it last produced. Read-modify-write
/// sequences on the pair happen under one lock.
#[derive(Debug)]
struct Schedule {
    policy: Box<dyn BackoffPolicy>,
    next: Option<Duration>,
}

impl Schedule {
    fn new(mut policy: Box<dyn BackoffPolicy>) -> Self {
        let next = policy.next_backoff();
        Self { policy, next }
    }

    fn restart(&mut self) {
        self.policy.reset();
        self.next = self.policy.next_backoff();
    }

    fn advance(&mut self) {
        self.next = self.policy.next_backoff();
    }
}

/// A circuit breaker.
///
/// Shared by reference (usually behind an `Arc`) between every caller of
/// the protected dependency. All methods take `&self`.
#[derive(Debug)]
pub struct Breaker {
    name: String,
    clock: Arc<dyn Clock>,
    /// Clock reading at construction; timestamps are nanoseconds past it.
    epoch: Instant,
    default_timeout: Duration,

    tripped: AtomicBool,
    /// Manual break: no automatic recovery.
    broken: AtomicBool,
    consec_failures: AtomicI64,
    last_failure: AtomicU64,
    /// Set while a half-open probe is in flight.
    probe_in_flight: AtomicBool,

    schedule: Mutex<Schedule>,
    window: SlidingWindow,
    tripper: Box<dyn Tripper>,
}

impl Breaker {
    /// Breaker with default settings: never trips on its own, exponential
    /// backoff from 500ms, 10s window in 10 buckets, no timeout.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BreakerBuilder {
        BreakerBuilder::new()
    }

    pub(crate) fn from_parts(
        name: String,
        clock: Arc<dyn Clock>,
        backoff: Box<dyn BackoffPolicy>,
        tripper: Box<dyn Tripper>,
        default_timeout: Duration,
        window_time: Duration,
        window_buckets: usize,
    ) -> Self {
        let epoch = clock.now();
        let window = SlidingWindow::new(Arc::clone(&clock), window_time, window_buckets);

        Self {
            name,
            clock,
            epoch,
            default_timeout,
            tripped: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            consec_failures: AtomicI64::new(0),
            last_failure: AtomicU64::new(0),
            probe_in_flight: AtomicBool::new(false),
            schedule: Mutex::new(Schedule::new(backoff)),
            window,
            tripper,
        }
    }

    /// The rolling counter backing `failures`/`successes`.
    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    fn schedule(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_nanos(&self) -> u64 {
        let since = self.clock.now().saturating_duration_since(self.epoch);
        u64::try_from(since.as_nanos()).unwrap_or(u64::MAX)
    }

    fn stamp_failure(&self) {
        self.last_failure.store(self.now_nanos(), Ordering::Release);
    }

    /// Set the tripped flag; true only for the caller that flipped it.
    fn open(&self) -> bool {
        let was_tripped = self.tripped.swap(true, Ordering::AcqRel);
        self.stamp_failure();

        if !was_tripped {
            tracing::info!(
                breaker = %self.name,
                consec_failures = self.consec_failures(),
                "Breaker tripped"
            );
            metrics::record_transition(&self.name, "tripped");
        }
        !was_tripped
    }

    fn since_last_failure(&self) -> Duration {
        let last = self.last_failure.load(Ordering::Acquire);
        Duration::from_nanos(self.now_nanos().saturating_sub(last))
    }
}

impl Default for Breaker {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerStats for Breaker {
    fn failures(&self) -> i64 {
        self.window.failures()
    }

    fn successes(&self) -> i64 {
        self.window.successes()
    }

    fn consec_failures(&self) -> i64 {
        self.consec_failures.load(Ordering::Acquire)
    }

    fn error_rate(&self) -> f64 {
        self.window.error_rate()
    }
}

impl CircuitBreaker for Breaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn trip(&self) {
        self.open();
    }

    fn break_circuit(&self) {
        self.broken.store(true, Ordering::Release);
        tracing::info!(breaker = %self.name, "Breaker manually broken");
        self.trip();
    }

    fn reset(&self) {
        let was_tripped = self.tripped.swap(false, Ordering::AcqRel);
        self.broken.store(false, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
        self.schedule().restart();
        self.reset_counters();

        if was_tripped {
            tracing::info!(breaker = %self.name, "Breaker reset");
            metrics::record_transition(&self.name, "reset");
        }
    }

    fn reset_counters(&self) {
        self.consec_failures.store(0, Ordering::Release);
        self.window.reset();
    }

    fn ready(&self) -> (bool, BreakerState) {
        if !self.tripped() {
            return (true, BreakerState::Closed);
        }
        if self.broken.load(Ordering::Acquire) {
            return (false, BreakerState::Open);
        }

        let mut schedule = self.schedule();
        let Some(interval) = schedule.next else {
            return (false, BreakerState::Open);
        };
        if self.since_last_failure() <= interval {
            return (false, BreakerState::Open);
        }
        if self
            .probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return (false, BreakerState::Open);
        }

        schedule.advance();
        tracing::debug!(
            breaker = %self.name,
            waited_ms = interval.as_millis() as u64,
            next_backoff_ms = ?schedule.next.map(|d| d.as_millis()),
            "Breaker half-open, admitting probe"
        );
        metrics::record_transition(&self.name, "ready");
        (true, BreakerState::HalfOpen)
    }

    fn state(&self) -> BreakerState {
        if !self.tripped() {
            return BreakerState::Closed;
        }
        if self.broken.load(Ordering::Acquire) {
            return BreakerState::Open;
        }
        if self.probe_in_flight.load(Ordering::Acquire) {
            return BreakerState::HalfOpen;
        }

        match self.schedule().next {
            Some(interval) if self.since_last_failure() > interval => BreakerState::HalfOpen,
            _ => BreakerState::Open,
        }
    }

    fn tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    fn next_backoff(&self) -> Option<Duration> {
        self.schedule().next
    }

    fn record_failure(&self, observed: BreakerState) -> bool {
        self.window.record_failure();
        self.consec_failures.fetch_add(1, Ordering::AcqRel);
        self.stamp_failure();
        if observed == BreakerState::HalfOpen {
            // The probe resolved; the backoff already moved on in `ready`.
            self.probe_in_flight.store(false, Ordering::Release);
        }

        self.tripper.should_trip(self) && self.open()
    }

    fn record_success(&self, observed: BreakerState) {
        self.schedule().restart();

        if observed == BreakerState::HalfOpen {
            tracing::debug!(breaker = %self.name, "Half-open probe succeeded");
            self.reset();
            return;
        }

        self.consec_failures.store(0, Ordering::Release);
        self.window.record_success();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::resilience::backoff::{ExponentialBackoff, StopBackoff};
    use crate::resilience::tripper;
    use std::thread;

    fn breaker_with(clock: &MockClock, tripper: impl Tripper + 'static) -> Breaker {
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let backoff = ExponentialBackoff::new(Arc::clone(&shared))
            .with_initial_interval(Duration::from_millis(100))
            .with_randomization_factor(0.0)
            .with_multiplier(2.0);
        Breaker::builder()
            .clock(shared)
            .backoff(backoff)
            .tripper(tripper)
            .build()
    }

    fn past(interval: Option<Duration>) -> Duration {
        interval.unwrap() + Duration::from_millis(1)
    }

    #[test]
    fn test_trip_and_reset() {
        let clock = MockClock::new();
        let cb = breaker_with(&clock, tripper::never());
        assert!(!cb.tripped());
        assert_eq!(cb.state(), BreakerState::Closed);

        cb.trip();
        assert!(cb.tripped());
        assert_eq!(cb.state(), BreakerState::Open);

        cb.reset();
        assert!(!cb.tripped());
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_ready_admits_one_probe_per_interval() {
        let clock = MockClock::new();
        let cb = breaker_with(&clock, tripper::never());
        assert_eq!(cb.ready(), (true, BreakerState::Closed));

        cb.trip();
        assert_eq!(cb.ready(), (false, BreakerState::Open));

        clock.advance(past(cb.next_backoff()));
        assert_eq!(cb.ready(), (true, BreakerState::HalfOpen));
        assert_eq!(cb.ready(), (false, BreakerState::Open));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_failed_probe_pushes_backoff_out() {
        let clock = MockClock::new();
        let cb = breaker_with(&clock, tripper::never());
        cb.trip();
        let first = cb.next_backoff().unwrap();

        clock.advance(first + Duration::from_millis(1));
        assert_eq!(cb.ready(), (true, BreakerState::HalfOpen));
        assert!(!cb.record_failure(BreakerState::HalfOpen));

        assert!(cb.tripped());
        let second = cb.next_backoff().unwrap();
        assert!(second > first);

        clock.advance(first + Duration::from_millis(1));
        assert_eq!(cb.ready(), (false, BreakerState::Open));

        clock.advance(second - first);
        assert_eq!(cb.ready(), (true, BreakerState::HalfOpen));
    }

    #[test]
    fn test_successful_probe_fully_resets() {
        let clock = MockClock::new();
        let cb = breaker_with(&clock, tripper::threshold(1));
        cb.record_failure(BreakerState::Closed);
        assert!(cb.tripped());

        clock.advance(past(cb.next_backoff()));
        let (ready, observed) = cb.ready();
        assert!(ready);
        cb.record_success(observed);

        assert!(!cb.tripped());
        assert_eq!(cb.failures(), 0);
        assert_eq!(cb.consec_failures(), 0);
        assert_eq!(cb.next_backoff(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_manual_break_disables_recovery() {
        let clock = MockClock::new();
        let cb = breaker_with(&clock, tripper::never());
        cb.break_circuit();

        clock.advance(Duration::from_secs(3600));
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.ready(), (false, BreakerState::Open));

        cb.reset();
        cb.trip();
        clock.advance(past(cb.next_backoff()));
        assert!(cb.ready().0);
    }

    #[test]
    fn test_stopped_backoff_never_recovers() {
        let clock = MockClock::new();
        let cb = Breaker::builder()
            .clock(Arc::new(clock.clone()))
            .backoff(StopBackoff)
            .build();
        cb.trip();
        assert_eq!(cb.next_backoff(), None);

        clock.advance(Duration::from_secs(86_400));
        assert_eq!(cb.ready(), (false, BreakerState::Open));
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn test_counts() {
        let clock = MockClock::new();
        let cb = breaker_with(&clock, tripper::never());

        cb.record_failure(BreakerState::Closed);
        assert_eq!(cb.failures(), 1);
        cb.record_failure(BreakerState::Closed);
        assert_eq!(cb.consec_failures(), 2);

        cb.record_success(cb.state());
        assert_eq!(cb.successes(), 1);
        assert_eq!(cb.consec_failures(), 0);

        cb.reset();
        assert_eq!(cb.failures(), 0);
        assert_eq!(cb.successes(), 0);
        assert_eq!(cb.consec_failures(), 0);
    }

    #[test]
    fn test_reset_counters_keeps_state() {
        let clock = MockClock::new();
        let cb = breaker_with(&clock, tripper::threshold(2));
        cb.record_failure(BreakerState::Closed);
        cb.record_failure(BreakerState::Closed);
        assert!(cb.tripped());

        cb.reset_counters();
        assert!(cb.tripped());
        assert_eq!(cb.failures(), 0);
        assert_eq!(cb.consec_failures(), 0);
    }

    #[test]
    fn test_concurrent_ready_admits_single_probe() {
        let clock = MockClock::new();
        let cb = Arc::new(breaker_with(&clock, tripper::never()));
        cb.trip();
        clock.advance(past(cb.next_backoff()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cb = Arc::clone(&cb);
                thread::spawn(move || cb.ready())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|(ready, state)| *ready && *state == BreakerState::HalfOpen)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_late_closed_failure_keeps_probe_gate() {
        let clock = MockClock::new();
        let cb = breaker_with(&clock, tripper::never());
        cb.trip();
        clock.advance(past(cb.next_backoff()));
        assert_eq!(cb.ready(), (true, BreakerState::HalfOpen));

        // A call admitted before the trip fails while the probe is running.
        cb.record_failure(BreakerState::Closed);
        clock.advance(past(cb.next_backoff()));
        assert_eq!(cb.ready(), (false, BreakerState::Open));
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.record_failure(BreakerState::HalfOpen);
        clock.advance(past(cb.next_backoff()));
        assert_eq!(cb.ready(), (true, BreakerState::HalfOpen));
    }

    #[test]
    fn test_only_one_failure_reports_the_trip() {
        let clock = MockClock::new();
        let cb = Arc::new(breaker_with(&clock, tripper::threshold(1)));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cb = Arc::clone(&cb);
                thread::spawn(move || cb.record_failure(BreakerState::Closed))
            })
            .collect();

        let opened = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|opened| *opened)
            .count();
        assert_eq!(opened, 1);
        assert_eq!(cb.failures(), 16);
        assert!(!cb.record_failure(BreakerState::Closed));
    }

    #[test]
    fn test_error_rate_empty() {
        let cb = Breaker::new();
        assert_eq!(cb.error_rate(), 0.0);
    }
}
