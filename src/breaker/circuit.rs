//! The breaker-shaped interface and the protected call built on it.

use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

use super::{BreakerState, CallError};
use crate::clock::Clock;
use crate::observability::metrics;
use crate::resilience::timeouts::{self, Interrupted};

/// Counters a [`Tripper`](crate::resilience::Tripper) may inspect.
pub trait BreakerStats {
    /// Failures recorded in the sliding window.
    fn failures(&self) -> i64;

    /// Successes recorded in the sliding window.
    fn successes(&self) -> i64;

    /// Failures since the last success or reset.
    fn consec_failures(&self) -> i64;

    /// Windowed `failures / (failures + successes)`; `0.0` with no samples.
    fn error_rate(&self) -> f64;
}

/// Anything that behaves like a circuit breaker.
///
/// [`call`](CircuitBreaker::call) is provided in terms of the other methods,
/// so wrappers that override `ready`, `record_failure` or `record_success`
/// see every transition a call causes.
pub trait CircuitBreaker: BreakerStats + Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    fn clock(&self) -> &dyn Clock;

    /// Timeout applied by [`call`](CircuitBreaker::call). Zero runs the
    /// operation inline with no timeout.
    fn default_timeout(&self) -> Duration;

    /// Open the breaker.
    fn trip(&self);

    /// Open the breaker and disable automatic recovery until [`reset`](CircuitBreaker::reset).
    fn break_circuit(&self);

    /// Close the breaker and clear all counters and the backoff schedule.
    fn reset(&self);

    /// Clear failure/success counters without changing state.
    fn reset_counters(&self);

    /// Decide whether a call may proceed.
    ///
    /// Not a pure query: when the breaker is eligible to probe, this acquires
    /// the probe gate and advances the backoff schedule. Call it once per
    /// decision and report the outcome through
    /// [`record_success`](CircuitBreaker::record_success) or
    /// [`record_failure`](CircuitBreaker::record_failure).
    fn ready(&self) -> (bool, BreakerState);

    /// Current state, without side effects.
    fn state(&self) -> BreakerState;

    fn tripped(&self) -> bool;

    /// Interval the breaker waits after a failure before probing; `None`
    /// once the backoff policy has stopped.
    fn next_backoff(&self) -> Option<Duration>;

    /// Record a failed call admitted while in `observed` state and consult
    /// the tripper. Only a `HalfOpen` outcome releases the probe gate.
    ///
    /// Returns true when this failure opened the breaker.
    fn record_failure(&self, observed: BreakerState) -> bool;

    /// Record a successful call admitted while in `observed` state.
    fn record_success(&self, observed: BreakerState);

    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            name: self.name().to_string(),
            state: self.state(),
            tripped: self.tripped(),
            failures: self.failures(),
            successes: self.successes(),
            consec_failures: self.consec_failures(),
            error_rate: self.error_rate(),
            next_backoff_ms: self.next_backoff().map(|d| d.as_millis() as u64),
        }
    }

    /// Run `operation` under the breaker with the default timeout.
    fn call<F, Fut, T, E>(&self, operation: F) -> impl Future<Output = Result<T, CallError<E>>> + Send
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.call_with_timeout(operation, self.default_timeout())
    }

    /// Run `operation` under the breaker.
    ///
    /// Rejected with [`CallError::Open`] without running when the breaker is
    /// not ready. With a non-zero `timeout` the operation runs as its own
    /// task; if the timeout fires first the call fails with
    /// [`CallError::Timeout`] and the operation is left running, its result
    /// discarded.
    fn call_with_timeout<F, Fut, T, E>(
        &self,
        operation: F,
        timeout: Duration,
    ) -> impl Future<Output = Result<T, CallError<E>>> + Send
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        async move { execute(self, operation, timeout).await }
    }
}

/// Point-in-time view of a breaker for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub tripped: bool,
    pub failures: i64,
    pub successes: i64,
    pub consec_failures: i64,
    pub error_rate: f64,
    pub next_backoff_ms: Option<u64>,
}

async fn execute<B, F, Fut, T, E>(breaker: &B, operation: F, timeout: Duration) -> Result<T, CallError<E>>
where
    B: CircuitBreaker + ?Sized,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let (ready, observed) = breaker.ready();
    if !ready {
        tracing::trace!(breaker = breaker.name(), "Call rejected, breaker open");
        metrics::record_rejection(breaker.name());
        return Err(CallError::Open);
    }

    let started = Instant::now();
    let mut probe = ProbeGuard::arm(breaker, observed);

    let outcome = if timeout.is_zero() {
        operation().await.map_err(CallError::Operation)
    } else {
        match timeouts::race(breaker.clock(), operation(), timeout).await {
            Ok(result) => result.map_err(CallError::Operation),
            Err(Interrupted::TimedOut) => {
                tracing::warn!(
                    breaker = breaker.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Call timed out, operation left running"
                );
                metrics::record_timeout(breaker.name());
                Err(CallError::Timeout)
            }
            Err(Interrupted::Cancelled) => Err(CallError::Timeout),
            Err(Interrupted::Panicked(payload)) => {
                probe.disarm();
                breaker.record_failure(observed);
                std::panic::resume_unwind(payload);
            }
        }
    };

    probe.disarm();
    let label = match &outcome {
        Ok(_) => {
            breaker.record_success(observed);
            "success"
        }
        Err(e) => {
            breaker.record_failure(observed);
            if e.is_timeout() {
                "timeout"
            } else {
                "failure"
            }
        }
    };
    metrics::record_call(breaker.name(), label, started);

    outcome
}

/// Counts an abandoned half-open probe as a failure so the probe gate is
/// released even if the caller drops the call future mid-flight.
struct ProbeGuard<'a, B: CircuitBreaker + ?Sized> {
    breaker: &'a B,
    armed: bool,
}

impl<'a, B: CircuitBreaker + ?Sized> ProbeGuard<'a, B> {
    fn arm(breaker: &'a B, observed: BreakerState) -> Self {
        Self {
            breaker,
            armed: observed == BreakerState::HalfOpen,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<B: CircuitBreaker + ?Sized> Drop for ProbeGuard<'_, B> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(breaker = self.breaker.name(), "Half-open probe abandoned");
            self.breaker.record_failure(BreakerState::HalfOpen);
        }
    }
}
