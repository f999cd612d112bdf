//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use circuit_breaker::resilience::{ExponentialBackoff, Tripper};
use circuit_breaker::{Breaker, Clock, MockClock};

/// First probe interval of [`breaker`]; doubles on every failed probe.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq)]
#[error("backend unavailable")]
pub struct BackendDown;

/// Breaker on a mock clock with jitter-free exponential backoff.
pub fn breaker(clock: &MockClock, tripper: impl Tripper + 'static) -> Breaker {
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let backoff = ExponentialBackoff::new(Arc::clone(&shared))
        .with_initial_interval(INITIAL_BACKOFF)
        .with_randomization_factor(0.0)
        .with_multiplier(2.0);

    Breaker::builder()
        .name("test")
        .clock(shared)
        .backoff(backoff)
        .tripper(tripper)
        .build()
}

pub async fn failing() -> Result<(), BackendDown> {
    Err(BackendDown)
}

pub async fn succeeding() -> Result<u32, BackendDown> {
    Ok(42)
}

pub async fn panicking() -> Result<(), BackendDown> {
    panic!("backend exploded")
}

/// Move the mock clock just past `interval`.
pub fn advance_past(clock: &MockClock, interval: Option<Duration>) {
    clock.advance(interval.expect("backoff should not be stopped") + Duration::from_millis(1));
}

/// Yield until `condition` holds, failing the test after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Await `future`, failing the test after two seconds.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("future did not complete in time")
}
