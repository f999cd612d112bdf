//! Timeout enforcement for protected calls.
//!
//! # Responsibilities
//! - Run an operation as its own task and race it against a clock alarm
//! - Report which side won, without cancelling the loser
//!
//! # Design Decisions
//! - The alarm comes from the breaker's [`Clock`], so tests drive it
//! - A timed-out operation keeps running detached; its result is dropped.
//!   Callers relying on side effects of the operation still get them.

use std::any::Any;
use std::future::Future;
use std::time::Duration;

use crate::clock::Clock;

/// Why a raced operation produced no result.
#[derive(Debug)]
pub enum Interrupted {
    /// The alarm fired first.
    TimedOut,
    /// The runtime cancelled the operation task.
    Cancelled,
    /// The operation panicked; carries the payload for resumption.
    Panicked(Box<dyn Any + Send + 'static>),
}

/// Spawn `operation` and wait for it or for `limit` on `clock`, whichever
/// comes first.
///
/// The alarm is armed before the task is spawned. An operation that finishes
/// in the same poll as the alarm wins.
pub async fn race<Fut, T>(clock: &dyn Clock, operation: Fut, limit: Duration) -> Result<T, Interrupted>
where
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let alarm = clock.sleep(limit);
    let task = tokio::spawn(operation);

    tokio::select! {
        biased;

        joined = task => match joined {
            Ok(output) => Ok(output),
            Err(e) if e.is_panic() => Err(Interrupted::Panicked(e.into_panic())),
            Err(_) => Err(Interrupted::Cancelled),
        },
        _ = alarm => Err(Interrupted::TimedOut),
    }
}
