//! Time sources.
//!
//! # Responsibilities
//! - Supply the current instant to the breaker, its window and its backoff
//! - Supply the alarm used to race a protected call against its timeout
//!
//! # Design Decisions
//! - `Clock` is injected through configuration, never a global
//! - `MockClock` is advanced by hand so tests never wait on real time

pub mod mock;
pub mod system;

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

pub use mock::MockClock;
pub use system::SystemClock;

/// Future returned by [`Clock::sleep`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Pluggable time source.
pub trait Clock: Debug + Send + Sync {
    /// Current instant according to this clock.
    fn now(&self) -> Instant;

    /// Resolve once `duration` has elapsed on this clock.
    ///
    /// The deadline is fixed when `sleep` is called, not when the future is
    /// first polled.
    fn sleep(&self, duration: Duration) -> Sleep;
}
