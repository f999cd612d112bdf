//! Wall-clock time backed by Tokio's timer.

use std::time::{Duration, Instant};

use super::{Clock, Sleep};

/// Clock using the process monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}
