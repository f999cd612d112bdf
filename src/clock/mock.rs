//! Manually driven clock for tests and simulations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use super::{Clock, Sleep};

#[derive(Debug)]
struct Shared {
    base: Instant,
    elapsed_nanos: AtomicU64,
    tick: Notify,
}

impl Shared {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same timeline. Pending [`Clock::sleep`] futures resolve
/// once [`MockClock::advance`] moves the clock past their deadline.
#[derive(Debug, Clone)]
pub struct MockClock {
    shared: Arc<Shared>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                base: Instant::now(),
                elapsed_nanos: AtomicU64::new(0),
                tick: Notify::new(),
            }),
        }
    }

    /// Move the clock forward and wake sleepers.
    pub fn advance(&self, by: Duration) {
        self.shared
            .elapsed_nanos
            .fetch_add(duration_nanos(by), Ordering::SeqCst);
        self.shared.tick.notify_waiters();
    }

    /// Position the clock at `elapsed` past its creation instant.
    ///
    /// Moving backwards is allowed; sleepers are only woken, never rearmed.
    pub fn set_elapsed(&self, elapsed: Duration) {
        self.shared
            .elapsed_nanos
            .store(duration_nanos(elapsed), Ordering::SeqCst);
        self.shared.tick.notify_waiters();
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.shared.elapsed()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.shared.base + self.shared.elapsed()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let shared = Arc::clone(&self.shared);
        let deadline = shared.elapsed().saturating_add(duration);
        Box::pin(async move {
            loop {
                let tick = shared.tick.notified();
                tokio::pin!(tick);
                // Register before checking so an advance between the check
                // and the await is not lost.
                tick.as_mut().enable();
                if shared.elapsed() >= deadline {
                    return;
                }
                tick.await;
            }
        })
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
