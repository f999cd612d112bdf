//! Rolling failure/success counts over a fixed time window.
//!
//! # Responsibilities
//! - Keep per-bucket failure and success counts in a fixed-size ring
//! - Expire buckets as time passes, on reads as well as writes
//!
//! # Design Decisions
//! - O(bucket count) memory instead of an event log; granularity is one
//!   bucket interval
//! - Every operation may rotate the ring, so reads and writes share one
//!   mutex rather than a reader/writer split

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::Clock;

pub const DEFAULT_WINDOW_TIME: Duration = Duration::from_secs(10);
pub const DEFAULT_WINDOW_BUCKETS: usize = 10;

/// Counts for one slice of the window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub failures: i64,
    pub successes: i64,
}

impl Bucket {
    fn clear(&mut self) {
        *self = Bucket::default();
    }
}

#[derive(Debug)]
struct Ring {
    buckets: Vec<Bucket>,
    current: usize,
    last_access: Instant,
}

impl Ring {
    /// Rotate past every bucket interval that elapsed since the last access,
    /// clearing each bucket entered. Returns the current bucket.
    fn latest(&mut self, now: Instant, bucket_time: Duration) -> &mut Bucket {
        let elapsed = now.saturating_duration_since(self.last_access);
        let steps = elapsed.as_nanos() / bucket_time.as_nanos().max(1);

        if steps > 0 {
            let len = self.buckets.len();
            let rotate = usize::try_from(steps).unwrap_or(usize::MAX).min(len);
            for _ in 0..rotate {
                self.current = (self.current + 1) % len;
                self.buckets[self.current].clear();
            }

            self.last_access = if rotate == len {
                now
            } else {
                // Keep bucket boundaries aligned instead of drifting with
                // access times. `rotate < len` so the product fits.
                self.last_access + bucket_time * rotate as u32
            };
        }

        &mut self.buckets[self.current]
    }

    fn totals(&self) -> Bucket {
        self.buckets.iter().fold(Bucket::default(), |acc, b| Bucket {
            failures: acc.failures + b.failures,
            successes: acc.successes + b.successes,
        })
    }
}

/// Time-bucketed ring of failure and success counts.
///
/// A 10 second window with 10 buckets keeps ten one-second buckets; counts
/// older than the window fall out as the ring rotates.
#[derive(Debug)]
pub struct SlidingWindow {
    ring: Mutex<Ring>,
    bucket_time: Duration,
    clock: Arc<dyn Clock>,
}

impl SlidingWindow {
    /// Create a window covering `window_time`, split into `buckets` slices.
    ///
    /// A zero bucket count is treated as one bucket.
    pub fn new(clock: Arc<dyn Clock>, window_time: Duration, buckets: usize) -> Self {
        let buckets = buckets.max(1);
        let divisor = u32::try_from(buckets).unwrap_or(u32::MAX);
        let bucket_time = (window_time / divisor).max(Duration::from_nanos(1));

        Self {
            ring: Mutex::new(Ring {
                buckets: vec![Bucket::default(); buckets],
                current: 0,
                last_access: clock.now(),
            }),
            bucket_time,
            clock,
        }
    }

    /// Duration covered by a single bucket.
    pub fn bucket_time(&self) -> Duration {
        self.bucket_time
    }

    pub fn bucket_count(&self) -> usize {
        self.lock().buckets.len()
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        self.lock().latest(now, self.bucket_time).failures += 1;
    }

    pub fn record_success(&self) {
        let now = self.clock.now();
        self.lock().latest(now, self.bucket_time).successes += 1;
    }

    /// Sum of all live buckets, after expiring stale ones.
    pub fn totals(&self) -> Bucket {
        let now = self.clock.now();
        let mut ring = self.lock();
        ring.latest(now, self.bucket_time);
        ring.totals()
    }

    pub fn failures(&self) -> i64 {
        self.totals().failures
    }

    pub fn successes(&self) -> i64 {
        self.totals().successes
    }

    /// `failures / (failures + successes)`, or `0.0` with no samples.
    pub fn error_rate(&self) -> f64 {
        let totals = self.totals();
        let samples = totals.failures + totals.successes;
        if samples == 0 {
            return 0.0;
        }
        totals.failures as f64 / samples as f64
    }

    /// Zero every bucket without rotating.
    pub fn reset(&self) {
        self.lock().buckets.iter_mut().for_each(Bucket::clear);
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // Buckets are plain counters; a panic mid-update cannot leave them
        // in a state worth refusing to read.
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
