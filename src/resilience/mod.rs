//! Resilience primitives consumed by the breaker.
//!
//! # Data Flow
//! ```text
//! Protected call:
//!     → timeouts.rs (race operation against clock alarm)
//!     → outcome recorded in window.rs (rolling failure/success buckets)
//!     → on failure: tripper.rs (decide whether to open)
//!     → while open: backoff.rs (when may the next probe run?)
//! ```
//!
//! # Design Decisions
//! - Each policy is a small trait so callers can plug their own
//! - None of these types know about breaker states; `breaker` ties them together

pub mod backoff;
pub mod timeouts;
pub mod tripper;
pub mod window;

pub use backoff::{BackoffPolicy, ConstantBackoff, ExponentialBackoff, StopBackoff, ZeroBackoff};
pub use tripper::{Tripper, TripperFn};
pub use window::{Bucket, SlidingWindow};
