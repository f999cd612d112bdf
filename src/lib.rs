//! Circuit breaker library.
//!
//! Wraps fallible, possibly slow async operations and stops calling a
//! dependency that keeps failing, probing it again on a backoff schedule.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──call(op)──▶ EventEmitter (optional) ──▶ Breaker
//!                              │                      │
//!                              │ events               ├─ ready(): state + probe gate
//!                              ▼                      ├─ timeouts::race(op, Clock alarm)
//!                         Subscriptions               ├─ SlidingWindow (failures/successes)
//!                                                     ├─ Tripper (open?)
//!                                                     └─ BackoffPolicy (when to probe)
//! ```
//!
//! Cross-cutting: `config` (TOML + builder), `registry` (named breakers),
//! `lifecycle` (shutdown signals), `observability` (tracing + metrics).

pub mod breaker;
pub mod clock;
pub mod config;
pub mod events;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;

pub use breaker::{
    Breaker, BreakerBuilder, BreakerSnapshot, BreakerState, BreakerStats, CallError, CircuitBreaker,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::Config;
pub use events::{BreakerEvent, DeliveryPolicy, EventEmitter, Subscription};
pub use lifecycle::{Shutdown, ShutdownSignal};
pub use registry::BreakerRegistry;
pub use resilience::{BackoffPolicy, Tripper};
