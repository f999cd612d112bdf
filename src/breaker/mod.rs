//! Circuit breaker state machine.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - HalfOpen: a single probe call is let through to test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: trip() or the Tripper approves after a failure
//! Open → HalfOpen: time since last failure exceeds the scheduled backoff,
//!                  breaker not manually broken, probe gate acquired
//! HalfOpen → Closed: probe succeeds (full reset)
//! HalfOpen → Open: probe fails (backoff already advanced)
//! ```
//!
//! # Design Decisions
//! - State is derived from atomics, never stored as its own field
//! - Fail fast in Open state: the operation and counters are untouched
//! - Single probe in HalfOpen via compare-and-swap on the probe gate
//! - Decorators (see `events`) wrap any [`CircuitBreaker`] and observe every
//!   transition because `call` is written against the trait

pub mod builder;
pub mod circuit;
pub mod error;
pub mod machine;

use serde::Serialize;
use std::fmt;

pub use builder::BreakerBuilder;
pub use circuit::{BreakerSnapshot, BreakerStats, CircuitBreaker};
pub use error::CallError;
pub use machine::Breaker;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "halfopen",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
