//! Breaker event notification.
//!
//! # Data Flow
//! ```text
//! EventEmitter<B> (decorates any CircuitBreaker)
//!     → trip / reset / ready / record_failure forwarded to B
//!     → event try_send into bounded source queue (never blocks)
//!     → fan-out task (emitter.rs) reads source
//!     → SubscriberQueue::push per subscriber (subscriber.rs)
//!         → full queue: drop newest or evict oldest (DeliveryPolicy)
//!     → Subscription::recv
//! ```
//!
//! # Design Decisions
//! - Breaker core carries no notification logic; the emitter is a wrapper
//! - Publishing never waits: a full source or subscriber queue loses events
//! - Subscriber set uses its own lock; fan-out holds it shared, subscribe and
//!   unsubscribe hold it exclusively for the map mutation only
//! - Fan-out stops on its shutdown signal and closes every subscriber queue

pub mod emitter;
pub mod subscriber;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use emitter::{EmitterError, EventEmitter};
pub use subscriber::{SubscriberId, Subscription};

/// A state-affecting breaker operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerEvent {
    /// The breaker was tripped, manually or by its tripper.
    Tripped,
    /// The breaker was reset, manually or by a successful probe.
    Reset,
    /// A failure was recorded.
    Failed,
    /// A half-open probe was admitted.
    Ready,
}

impl BreakerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerEvent::Tripped => "tripped",
            BreakerEvent::Reset => "reset",
            BreakerEvent::Failed => "failed",
            BreakerEvent::Ready => "ready",
        }
    }
}

impl fmt::Display for BreakerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a full subscriber queue does with a new event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Discard the incoming event.
    #[default]
    DropNewest,
    /// Discard the oldest queued event to make room.
    EvictOldest,
}

impl DeliveryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryPolicy::DropNewest => "drop_newest",
            DeliveryPolicy::EvictOldest => "evict_oldest",
        }
    }
}
