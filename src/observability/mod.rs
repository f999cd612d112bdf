//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, calls and the event emitter produce:
//!     → tracing events (structured logs, fields: breaker, state, ...)
//!     → metrics.rs (counters, histograms via the `metrics` facade)
//!
//! Consumers:
//!     → logging.rs installs a fmt subscriber for binaries
//!     → any `metrics` recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a global subscriber or recorder itself
//! - Metrics are cheap: with no recorder installed every call is a no-op
//! - Breaker name is the only high-cardinality label

pub mod logging;
pub mod metrics;
